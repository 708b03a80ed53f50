//! Errors reported by pipeline collaborators: the host application and the conversion engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by the host application (resource lookup, permissions, feature queries).
#[derive(Debug, Error)]
pub enum HostError {
    /// No resource exists with the requested identifier.
    #[error("Resource {id} not found")]
    NotFound {
        /// The requested resource identifier
        id: u64,
    },

    /// The request carries no credentials and the resource is not public.
    #[error("Authentication required to read resource {id}")]
    Unauthenticated {
        /// The resource identifier
        id: u64,
    },

    /// The principal may not read the resource.
    #[error("Permission denied to read resource {id}")]
    PermissionDenied {
        /// The resource identifier
        id: u64,
    },

    /// The feature query failed.
    #[error("Feature query on resource {id} failed: {message}")]
    Query {
        /// The resource identifier
        id: u64,
        /// Description of the failure
        message: String,
    },
}

/// Errors raised while driving the external conversion engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine executable could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        /// The executable that was invoked
        program: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The engine did not finish within the configured bound.
    #[error("'{program}' did not finish within {}s", after.as_secs())]
    TimedOut {
        /// The executable that was invoked
        program: PathBuf,
        /// The wait bound that expired
        after: Duration,
    },

    /// The engine produced output that could not be interpreted.
    #[error("Unexpected output from '{program}': {message}")]
    Output {
        /// The executable that was invoked
        program: PathBuf,
        /// Description of the problem
        message: String,
    },
}
