//! `ogr2ogr` binding for the [`ConversionEngine`] trait.
//!
//! The engine is an external, independently versioned executable. Each call is a
//! one-shot child process with a bounded wait; on expiry the child is killed.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use geoexport_core_common::{
    ConversionEngine, ConversionOutcome, ConversionRequest, EngineDriver, EngineError,
    SupportStatus,
};
use log::{debug, info};
use tokio::process::Command;

/// Default executable name, resolved through `PATH`.
pub const DEFAULT_PROGRAM: &str = "ogr2ogr";

/// Default bound on a single engine invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Conversion engine backed by the GDAL `ogr2ogr` command-line tool.
#[derive(Debug, Clone)]
pub struct Ogr2Ogr {
    program: PathBuf,
    timeout: Duration,
}

impl Default for Ogr2Ogr {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl Ogr2Ogr {
    /// Creates a binding for the given executable with the default timeout.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the bound on a single invocation.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The executable this binding runs.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The bound on a single invocation.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run<I, S>(&self, args: I) -> Result<Output, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            }),
            Err(_) => Err(EngineError::TimedOut {
                program: self.program.clone(),
                after: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl ConversionEngine for Ogr2Ogr {
    async fn list_drivers(&self) -> Result<Vec<EngineDriver>, EngineError> {
        let output = self.run(["--formats"]).await?;
        if !output.status.success() {
            return Err(EngineError::Output {
                program: self.program.clone(),
                message: format!("--formats exited with {}", output.status),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let drivers = parse_formats(&stdout);
        if drivers.is_empty() {
            return Err(EngineError::Output {
                program: self.program.clone(),
                message: "no drivers listed by --formats".to_string(),
            });
        }

        debug!("{} reported {} driver(s)", self.program.display(), drivers.len());
        Ok(drivers)
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutcome, EngineError> {
        let args = request.to_args();
        info!(
            "Running {} {}",
            self.program.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = self.run(&args).await?;
        Ok(ConversionOutcome {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Parses the driver list printed by `ogr2ogr --formats`.
///
/// Two line shapes are understood:
///
/// ```text
///   ESRI Shapefile -vector- (rw+v): ESRI Shapefile
///   -> "ESRI Shapefile" (read/write)
/// ```
///
/// Lines in neither shape (headers, blank lines) are ignored.
#[must_use]
pub fn parse_formats(text: &str) -> Vec<EngineDriver> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            line.strip_prefix("->")
                .and_then(|rest| parse_legacy_line(rest.trim()))
                .or_else(|| parse_modern_line(line))
        })
        .collect()
}

fn parse_modern_line(line: &str) -> Option<EngineDriver> {
    let (head, long_name) = line.split_once("): ")?;
    let (head, flags) = head.rsplit_once(" (")?;
    let (name, kinds) = head.rsplit_once(" -")?;
    if !kinds.ends_with('-') || name.trim().is_empty() {
        return None;
    }

    // `r` read; `w+` create; a bare `w` is copy-only, which `ogr2ogr` cannot use.
    let read = status(flags.contains('r'));
    let write = status(flags.contains("w+"));
    Some(EngineDriver::new(name.trim(), long_name.trim(), read, write))
}

fn parse_legacy_line(rest: &str) -> Option<EngineDriver> {
    let rest = rest.strip_prefix('"')?;
    let (name, flags) = rest.split_once('"')?;
    let flags = flags.trim().trim_start_matches('(').trim_end_matches(')');
    let write = status(flags.contains("write"));
    Some(EngineDriver::new(name, name, SupportStatus::Supported, write))
}

fn status(supported: bool) -> SupportStatus {
    if supported {
        SupportStatus::Supported
    } else {
        SupportStatus::NotSupported
    }
}
