use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use geoexport_core::ExportSettings;
use geoexport_core::engine::{DEFAULT_PROGRAM, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Layers served by the built-in GeoJSON store
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.engine.timeout_secs == 0 {
            return Err("engine.timeout_secs must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        let mut ids = HashSet::new();
        for layer in &self.layers {
            if !ids.insert(layer.id) {
                return Err(format!("layers: duplicate id {}", layer.id));
            }
            if layer.display_name.trim().is_empty() {
                return Err(format!("layers: layer {} has an empty display_name", layer.id));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.timeout_secs)
    }

    pub fn export_settings(&self) -> ExportSettings {
        self.export
            .work_root
            .clone()
            .map_or_else(ExportSettings::default, |work_root| ExportSettings { work_root })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Conversion engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `ogr2ogr` executable; a bare name is resolved through `PATH`.
    #[serde(default = "default_program")]
    pub program: PathBuf,
    /// Bound on one conversion, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from(DEFAULT_PROGRAM)
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportConfig {
    /// Where job directories and archives are created. Defaults to the system temp dir.
    #[serde(default)]
    pub work_root: Option<PathBuf>,
    /// Answer unsupported formats with 500 instead of 400.
    #[serde(default)]
    pub legacy_unsupported_status: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A layer backed by a GeoJSON file with coordinates in `EPSG:3857`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayerConfig {
    pub id: u64,
    pub display_name: String,
    pub path: PathBuf,
    /// Bearer tokens allowed to read the layer; empty means public.
    #[serde(default)]
    pub readers: Vec<String>,
}

pub mod loader {
    use super::{AppConfig, Path};
    use config::{Config, Environment, File};

    /// Loads configuration from an optional TOML file, then `GEOEXPORT__*`
    /// environment overrides (e.g. `GEOEXPORT__SERVER__PORT=9090`).
    pub fn load_config(path: Option<&Path>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        if let Some(p) = path {
            if !p.exists() {
                return Err(format!("config file not found: {}", p.display()));
            }
            builder = builder.add_source(File::from(p.to_path_buf()));
        }
        builder = builder.add_source(
            Environment::with_prefix("GEOEXPORT")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let app: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        app.validate()?;
        Ok(app)
    }
}
