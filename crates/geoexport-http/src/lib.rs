//! HTTP surface of `GeoExport`.
//!
//! Serves `GET /resource/{id}/ogr_export/{fmt}` (also under `/api`), which
//! streams a layer as a zip archive, plus `GET /ogr_export/formats` and
//! `GET /healthz`. Layers come from a [`ResourceProvider`](geoexport_core_common::ResourceProvider);
//! [`store::LayerStore`] is the built-in one, reading GeoJSON files listed in the config.

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod store;

pub use config::AppConfig;
pub use config::loader::load_config;
pub use error::ApiError;
pub use server::{AppState, build_app, run};
pub use store::{GeoJsonFileLayer, LayerStore};
