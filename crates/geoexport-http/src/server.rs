use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use geoexport_core::{Exporter, Ogr2Ogr};
use geoexport_core_common::{ConversionEngine, ResourceProvider};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::handlers::{export_layer, healthz, list_formats};
use crate::store::LayerStore;

/// Shared request state: the exporter (with its driver catalog) and the host.
#[derive(Clone)]
pub struct AppState {
    pub exporter: Exporter,
    pub provider: Arc<dyn ResourceProvider>,
    pub legacy_unsupported_status: bool,
}

impl AppState {
    pub fn new(exporter: Exporter, provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            exporter,
            provider,
            legacy_unsupported_status: false,
        }
    }

    #[must_use]
    pub fn with_legacy_unsupported_status(mut self, legacy: bool) -> Self {
        self.legacy_unsupported_status = legacy;
        self
    }

    /// Builds the state from configuration, discovering the engine's drivers.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let engine: Arc<dyn ConversionEngine> =
            Arc::new(Ogr2Ogr::new(&cfg.engine.program).with_timeout(cfg.engine_timeout()));
        let exporter = Exporter::discover(engine, cfg.export_settings())
            .await
            .with_context(|| {
                format!(
                    "failed to discover drivers from {}",
                    cfg.engine.program.display()
                )
            })?;

        let store = LayerStore::from_config(&cfg.layers);
        tracing::info!(
            formats = exporter.catalog().len(),
            layers = store.len(),
            "export service ready"
        );

        Ok(Self::new(exporter, Arc::new(store))
            .with_legacy_unsupported_status(cfg.export.legacy_unsupported_status))
    }
}

pub fn build_app(state: AppState) -> Router {
    let export = Router::new().route("/resource/{id}/ogr_export/{fmt}", get(export_layer));

    Router::new()
        .merge(export.clone())
        .nest("/api", export)
        .route("/ogr_export/formats", get(list_formats))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until Ctrl-C.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&cfg).await?;
    let app = build_app(state);

    let addr = cfg.addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}
