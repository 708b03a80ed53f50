//! Built-in host collaborator: layers backed by GeoJSON files.
//!
//! Each configured layer is read from disk on every query, so edits to the
//! file are picked up without a restart. Coordinates are taken as `EPSG:3857`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use geoexport_core_common::{
    Attributes, Feature, FeatureCollection, FeatureLayer, FeatureQuery, HostError, Permission,
    Principal, ResourceProvider,
};
use geojson::GeoJson;

use crate::config::LayerConfig;

/// A layer read from a GeoJSON file.
#[derive(Debug, Clone)]
pub struct GeoJsonFileLayer {
    id: u64,
    display_name: String,
    path: PathBuf,
    readers: Vec<String>,
}

impl GeoJsonFileLayer {
    pub fn new(id: u64, display_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            path: path.into(),
            readers: Vec::new(),
        }
    }

    /// Restricts reads to the given bearer tokens.
    #[must_use]
    pub fn with_readers(mut self, readers: Vec<String>) -> Self {
        self.readers = readers;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_public(&self) -> bool {
        self.readers.is_empty()
    }

    fn query_error(&self, message: impl Into<String>) -> HostError {
        HostError::Query {
            id: self.id,
            message: message.into(),
        }
    }

    fn check_read(&self, principal: &Principal) -> Result<(), HostError> {
        if self.is_public() {
            return Ok(());
        }
        match principal.token.as_deref() {
            None => Err(HostError::Unauthenticated { id: self.id }),
            Some(token) if self.readers.iter().any(|r| r == token) => Ok(()),
            Some(_) => Err(HostError::PermissionDenied { id: self.id }),
        }
    }
}

impl From<&LayerConfig> for GeoJsonFileLayer {
    fn from(cfg: &LayerConfig) -> Self {
        GeoJsonFileLayer::new(cfg.id, cfg.display_name.clone(), cfg.path.clone())
            .with_readers(cfg.readers.clone())
    }
}

#[async_trait]
impl FeatureLayer for GeoJsonFileLayer {
    fn id(&self) -> u64 {
        self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn feature_query(&self, query: FeatureQuery) -> Result<FeatureCollection, HostError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.query_error(format!("{}: {e}", self.path.display())))?;
        let geojson: GeoJson = text
            .parse()
            .map_err(|e| self.query_error(format!("invalid GeoJSON: {e}")))?;

        let collection = to_collection(geojson);
        tracing::debug!(
            layer = self.id,
            features = collection.len(),
            single_part = query.single_part,
            "loaded layer"
        );
        Ok(query.apply(collection))
    }
}

/// Geometries pass through as parsed, so every ordinate of a position is kept.
fn to_collection(geojson: GeoJson) -> FeatureCollection {
    match geojson {
        GeoJson::FeatureCollection(fc) => fc.features.into_iter().map(to_feature).collect(),
        GeoJson::Feature(feature) => FeatureCollection::new(vec![to_feature(feature)]),
        GeoJson::Geometry(geometry) => {
            FeatureCollection::new(vec![Feature::new(Some(geometry), Attributes::new())])
        },
    }
}

fn to_feature(feature: geojson::Feature) -> Feature {
    let converted = Feature::new(feature.geometry, feature.properties.unwrap_or_default());
    match feature.id {
        Some(geojson::feature::Id::Number(n)) => match n.as_i64() {
            Some(id) => converted.with_id(id),
            None => converted,
        },
        _ => converted,
    }
}

/// Resource and permission service over a fixed set of layers.
#[derive(Debug, Clone, Default)]
pub struct LayerStore {
    layers: HashMap<u64, Arc<GeoJsonFileLayer>>,
}

impl LayerStore {
    pub fn new(layers: impl IntoIterator<Item = GeoJsonFileLayer>) -> Self {
        Self {
            layers: layers
                .into_iter()
                .map(|layer| (layer.id, Arc::new(layer)))
                .collect(),
        }
    }

    pub fn from_config(layers: &[LayerConfig]) -> Self {
        Self::new(layers.iter().map(GeoJsonFileLayer::from))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[async_trait]
impl ResourceProvider for LayerStore {
    async fn feature_layer(&self, id: u64) -> Result<Arc<dyn FeatureLayer>, HostError> {
        self.layers
            .get(&id)
            .map(|layer| Arc::clone(layer) as Arc<dyn FeatureLayer>)
            .ok_or(HostError::NotFound { id })
    }

    async fn authorize(
        &self,
        layer: &dyn FeatureLayer,
        principal: &Principal,
        permission: Permission,
    ) -> Result<(), HostError> {
        let id = layer.id();
        let stored = self.layers.get(&id).ok_or(HostError::NotFound { id })?;
        match permission {
            Permission::Read => stored.check_read(principal),
        }
    }
}
