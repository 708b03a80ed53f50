//! Interchange writer: serializes a layer into a CRS-tagged `GeoJSON` document.
//!
//! Host layers return bare coordinates; the engine needs to know their CRS. The
//! writer therefore attaches a `crs` member to the document with
//! [`add_crs_tag`] before writing it, and the converter additionally passes the
//! source CRS explicitly on the command line.

use std::path::Path;

use geoexport_core_common::{Crs, Feature, FeatureCollection, FeatureLayer, FeatureQuery, WEB_MERCATOR};
use geojson::JsonObject;
use log::{debug, info};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;

use crate::error::{ExportError, SerializationError};

/// File extension of the interchange document.
pub const INTERCHANGE_EXTENSION: &str = "json";

/// Builds the `GeoJSON` `crs` member for a named CRS.
#[must_use]
pub fn crs_member(crs: Crs) -> Value {
    json!({
        "type": "name",
        "properties": { "name": crs.identifier() },
    })
}

/// Converts a collection into a `GeoJSON` feature collection carrying a `crs` tag.
///
/// This is a pure transform: the input is not modified and no I/O happens.
#[must_use]
pub fn add_crs_tag(collection: &FeatureCollection, crs: Crs) -> geojson::FeatureCollection {
    let mut foreign_members = JsonObject::new();
    foreign_members.insert("crs".to_string(), crs_member(crs));

    geojson::FeatureCollection {
        bbox: None,
        features: collection.features.iter().map(to_geojson_feature).collect(),
        foreign_members: Some(foreign_members),
    }
}

fn to_geojson_feature(feature: &Feature) -> geojson::Feature {
    geojson::Feature {
        bbox: None,
        geometry: feature.geometry.clone(),
        id: feature
            .id
            .map(|id| geojson::feature::Id::Number(serde_json::Number::from(id))),
        properties: Some(feature.attributes.clone()),
        foreign_members: None,
    }
}

/// Checks that every attribute value is a JSON scalar (or null).
///
/// # Errors
///
/// Returns [`SerializationError::InvalidAttribute`] for the first array or object value.
pub fn validate_attributes(collection: &FeatureCollection) -> Result<(), SerializationError> {
    for feature in &collection.features {
        for (name, value) in &feature.attributes {
            let found = match value {
                Value::Array(_) => "array",
                Value::Object(_) => "object",
                _ => continue,
            };
            return Err(SerializationError::InvalidAttribute {
                feature: feature.id,
                attribute: name.clone(),
                found,
            });
        }
    }
    Ok(())
}

/// Serializes a collection to `target` as a CRS-tagged `GeoJSON` document.
///
/// The file is created, fully written and synced before this returns; nothing
/// reads it until the converter starts.
///
/// # Errors
///
/// Returns a [`SerializationError`] if validation, encoding or writing fails.
pub async fn write_collection(
    collection: &FeatureCollection,
    crs: Crs,
    target: &Path,
) -> Result<(), SerializationError> {
    validate_attributes(collection)?;

    let document = add_crs_tag(collection, crs);
    let bytes = serde_json::to_vec(&document)?;

    let write_error = |source| SerializationError::Write {
        path: target.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(target).await.map_err(write_error)?;
    file.write_all(&bytes).await.map_err(write_error)?;
    file.sync_all().await.map_err(write_error)?;

    debug!(
        "Wrote interchange file {} ({} bytes)",
        target.display(),
        bytes.len()
    );
    Ok(())
}

/// Queries a layer and writes its features to `target` tagged with `EPSG:3857`.
///
/// When `single_part` is set the layer is asked to decompose multi-part geometries.
/// Returns the number of features written.
///
/// # Errors
///
/// Returns an [`ExportError`] if the query fails or the file cannot be written.
pub async fn write_interchange(
    layer: &dyn FeatureLayer,
    target: &Path,
    single_part: bool,
) -> Result<usize, ExportError> {
    let query = FeatureQuery::new().single_part(single_part);
    let collection = layer.feature_query(query).await?;

    write_collection(&collection, WEB_MERCATOR, target).await?;

    info!(
        "Serialized {} feature(s) of resource {} (single part: {single_part})",
        collection.len(),
        layer.id()
    );
    Ok(collection.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geo_types::{MultiPoint, point};
    use geoexport_core_common::{Attributes, HostError};
    use geojson::Geometry;
    use tempfile::TempDir;

    struct StaticLayer(FeatureCollection);

    #[async_trait]
    impl FeatureLayer for StaticLayer {
        fn id(&self) -> u64 {
            5
        }

        fn display_name(&self) -> &str {
            "Wells"
        }

        async fn feature_query(&self, query: FeatureQuery) -> Result<FeatureCollection, HostError> {
            Ok(query.apply(self.0.clone()))
        }
    }

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn shape(geometry: impl Into<geo_types::Geometry<f64>>) -> Option<Geometry> {
        Some(Geometry::new(geojson::Value::from(&geometry.into())))
    }

    fn wells() -> FeatureCollection {
        FeatureCollection::new(vec![
            Feature::new(
                shape(point!(x: 111_319.49, y: 0.0)),
                attrs(&[("name", json!("Колодец")), ("depth", json!(12.5))]),
            )
            .with_id(1),
            Feature::new(
                shape(MultiPoint::from(vec![(0.0, 0.0), (10.0, 10.0)])),
                attrs(&[("name", json!("pair")), ("depth", Value::Null)]),
            )
            .with_id(2),
        ])
    }

    #[test]
    fn test_add_crs_tag() {
        let document = add_crs_tag(&wells(), WEB_MERCATOR);
        let value = serde_json::to_value(&document).unwrap();

        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["crs"]["type"], "name");
        assert_eq!(value["crs"]["properties"]["name"], "EPSG:3857");
        assert_eq!(value["features"].as_array().unwrap().len(), 2);
        assert_eq!(value["features"][0]["id"], 1);
        assert_eq!(value["features"][0]["geometry"]["type"], "Point");
        assert_eq!(value["features"][1]["geometry"]["type"], "MultiPoint");
        assert_eq!(value["features"][1]["properties"]["depth"], Value::Null);
    }

    #[test]
    fn test_add_crs_tag_keeps_z_and_field_order() {
        let attributes = attrs(&[("zeta", json!(1)), ("alpha", json!(2)), ("mid", json!(3))]);
        let point = Geometry::new(geojson::Value::Point(vec![10.0, 20.0, 99.5]));
        let collection = FeatureCollection::new(vec![Feature::new(Some(point), attributes)]);

        let text = serde_json::to_string(&add_crs_tag(&collection, WEB_MERCATOR)).unwrap();
        assert!(text.contains("[10.0,20.0,99.5]"), "{text}");

        let zeta = text.find("\"zeta\"").unwrap();
        let alpha = text.find("\"alpha\"").unwrap();
        let mid = text.find("\"mid\"").unwrap();
        assert!(zeta < alpha && alpha < mid, "{text}");
    }

    #[test]
    fn test_feature_without_geometry() {
        let collection = FeatureCollection::new(vec![Feature::new(None, attrs(&[("a", json!(1))]))]);
        let value = serde_json::to_value(add_crs_tag(&collection, WEB_MERCATOR)).unwrap();
        assert_eq!(value["features"][0]["geometry"], Value::Null);
    }

    #[test]
    fn test_non_scalar_attribute_is_rejected() {
        let collection = FeatureCollection::new(vec![
            Feature::new(None, attrs(&[("tags", json!(["a", "b"]))])).with_id(9),
        ]);
        let err = validate_attributes(&collection).unwrap_err();
        assert!(matches!(
            err,
            SerializationError::InvalidAttribute { feature: Some(9), found: "array", .. }
        ));
    }

    #[tokio::test]
    async fn test_write_interchange_keeps_utf8() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Колодцы.json");

        let written = write_interchange(&StaticLayer(wells()), &target, false)
            .await
            .unwrap();
        assert_eq!(written, 2);

        let text = std::fs::read_to_string(&target).unwrap();
        assert!(text.contains("Колодец"), "non-ASCII text must not be escaped");

        let parsed: geojson::GeoJson = text.parse().unwrap();
        let geojson::GeoJson::FeatureCollection(fc) = parsed else {
            panic!("expected a feature collection");
        };
        assert_eq!(fc.features.len(), 2);
        assert_eq!(
            fc.foreign_members.unwrap()["crs"]["properties"]["name"],
            "EPSG:3857"
        );
    }

    #[tokio::test]
    async fn test_write_interchange_single_part() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("wells.json");

        let written = write_interchange(&StaticLayer(wells()), &target, true)
            .await
            .unwrap();
        assert_eq!(written, 3);

        let value: Value = serde_json::from_slice(&std::fs::read(&target).unwrap()).unwrap();
        for feature in value["features"].as_array().unwrap() {
            assert_eq!(feature["geometry"]["type"], "Point");
        }
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("missing").join("wells.json");

        let err = write_interchange(&StaticLayer(wells()), &target, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::Serialization(SerializationError::Write { .. })
        ));
    }
}
