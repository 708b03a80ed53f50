//! Feature data model shared by layer providers and the export pipeline.
//!
//! A [`FeatureCollection`] is what a host layer hands to the pipeline: an ordered
//! list of features, each with an optional `GeoJSON` geometry and a flat map of
//! scalar attributes. Positions keep every ordinate the host supplied, so `Z`
//! values reach the engine unchanged. Coordinates carry no CRS of their own;
//! the CRS is attached when the collection is serialized.

use std::fmt;

use geojson::{Geometry, Value as GeometryValue};
use serde_json::{Map, Value};

/// Coordinate reference system identified by an `authority:code` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs {
    /// Authority name, e.g. `EPSG`.
    pub authority: &'static str,
    /// Code within the authority, e.g. `3857`.
    pub code: u32,
}

impl Crs {
    /// Creates a CRS identifier.
    #[must_use]
    pub const fn new(authority: &'static str, code: u32) -> Self {
        Self { authority, code }
    }

    /// Returns the identifier in `AUTHORITY:CODE` form.
    #[must_use]
    pub fn identifier(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

/// Web Mercator. Host layers always return geometries in this CRS.
pub const WEB_MERCATOR: Crs = Crs::new("EPSG", 3857);

/// WGS 84 geographic. Every export is reprojected to this CRS.
pub const WGS84: Crs = Crs::new("EPSG", 4326);

/// Attribute map of a feature (attribute name to scalar value), in field order.
pub type Attributes = Map<String, Value>;

/// A single vector feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Host-assigned feature identifier.
    pub id: Option<i64>,
    /// Geometry in the layer's native CRS, if the feature has one.
    pub geometry: Option<Geometry>,
    /// Attribute values keyed by field name.
    pub attributes: Attributes,
}

impl Feature {
    /// Creates a feature without an identifier.
    #[must_use]
    pub fn new(geometry: Option<Geometry>, attributes: Attributes) -> Self {
        Self {
            id: None,
            geometry,
            attributes,
        }
    }

    /// Sets the feature identifier.
    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns `true` if the geometry consists of exactly one component (or is absent).
    #[must_use]
    pub fn is_single_part(&self) -> bool {
        self.geometry.as_ref().is_none_or(is_single_part)
    }

    /// Splits the feature into one feature per geometry component.
    ///
    /// Every part keeps the original identifier and attributes. A feature whose
    /// multi-part geometry has no components yields a single feature without geometry,
    /// so the attribute row is never lost.
    #[must_use]
    pub fn into_single_parts(self) -> Vec<Feature> {
        let Feature {
            id,
            geometry,
            attributes,
        } = self;

        let mut parts = Vec::new();
        if let Some(geometry) = geometry {
            explode(geometry, &mut parts);
        }

        if parts.is_empty() {
            return vec![Feature {
                id,
                geometry: None,
                attributes,
            }];
        }

        parts
            .into_iter()
            .map(|part| Feature {
                id,
                geometry: Some(part),
                attributes: attributes.clone(),
            })
            .collect()
    }
}

/// Ordered sequence of features returned by a layer query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    /// Features in query order.
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Creates a collection from features.
    #[must_use]
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if the collection has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Decomposes every multi-part geometry into single-part features, keeping order.
    #[must_use]
    pub fn into_single_part(self) -> Self {
        Self {
            features: self
                .features
                .into_iter()
                .flat_map(Feature::into_single_parts)
                .collect(),
        }
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Options for a layer feature query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureQuery {
    /// Decompose multi-part geometries into one feature per part.
    pub single_part: bool,
}

impl FeatureQuery {
    /// A query returning geometries as stored.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests single-part geometry decomposition.
    #[must_use]
    pub fn single_part(mut self, single_part: bool) -> Self {
        self.single_part = single_part;
        self
    }

    /// Applies the query options to a collection read from storage.
    #[must_use]
    pub fn apply(&self, collection: FeatureCollection) -> FeatureCollection {
        if self.single_part {
            collection.into_single_part()
        } else {
            collection
        }
    }
}

fn is_single_part(geometry: &Geometry) -> bool {
    !matches!(
        geometry.value,
        GeometryValue::MultiPoint(_)
            | GeometryValue::MultiLineString(_)
            | GeometryValue::MultiPolygon(_)
            | GeometryValue::GeometryCollection(_)
    )
}

fn explode(geometry: Geometry, parts: &mut Vec<Geometry>) {
    let Geometry {
        bbox,
        value,
        foreign_members,
    } = geometry;

    match value {
        GeometryValue::MultiPoint(points) => {
            parts.extend(points.into_iter().map(|p| Geometry::new(GeometryValue::Point(p))));
        },
        GeometryValue::MultiLineString(lines) => {
            parts.extend(
                lines
                    .into_iter()
                    .map(|l| Geometry::new(GeometryValue::LineString(l))),
            );
        },
        GeometryValue::MultiPolygon(polygons) => {
            parts.extend(
                polygons
                    .into_iter()
                    .map(|p| Geometry::new(GeometryValue::Polygon(p))),
            );
        },
        GeometryValue::GeometryCollection(members) => {
            for inner in members {
                explode(inner, parts);
            }
        },
        value => parts.push(Geometry {
            bbox,
            value,
            foreign_members,
        }),
    }
}
