// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory model accumulated during a generation job.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::config::{ElementEntityKind, IfcVersion};

/// RGBA surface color, components in `0.0..=1.0`.
///
/// The alpha component is emitted as transparency.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

/// Geometry attached to an element.
#[derive(Debug, Clone)]
pub enum Geometry {
    /// Ordered triangle list, each triangle three 3D coordinates.
    Triangulation(Vec<[[f64; 3]; 3]>),
    /// Oriented planar faces, each an ordered coordinate ring.
    Polygons(Vec<Vec<[f64; 3]>>),
}

impl Geometry {
    /// Resolve an indexed mesh into a triangle list.
    pub fn from_indexed(points: &[[f64; 3]], faces: &[[usize; 3]]) -> Self {
        Geometry::Triangulation(
            faces
                .iter()
                .map(|face| [points[face[0]], points[face[1]], points[face[2]]])
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Triangulation(triangles) => triangles.is_empty(),
            Geometry::Polygons(polygons) => polygons.is_empty(),
        }
    }
}

/// A named set of key/value properties.
#[derive(Debug, Clone, Default)]
pub struct PropertySet {
    pub properties: BTreeMap<String, String>,
}

/// Semantic unit emitted as one IFC product.
#[derive(Debug, Clone)]
pub struct Element {
    pub attributes: BTreeMap<String, String>,
    pub property_sets: BTreeMap<String, PropertySet>,
    /// Dotted group paths this element is assigned to.
    pub groups: Vec<String>,
    pub geometry: Geometry,
}

impl Element {
    pub fn new(attributes: BTreeMap<String, String>, groups: Vec<String>, geometry: Geometry) -> Self {
        Self {
            attributes,
            property_sets: BTreeMap::new(),
            groups,
            geometry,
        }
    }

    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn add_property(
        &mut self,
        set: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.property_sets
            .entry(set.into())
            .or_default()
            .properties
            .insert(key.into(), value.into());
    }
}

/// One decoded CityGML building surface group.
#[derive(Debug, Clone)]
pub struct BuildingPart {
    pub entity_kind: ElementEntityKind,
    pub color: Color,
    pub attributes: BTreeMap<String, String>,
    pub property_sets: BTreeMap<String, PropertySet>,
    /// Closed planar faces, one per `posList`.
    pub polygons: Vec<Vec<[f64; 3]>>,
}

impl BuildingPart {
    pub fn new(entity_kind: ElementEntityKind, polygons: Vec<Vec<[f64; 3]>>, color: Color) -> Self {
        Self {
            entity_kind,
            color,
            attributes: BTreeMap::new(),
            property_sets: BTreeMap::new(),
            polygons,
        }
    }

    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn add_property(
        &mut self,
        set: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.property_sets
            .entry(set.into())
            .or_default()
            .properties
            .insert(key.into(), value.into());
    }
}

/// A matched CityGML building with its ordered parts.
#[derive(Debug, Clone, Default)]
pub struct Building {
    pub attributes: BTreeMap<String, String>,
    pub property_sets: BTreeMap<String, PropertySet>,
    pub parts: Vec<BuildingPart>,
}

impl Building {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(&mut self, part: BuildingPart) {
        self.parts.push(part);
    }

    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn add_property(
        &mut self,
        set: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.property_sets
            .entry(set.into())
            .or_default()
            .properties
            .insert(key.into(), value.into());
    }
}

/// All variable data for one generation job.
///
/// Grows monotonically while the processors run; the origin is the local
/// coordinate base (east, north, height) every coordinate was reduced by.
#[derive(Debug, Clone)]
pub struct Model {
    pub file_name: String,
    pub schema: IfcVersion,
    pub origin: [f64; 3],
    pub feature_classes: BTreeMap<String, Vec<Element>>,
    pub buildings: BTreeMap<String, Vec<Building>>,
}

impl Model {
    pub fn new(file_name: impl Into<String>, schema: IfcVersion, origin: [f64; 3]) -> Self {
        Self {
            file_name: file_name.into(),
            schema,
            origin,
            feature_classes: BTreeMap::new(),
            buildings: BTreeMap::new(),
        }
    }

    pub fn add_element(&mut self, feature_class_key: impl Into<String>, element: Element) {
        self.feature_classes
            .entry(feature_class_key.into())
            .or_default()
            .push(element);
    }

    pub fn add_building(&mut self, feature_class_key: impl Into<String>, building: Building) {
        self.buildings
            .entry(feature_class_key.into())
            .or_default()
            .push(building);
    }

    pub fn n_elements(&self) -> usize {
        self.feature_classes.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_triangles_from_indexed_mesh() {
        let points = [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]];
        let geometry = Geometry::from_indexed(&points, &[[0, 1, 2]]);
        match geometry {
            Geometry::Triangulation(triangles) => {
                assert_eq!(triangles.len(), 1);
                assert_eq!(triangles[0][2], [0.0, 1.0, 1.0]);
            }
            _ => panic!("expected a triangulation"),
        }
    }

    #[test]
    fn property_sets_group_by_name() {
        let mut element = Element::new(BTreeMap::new(), vec![], Geometry::Triangulation(vec![]));
        element.add_property("Pset_Terrain", "Slope", "steep");
        element.add_property("Pset_Terrain", "Cover", "forest");
        element.add_property("Pset_Admin", "Canton", "BE");
        assert_eq!(element.property_sets.len(), 2);
        assert_eq!(element.property_sets["Pset_Terrain"].properties.len(), 2);
    }

    #[test]
    fn model_accumulates_per_feature_class() {
        let mut model = Model::new("test", IfcVersion::Ifc4, [0.0; 3]);
        model.add_element(
            "parcels",
            Element::new(BTreeMap::new(), vec![], Geometry::Triangulation(vec![])),
        );
        model.add_element(
            "parcels",
            Element::new(BTreeMap::new(), vec![], Geometry::Triangulation(vec![])),
        );
        assert_eq!(model.n_elements(), 2);
        assert_eq!(model.feature_classes["parcels"].len(), 2);
    }
}
