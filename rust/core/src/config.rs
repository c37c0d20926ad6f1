// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build instructions for the IFC side of a feature class.
//!
//! These types are embedded in the service configuration document and
//! deserialized with serde; the builder consumes them as-is.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Supported IFC schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum IfcVersion {
    #[serde(rename = "IFC4")]
    Ifc4,
    #[serde(rename = "IFC4x3")]
    Ifc4x3,
}

impl IfcVersion {
    /// Schema identifier written into the STEP header.
    pub fn schema_name(&self) -> &'static str {
        match self {
            IfcVersion::Ifc4 => "IFC4",
            IfcVersion::Ifc4x3 => "IFC4X3",
        }
    }
}

impl FromStr for IfcVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IFC4" => Ok(IfcVersion::Ifc4),
            "IFC4x3" | "IFC4X3" => Ok(IfcVersion::Ifc4x3),
            other => Err(format!("unknown IFC version '{other}'")),
        }
    }
}

impl fmt::Display for IfcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_name())
    }
}

/// Geo-referencing level of the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum GeoReferencing {
    /// Global origin on the element local placement.
    #[serde(rename = "LO_GEO_REF_30")]
    LoGeoRef30,
    /// Global origin on the representation-context world coordinate system.
    #[serde(rename = "LO_GEO_REF_40")]
    LoGeoRef40,
    /// Explicit map conversion to the projected CRS.
    #[serde(rename = "LO_GEO_REF_50")]
    LoGeoRef50,
}

/// How triangulated geometry is represented in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RepresentationMode {
    /// One indexed face-set per element.
    #[serde(rename = "TESSELLATION")]
    Tessellation,
    /// One faceted B-rep face per triangle.
    #[serde(rename = "BREP")]
    Brep,
}

impl RepresentationMode {
    /// `RepresentationType` of the emitted shape representation.
    pub fn representation_type(&self) -> &'static str {
        match self {
            RepresentationMode::Tessellation => "Tessellation",
            RepresentationMode::Brep => "Brep",
        }
    }
}

/// Entity kinds an element can be emitted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ElementEntityKind {
    #[serde(rename = "IFC_GEOGRAPHIC_ELEMENT")]
    GeographicElement,
    #[serde(rename = "IFC_WALL")]
    Wall,
    #[serde(rename = "IFC_SLAB")]
    Slab,
    #[serde(rename = "IFC_ROOF")]
    Roof,
    #[serde(rename = "IFC_SPACE")]
    Space,
    #[serde(rename = "IFC_BUILDING_ELEMENT_PROXY")]
    BuildingElementProxy,
}

/// Entity kinds a spatial structure container can be emitted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SpatialStructureKind {
    #[serde(rename = "IFC_SITE")]
    Site,
}

/// Entity kinds a group can be emitted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum GroupEntityKind {
    #[serde(rename = "IFC_GROUP")]
    Group,
    #[serde(rename = "IFC_DISTRIBUTION_SYSTEM")]
    DistributionSystem,
    #[serde(rename = "IFC_DISTRIBUTION_CIRCUIT")]
    DistributionCircuit,
    #[serde(rename = "IFC_BUILDING_SYSTEM")]
    BuildingSystem,
    #[serde(rename = "IFC_STRUCTURAL_ANALYSIS_MODEL")]
    StructuralAnalysisModel,
    #[serde(rename = "IFC_ZONE")]
    Zone,
}

/// Build instructions for the spatial structure above a feature class.
#[derive(Debug, Clone)]
pub struct SpatialStructureDef {
    pub kind: SpatialStructureKind,
    pub attributes: BTreeMap<String, String>,
}

impl SpatialStructureDef {
    /// Key identifying a spatial structure instance; feature classes with
    /// the same key share one container.
    pub fn key(&self) -> String {
        let attributes: Vec<String> = self
            .attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{:?}-{}", self.kind, attributes.join(","))
    }
}

/// Build instructions for a configured group.
#[derive(Debug, Clone)]
pub struct GroupDef {
    pub entity_kind: GroupEntityKind,
    pub attributes: BTreeMap<String, String>,
}

/// IFC build instructions shared by all elements of a feature class.
#[derive(Debug, Clone)]
pub struct FeatureClass {
    pub entity_kind: ElementEntityKind,
    pub spatial_structure: SpatialStructureDef,
    pub color: crate::model::Color,
}

/// IFC build instructions for a building feature class; the parts carry
/// their own entity kinds and colors.
#[derive(Debug, Clone)]
pub struct BuildingClass {
    pub spatial_structure: SpatialStructureDef,
}
