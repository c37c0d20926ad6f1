// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # TerraBIM Core
//!
//! In-memory BIM model graph and an IFC (STEP physical file) writer.
//!
//! A [`Model`] accumulates terrain [`Element`]s and CityGML-derived
//! [`Building`]s per feature class; the [`IfcBuilder`] translates the
//! finished model into an IFC4 or IFC4X3 entity graph:
//!
//! - unit assignments, representation contexts and a project
//! - geo-referencing per configured mode (local placement, world
//!   coordinate system or an explicit map conversion to EPSG:2056)
//! - spatial structure, element geometry as tessellations or faceted
//!   B-reps, surface styles, property sets and nested groups

pub mod builder;
pub mod config;
pub mod error;
pub mod guid;
pub mod model;
pub mod step;

pub use builder::{IfcBuilder, IfcSettings};
pub use config::{
    BuildingClass, ElementEntityKind, FeatureClass, GeoReferencing, GroupDef, GroupEntityKind,
    IfcVersion, RepresentationMode, SpatialStructureDef, SpatialStructureKind,
};
pub use error::{Error, Result};
pub use model::{Building, BuildingPart, Color, Element, Geometry, Model, PropertySet};
pub use step::{EntityId, StepFile, Value};
