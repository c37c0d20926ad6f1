// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # TerraBIM TIN Engine
//!
//! Builds triangulated irregular networks from scattered terrain points using
//! [spade](https://docs.rs/spade) Delaunay triangulation and clips them against
//! polygonal footprints described by [geo](https://docs.rs/geo) geometries.
//!
//! ## Overview
//!
//! - **Area**: a validated polygonal footprint (exterior CCW, holes CW,
//!   origin-reduced) parsed from WKT
//! - **RasterPoints**: origin-reduced 3D point sets with polygon filtering
//! - **Mesh**: 2.5D triangle surfaces supporting boundary-constrained
//!   re-triangulation, footprint clipping and curvature-aware decimation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use terrabim_tin::{Area, Mesh, RasterPoints};
//!
//! let area = Area::new("POLYGON((0 0,10 0,10 10,0 10,0 0))", [0.0, 0.0])?;
//! let raster = RasterPoints::new(points, [0.0, 0.0, 0.0]);
//!
//! let buffered = raster.within(area.polygon(), 3.0).unwrap_or_default();
//! let within = raster.within(area.polygon(), 0.0).unwrap_or_default();
//!
//! let mesh = Mesh::from_points(&buffered)?
//!     .clip_by_area(&area, &within)?
//!     .decimate(0.1, 1.0, 0.0)?;
//! ```

pub mod area;
mod decimate;
pub mod error;
pub mod mesh;
mod predicates;
pub mod raster;

pub use area::Area;
pub use error::{Error, Result};
pub use mesh::Mesh;
pub use raster::RasterPoints;
