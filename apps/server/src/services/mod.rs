// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Services composing the generation pipeline.

pub mod asset_cache;
pub mod bounding_box;
pub mod buildings;
pub mod citygml;
pub mod generator;
pub mod postgis;
pub mod stac;
pub mod terrain;

pub use asset_cache::AssetCache;
pub use generator::ModelGenerator;
pub use postgis::PostgisService;
pub use stac::StacClient;
