// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Orchestration of one model generation job.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use terrabim_core::{IfcBuilder, IfcVersion, Model, StepFile};
use wkt::Wkt;

use crate::config::Configuration;
use crate::error::GenerationError;
use crate::services::buildings::BuildingProcessor;
use crate::services::postgis::PostgisService;
use crate::services::stac::StacClient;
use crate::services::terrain::TerrainProcessor;

/// Runs the full fetch → process → assemble pipeline for one request.
#[derive(Clone)]
pub struct ModelGenerator {
    config: Arc<Configuration>,
    postgis: PostgisService,
    stac: StacClient,
}

impl ModelGenerator {
    pub fn new(config: Arc<Configuration>, postgis: PostgisService, stac: StacClient) -> Self {
        Self {
            config,
            postgis,
            stac,
        }
    }

    /// Fallback origin: the minimum corner of the polygon's exterior at
    /// height zero.
    pub fn origin_from_polygon(polygon: &str) -> Result<[f64; 3], GenerationError> {
        let parsed: Wkt<f64> = Wkt::from_str(polygon)
            .map_err(|e| GenerationError::Data(format!("polygon not parseable: {e}")))?;
        let Wkt::Polygon(polygon) = parsed else {
            return Err(GenerationError::Data("request geometry is not a polygon".into()));
        };
        let exterior = polygon
            .0
            .first()
            .ok_or_else(|| GenerationError::Data("polygon has no exterior ring".into()))?;
        let min_x = exterior.0.iter().map(|c| c.x).fold(f64::INFINITY, f64::min);
        let min_y = exterior.0.iter().map(|c| c.y).fold(f64::INFINITY, f64::min);
        if !min_x.is_finite() || !min_y.is_finite() {
            return Err(GenerationError::Data("polygon exterior ring is empty".into()));
        }
        Ok([min_x, min_y, 0.0])
    }

    /// Produce the in-memory model for a request.
    pub async fn generate(
        &self,
        ifc_version: IfcVersion,
        name: &str,
        polygon: &str,
        project_origin: Option<[f64; 3]>,
    ) -> Result<Model, GenerationError> {
        tracing::info!("start generating model");
        let origin = match project_origin {
            Some(origin) => origin,
            None => Self::origin_from_polygon(polygon)?,
        };

        let mut model = Model::new(name, ifc_version, origin);

        tracing::info!("process terrain feature classes");
        TerrainProcessor {
            config: &self.config,
            postgis: &self.postgis,
            stac: &self.stac,
        }
        .process(polygon, origin, &mut model)
        .await?;

        tracing::info!("process building feature classes");
        BuildingProcessor {
            config: &self.config,
            postgis: &self.postgis,
            stac: &self.stac,
        }
        .process(polygon, origin, &mut model)
        .await?;

        Ok(model)
    }

    /// Assemble the IFC entity graph for a finished model.
    pub fn build_ifc(&self, model: &Model) -> Result<StepFile, GenerationError> {
        let feature_classes: BTreeMap<_, _> = self
            .config
            .ifc
            .feature_classes
            .iter()
            .map(|(key, fc)| (key.clone(), fc.to_feature_class()))
            .collect();
        let building_classes: BTreeMap<_, _> = self
            .config
            .ifc
            .buildings
            .iter()
            .map(|(key, bc)| (key.clone(), bc.to_building_class()))
            .collect();
        let groups: BTreeMap<_, _> = self
            .config
            .ifc
            .groups
            .iter()
            .map(|(key, group)| (key.clone(), group.to_def()))
            .collect();

        let builder = IfcBuilder::new(
            self.config.ifc_settings(),
            feature_classes,
            building_classes,
            groups,
        );
        Ok(builder.build(model)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_the_exterior_minimum() {
        let origin =
            ModelGenerator::origin_from_polygon("POLYGON((3 7,10 7,10 12,3 12,3 7))").unwrap();
        assert_eq!(origin, [3.0, 7.0, 0.0]);
    }

    #[test]
    fn origin_rejects_non_polygons() {
        assert!(ModelGenerator::origin_from_polygon("POINT(1 2)").is_err());
        assert!(ModelGenerator::origin_from_polygon("garbage").is_err());
    }
}
