// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Clipped terrain feature classes.
//!
//! Per feature class the processor queries the spatial database for
//! element footprints, fetches the DTM tiles covering them, accumulates
//! raster points per element and turns each footprint into a clipped,
//! decimated TIN element of the model.

use std::collections::{BTreeMap, HashMap};

use terrabim_core::{Element, Geometry, Model};
use terrabim_tin::{Area, Mesh, RasterPoints};

use crate::config::{Configuration, TerrainFeatureClassConfig, TinConfig};
use crate::error::GenerationError;
use crate::services::postgis::PostgisService;
use crate::services::stac::StacClient;

/// Raster points are collected this many grid cells beyond the footprint
/// so clipping always has surface to slice into.
const BUFFER_CELLS: f64 = 3.0;

pub struct TerrainProcessor<'a> {
    pub config: &'a Configuration,
    pub postgis: &'a PostgisService,
    pub stac: &'a StacClient,
}

impl TerrainProcessor<'_> {
    pub async fn process(
        &self,
        polygon: &str,
        origin: [f64; 3],
        model: &mut Model,
    ) -> Result<(), GenerationError> {
        let feature_classes = &self.config.ifc.feature_classes;
        if feature_classes.is_empty() {
            tracing::info!("no terrain feature classes configured");
            return Ok(());
        }
        let dtm_items_url = self.config.stac.dtm_items_url.as_deref().ok_or_else(|| {
            GenerationError::Data("terrain feature classes without a DTM endpoint".into())
        })?;

        let mut wkts = Vec::new();
        let mut class_elements: BTreeMap<String, Vec<HashMap<String, String>>> = BTreeMap::new();
        for (key, feature_class) in feature_classes {
            tracing::info!(feature_class = %key, "fetch feature class elements");
            let sql = tokio::fs::read_to_string(&feature_class.sql).await?;
            let elements = self
                .postgis
                .fetch_feature_class_elements(&sql, polygon)
                .await?;
            wkts.extend(elements.iter().filter_map(|e| e.get("wkt").cloned()));
            class_elements.insert(key.clone(), elements);
        }

        tracing::info!("calculate bounding box for fetching dtm files");
        let bounding_box = if wkts.is_empty() {
            tracing::warn!("no content found for this polygon");
            self.postgis.bounding_box(&[polygon.to_string()]).await?
        } else {
            self.postgis.bounding_box(&wkts).await?
        };

        let grid_size = self.config.tin.grid_size;
        let dtm_files = self
            .stac
            .fetch_dtm_assets(dtm_items_url, &bounding_box, grid_size)
            .await?;
        tracing::info!(count = dtm_files.len(), "fetched dtm files");

        for (key, feature_class) in feature_classes {
            let elements = class_elements.remove(key).unwrap_or_default();
            tracing::info!(feature_class = %key, elements = elements.len(), "create feature class");

            let mut mesh_data: Vec<MeshData> = Vec::with_capacity(elements.len());
            for element_data in elements {
                match MeshData::new(element_data, origin) {
                    Ok(data) => mesh_data.push(data),
                    Err(e) => tracing::warn!(error = %e, "invalid element footprint, skipped"),
                }
            }

            for dtm_file in &dtm_files {
                tracing::info!(file = %dtm_file.display(), "load and process dtm file");
                let raster = RasterPoints::from_xyz_file(dtm_file, origin)?;
                for data in &mut mesh_data {
                    data.add_raster_points(&raster, grid_size);
                }
            }

            // the mesh pipeline is CPU-bound and must not stall the runtime
            let tin = self.config.tin;
            let feature_class = feature_class.clone();
            let produced = tokio::task::spawn_blocking(move || {
                let mut produced = Vec::with_capacity(mesh_data.len());
                for (index, data) in mesh_data.into_iter().enumerate() {
                    match data.into_element(&tin, &feature_class) {
                        Ok(element) => produced.push(element),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            tracing::error!(element = index, error = %e, "error creating mesh, skipping element")
                        }
                    }
                }
                Ok(produced)
            })
            .await??;

            for element in produced {
                model.add_element(key.clone(), element);
            }
            tracing::info!(feature_class = %key, "finished creating meshes");
        }
        Ok(())
    }
}

/// Accumulated raster coverage for one element footprint.
#[derive(Debug)]
struct MeshData {
    data: HashMap<String, String>,
    area: Area,
    within: Vec<[f64; 3]>,
    buffered: Vec<[f64; 3]>,
}

impl MeshData {
    fn new(data: HashMap<String, String>, origin: [f64; 3]) -> Result<Self, GenerationError> {
        let wkt = data
            .get("wkt")
            .ok_or_else(|| GenerationError::Data("element row has no wkt column".into()))?;
        let area = Area::new(wkt, [origin[0], origin[1]])?;
        Ok(Self {
            data,
            area,
            within: Vec::new(),
            buffered: Vec::new(),
        })
    }

    fn add_raster_points(&mut self, raster: &RasterPoints, grid_size: f64) {
        if let Some(points) = raster.within(self.area.polygon(), BUFFER_CELLS * grid_size) {
            self.buffered.extend(points);
        }
        if let Some(points) = raster.within(self.area.polygon(), 0.0) {
            self.within.extend(points);
        }
    }

    fn into_element(
        self,
        tin: &TinConfig,
        feature_class: &TerrainFeatureClassConfig,
    ) -> Result<Element, GenerationError> {
        let mesh = Mesh::from_points(&self.buffered)?
            .clip_by_area(&self.area, &self.within)?
            .decimate(tin.max_height_error, tin.grid_size, 0.0)?;

        let consistent = mesh.check_area_consistency(self.area.area(), 0.1);
        tracing::debug!(consistent, "area consistency");

        let (points, faces) = mesh.get_data();
        let geometry = Geometry::from_indexed(&points, &faces);

        let mut attributes = BTreeMap::new();
        for mapping in &feature_class.attributes {
            if let Some(value) = self.data.get(&mapping.column) {
                attributes.insert(mapping.attribute.clone(), value.clone());
            }
        }
        let groups = feature_class
            .group_columns
            .iter()
            .filter_map(|column| self.data.get(column).cloned())
            .collect();

        let mut element = Element::new(attributes, groups, geometry);
        for mapping in &feature_class.properties {
            if let Some(value) = self.data.get(&mapping.column) {
                element.add_property(&mapping.set, &mapping.name, value);
            }
        }
        Ok(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrabim_core::Color;

    fn feature_class() -> TerrainFeatureClassConfig {
        serde_yaml::from_str(
            r#"
sql: parcels.sql
entity_type: IFC_GEOGRAPHIC_ELEMENT
attributes:
  - attribute: Name
    column: name
properties:
  - name: egrid
    set: Pset_Parcel
    column: egrid
spatial_structure:
  entity_type: IFC_SITE
group_columns: [canton_path]
color_definition: { r: 0.5, g: 0.5, b: 0.5, a: 0.0 }
"#,
        )
        .unwrap()
    }

    fn grid(n: usize, z: f64) -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                points.push([i as f64, j as f64, z]);
            }
        }
        points
    }

    #[test]
    fn produces_an_element_with_attributes_and_groups() {
        let data = HashMap::from([
            ("wkt".to_string(), "POLYGON((1 1,9 1,9 9,1 9,1 1))".to_string()),
            ("name".to_string(), "parcel 7".to_string()),
            ("egrid".to_string(), "CH7777".to_string()),
            ("canton_path".to_string(), "canton.bern".to_string()),
        ]);
        let mut mesh_data = MeshData::new(data, [0.0; 3]).unwrap();
        mesh_data.add_raster_points(&RasterPoints::new(grid(11, 4.0), [0.0; 3]), 1.0);
        assert!(!mesh_data.within.is_empty());
        assert!(mesh_data.buffered.len() > mesh_data.within.len());

        let tin = TinConfig {
            grid_size: 1.0,
            max_height_error: 0.1,
        };
        let element = mesh_data.into_element(&tin, &feature_class()).unwrap();
        assert_eq!(element.attributes["Name"], "parcel 7");
        assert_eq!(element.groups, vec!["canton.bern".to_string()]);
        assert_eq!(
            element.property_sets["Pset_Parcel"].properties["egrid"],
            "CH7777"
        );
        match &element.geometry {
            Geometry::Triangulation(triangles) => assert!(!triangles.is_empty()),
            _ => panic!("expected a triangulation"),
        }
    }

    #[test]
    fn missing_wkt_column_is_a_data_error() {
        let err = MeshData::new(HashMap::new(), [0.0; 3]).unwrap_err();
        assert!(matches!(err, GenerationError::Data(_)));
    }

    #[test]
    fn multipolygon_footprints_are_rejected() {
        let data = HashMap::from([(
            "wkt".to_string(),
            "MULTIPOLYGON(((0 0,1 0,1 1,0 1,0 0)))".to_string(),
        )]);
        let err = MeshData::new(data, [0.0; 3]).unwrap_err();
        assert!(matches!(err, GenerationError::Geometry(_)));
    }

    #[test]
    fn empty_coverage_yields_no_element() {
        let data = HashMap::from([(
            "wkt".to_string(),
            "POLYGON((1 1,9 1,9 9,1 9,1 1))".to_string(),
        )]);
        let mesh_data = MeshData::new(data, [0.0; 3]).unwrap();
        let tin = TinConfig {
            grid_size: 1.0,
            max_height_error: 0.1,
        };
        // no raster points were ever added
        assert!(mesh_data.into_element(&tin, &feature_class()).is_err());
    }

    #[test]
    fn color_parses_from_yaml() {
        let color: Color = serde_yaml::from_str("{ r: 0.1, g: 0.2, b: 0.3, a: 0.4 }").unwrap();
        assert_eq!(color.a, 0.4);
    }
}
