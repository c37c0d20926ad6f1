// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building feature classes decoded from CityGML.
//!
//! Identifiers intersecting the request polygon come from the spatial
//! database; the fetched CityGML files are stream-parsed and every
//! matched building is processed exactly once, dispatched to the first
//! feature class whose identifier set contains it.

use std::collections::HashSet;
use std::path::Path;

use terrabim_core::{Building, BuildingPart, Model};

use crate::config::{BuildingFeatureClassConfig, Configuration};
use crate::error::GenerationError;
use crate::services::citygml::{CityGmlStream, XmlNode};
use crate::services::postgis::PostgisService;
use crate::services::stac::StacClient;

pub struct BuildingProcessor<'a> {
    pub config: &'a Configuration,
    pub postgis: &'a PostgisService,
    pub stac: &'a StacClient,
}

impl BuildingProcessor<'_> {
    pub async fn process(
        &self,
        polygon: &str,
        origin: [f64; 3],
        model: &mut Model,
    ) -> Result<(), GenerationError> {
        let building_classes = &self.config.ifc.buildings;
        if building_classes.is_empty() {
            tracing::info!("no building feature classes configured");
            return Ok(());
        }
        let items_url = self
            .config
            .stac
            .building_items_url
            .as_deref()
            .ok_or_else(|| {
                GenerationError::Data("building feature classes without a CityGML endpoint".into())
            })?;

        tracing::info!("fetch city gml files");
        let bounding_box = self.postgis.bounding_box(&[polygon.to_string()]).await?;
        let files = self.stac.fetch_citygml_assets(items_url, &bounding_box).await?;
        tracing::info!(count = files.len(), "fetched city gml files");

        let mut matchers: Vec<ClassMatcher> = Vec::with_capacity(building_classes.len());
        for (key, building_class) in building_classes {
            let sql = tokio::fs::read_to_string(&building_class.sql).await?;
            let rows = self
                .postgis
                .fetch_feature_class_elements(&sql, polygon)
                .await?;
            let egids: HashSet<String> = rows
                .into_iter()
                .filter_map(|row| row.get("egid").cloned())
                .collect();
            tracing::info!(feature_class = %key, egids = egids.len(), "matched building identifiers");
            matchers.push(ClassMatcher {
                key: key.clone(),
                config: building_class.clone(),
                egids,
            });
        }

        for (index, file) in files.iter().enumerate() {
            tracing::info!(file = index + 1, total = files.len(), "processing city gml");
            let file = file.clone();
            let per_file_matchers = matchers.clone();
            let produced = tokio::task::spawn_blocking(move || {
                process_citygml_file(&file, &per_file_matchers, origin)
            })
            .await??;
            for (key, building) in produced {
                model.add_building(key, building);
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
struct ClassMatcher {
    key: String,
    config: BuildingFeatureClassConfig,
    egids: HashSet<String>,
}

/// Stream one CityGML file, decoding each matched building once.
fn process_citygml_file(
    path: &Path,
    matchers: &[ClassMatcher],
    origin: [f64; 3],
) -> Result<Vec<(String, Building)>, GenerationError> {
    let mut stream = CityGmlStream::open(path)?;
    let mut produced = Vec::new();
    while let Some(building_node) = stream.next_building()? {
        let matched = matchers.iter().find_map(|matcher| {
            let egid = building_node.find_text(&matcher.config.egid_path)?;
            matcher.egids.contains(&egid).then_some((matcher, egid))
        });
        if let Some((matcher, egid)) = matched {
            tracing::info!(egid = %egid, "process building");
            let building = decode_building(&building_node, &matcher.config, origin);
            produced.push((matcher.key.clone(), building));
        }
        // the subtree is dropped here, bounding memory per building
    }
    Ok(produced)
}

fn decode_building(
    node: &XmlNode,
    config: &BuildingFeatureClassConfig,
    origin: [f64; 3],
) -> Building {
    let mut building = Building::new();
    for mapping in &config.attributes {
        if let Some(value) = node.find_text(&mapping.path) {
            building.add_attribute(&mapping.attribute, value);
        }
    }
    for mapping in &config.properties {
        if let Some(value) = node.find_text(&mapping.path) {
            building.add_property(&mapping.set, &mapping.name, value);
        }
    }

    for part_config in &config.building_parts {
        let polygons: Vec<Vec<[f64; 3]>> = node
            .find_all(&part_config.path)
            .into_iter()
            .filter_map(|pos_list| decode_pos_list(&pos_list.text, origin))
            .collect();
        let mut part = BuildingPart::new(
            part_config.entity_type,
            polygons,
            part_config.color_definition,
        );
        for mapping in &part_config.attributes {
            if let Some(value) = node.find_text(&mapping.path) {
                part.add_attribute(&mapping.attribute, value);
            }
        }
        for mapping in &part_config.properties {
            if let Some(value) = node.find_text(&mapping.path) {
                part.add_property(&mapping.set, &mapping.name, value);
            }
        }
        building.add_part(part);
    }
    building
}

/// Split a `posList` into origin-reduced coordinate triples forming one
/// closed planar face.
fn decode_pos_list(text: &str, origin: [f64; 3]) -> Option<Vec<[f64; 3]>> {
    let values: Vec<f64> = text
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if values.is_empty() || values.len() % 3 != 0 {
        tracing::warn!(len = values.len(), "posList is not a list of coordinate triples");
        return None;
    }
    Some(
        values
            .chunks_exact(3)
            .map(|c| [c[0] - origin[0], c[1] - origin[1], c[2] - origin[2]])
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use terrabim_core::ElementEntityKind;

    fn building_class() -> BuildingFeatureClassConfig {
        serde_yaml::from_str(
            r#"
sql: buildings.sql
egid_path: "gen:stringAttribute[@name='EGID']/gen:value"
spatial_structure:
  entity_type: IFC_SITE
attributes:
  - attribute: Name
    path: "gen:stringAttribute[@name='EGID']/gen:value"
properties: []
building_parts:
  - path: "bldg:lod2Solid//gml:posList"
    entity_type: IFC_WALL
    color_definition: { r: 0.8, g: 0.8, b: 0.8, a: 0.0 }
"#,
        )
        .unwrap()
    }

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<core:CityModel xmlns:core="http://www.opengis.net/citygml/2.0"
    xmlns:bldg="http://www.opengis.net/citygml/building/2.0"
    xmlns:gen="http://www.opengis.net/citygml/generics/2.0"
    xmlns:gml="http://www.opengis.net/gml">
  <core:cityObjectMember>
    <bldg:Building>
      <gen:stringAttribute name="EGID"><gen:value>190</gen:value></gen:stringAttribute>
      <bldg:lod2Solid>
        <gml:posList>10 10 0 14 10 0 14 10 6 10 10 6</gml:posList>
      </bldg:lod2Solid>
    </bldg:Building>
  </core:cityObjectMember>
  <core:cityObjectMember>
    <bldg:Building>
      <gen:stringAttribute name="EGID"><gen:value>999</gen:value></gen:stringAttribute>
      <bldg:lod2Solid>
        <gml:posList>0 0 0 1 0 0 1 0 1</gml:posList>
      </bldg:lod2Solid>
    </bldg:Building>
  </core:cityObjectMember>
</core:CityModel>"#;

    #[test]
    fn matched_buildings_are_decoded_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let matchers = vec![ClassMatcher {
            key: "main".to_string(),
            config: building_class(),
            egids: HashSet::from(["190".to_string()]),
        }];
        let produced = process_citygml_file(file.path(), &matchers, [10.0, 10.0, 0.0]).unwrap();

        assert_eq!(produced.len(), 1);
        let (key, building) = &produced[0];
        assert_eq!(key, "main");
        assert_eq!(building.attributes["Name"], "190");
        assert_eq!(building.parts.len(), 1);
        let part = &building.parts[0];
        assert_eq!(part.entity_kind, ElementEntityKind::Wall);
        assert_eq!(part.polygons.len(), 1);
        // origin-reduced
        assert_eq!(part.polygons[0][0], [0.0, 0.0, 0.0]);
        assert_eq!(part.polygons[0][1], [4.0, 0.0, 0.0]);
    }

    #[test]
    fn pos_lists_with_broken_arity_are_skipped() {
        assert!(decode_pos_list("1 2 3 4", [0.0; 3]).is_none());
        assert!(decode_pos_list("", [0.0; 3]).is_none());
        let face = decode_pos_list("1 2 3 4 5 6 7 8 9", [1.0, 2.0, 3.0]).unwrap();
        assert_eq!(face[0], [0.0, 0.0, 0.0]);
        assert_eq!(face.len(), 3);
    }
}
