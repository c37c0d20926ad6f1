// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Translation of the accumulated model into an IFC entity graph.

use std::collections::{BTreeMap, HashMap};

use crate::config::{
    BuildingClass, ElementEntityKind, FeatureClass, GeoReferencing, GroupDef, GroupEntityKind,
    RepresentationMode, SpatialStructureKind,
};
use crate::error::{Error, Result};
use crate::guid::new_guid;
use crate::model::{Building, Color, Element, Geometry, Model};
use crate::step::{EntityId, StepFile, Value};

/// Output settings shared by all generated files.
#[derive(Debug, Clone)]
pub struct IfcSettings {
    pub author: String,
    pub version: String,
    pub application_name: String,
    pub project_name: String,
    pub geo_referencing: GeoReferencing,
    pub representation_mode: RepresentationMode,
}

/// Builds an IFC file from a [`Model`].
#[derive(Debug, Clone)]
pub struct IfcBuilder {
    settings: IfcSettings,
    feature_classes: BTreeMap<String, FeatureClass>,
    building_classes: BTreeMap<String, BuildingClass>,
    groups: BTreeMap<String, GroupDef>,
}

impl IfcBuilder {
    pub fn new(
        settings: IfcSettings,
        feature_classes: BTreeMap<String, FeatureClass>,
        building_classes: BTreeMap<String, BuildingClass>,
        groups: BTreeMap<String, GroupDef>,
    ) -> Self {
        Self {
            settings,
            feature_classes,
            building_classes,
            groups,
        }
    }

    /// Build the complete IFC entity graph for `model`.
    pub fn build(&self, model: &Model) -> Result<StepFile> {
        tracing::info!(file_name = %model.file_name, schema = %model.schema, "build ifc");
        let mut assembler = Assembler::start(self, model);
        assembler.feature_classes(model)?;
        assembler.buildings(model)?;
        tracing::info!(entities = assembler.file.n_entities(), "completed ifc build");
        Ok(assembler.file)
    }
}

/// Per-file assembly state.
struct Assembler<'a> {
    builder: &'a IfcBuilder,
    file: StepFile,
    owner_history: EntityId,
    sub_context: EntityId,
    project: EntityId,
    /// Placement carrying the global origin in `LoGeoRef30` mode.
    base_placement: EntityId,
    spatial_structures: BTreeMap<String, EntityId>,
    groups: BTreeMap<String, EntityId>,
    styles: HashMap<[u64; 4], EntityId>,
}

impl<'a> Assembler<'a> {
    fn start(builder: &'a IfcBuilder, model: &Model) -> Self {
        let settings = &builder.settings;
        let mut file = StepFile::new(model.schema, &model.file_name, &settings.application_name);

        let owner_history = add_owner_history(
            &mut file,
            &settings.author,
            &settings.version,
            &settings.application_name,
        );

        let length_unit = add_si_unit(&mut file, "LENGTHUNIT", "METRE");
        let area_unit = add_si_unit(&mut file, "AREAUNIT", "SQUARE_METRE");
        let volume_unit = add_si_unit(&mut file, "VOLUMEUNIT", "CUBIC_METRE");
        let radian_unit = add_si_unit(&mut file, "PLANEANGLEUNIT", "RADIAN");
        let unit_assignment =
            add_unit_assignment(&mut file, length_unit, area_unit, volume_unit, radian_unit);

        let context_location = match settings.geo_referencing {
            GeoReferencing::LoGeoRef40 => model.origin,
            _ => [0.0; 3],
        };
        let context = add_representation_context(&mut file, context_location);
        let sub_context = add_representation_sub_context(&mut file, context);

        if settings.geo_referencing == GeoReferencing::LoGeoRef50 {
            add_map_conversion(&mut file, length_unit, context, model.origin);
        }

        let project = file.entity(
            "IFCPROJECT",
            vec![
                Value::text(new_guid()),
                Value::Ref(owner_history),
                Value::text(&settings.project_name),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::RefList(vec![context]),
                Value::Ref(unit_assignment),
            ],
        );

        let base_location = match settings.geo_referencing {
            GeoReferencing::LoGeoRef30 => model.origin,
            _ => [0.0; 3],
        };
        let base_placement = add_local_placement(&mut file, None, base_location);

        Self {
            builder,
            file,
            owner_history,
            sub_context,
            project,
            base_placement,
            spatial_structures: BTreeMap::new(),
            groups: BTreeMap::new(),
            styles: HashMap::new(),
        }
    }

    fn feature_classes(&mut self, model: &Model) -> Result<()> {
        let builder = self.builder;
        for (key, elements) in &model.feature_classes {
            let feature_class = builder.feature_classes.get(key).ok_or_else(|| {
                Error::UnsupportedConfiguration(format!("no feature class configured for '{key}'"))
            })?;
            tracing::info!(feature_class = %key, elements = elements.len(), "build ifc elements");

            let structure =
                self.spatial_structure(&feature_class.spatial_structure.key(), feature_class)?;
            let style = self.surface_style(feature_class.color);

            let mut contained = Vec::with_capacity(elements.len());
            let mut grouped: BTreeMap<&str, Vec<EntityId>> = BTreeMap::new();
            for element in elements {
                let shape = self.element_shape(element, style)?;
                let placement = add_local_placement(&mut self.file, Some(self.base_placement), [0.0; 3]);
                let product =
                    self.product_entity(feature_class.entity_kind, &element.attributes, placement, shape);
                self.property_sets(product, &element.property_sets);
                contained.push(product);
                for group in &element.groups {
                    grouped.entry(group).or_default().push(product);
                }
            }
            self.contained_in_structure(&contained, structure);

            for (path, members) in grouped {
                let leaf = self.group_hierarchy(path);
                add_rel_assigns_to_group(&mut self.file, self.owner_history, &members, leaf);
            }
        }
        Ok(())
    }

    fn buildings(&mut self, model: &Model) -> Result<()> {
        let builder = self.builder;
        for (key, buildings) in &model.buildings {
            let building_class = builder.building_classes.get(key).ok_or_else(|| {
                Error::UnsupportedConfiguration(format!(
                    "no building feature class configured for '{key}'"
                ))
            })?;
            tracing::info!(feature_class = %key, buildings = buildings.len(), "build ifc buildings");

            let site = self.site(&building_class.spatial_structure.key(), &building_class.spatial_structure)?;
            for building in buildings {
                self.building(building, site)?;
            }
        }
        Ok(())
    }

    fn building(&mut self, building: &Building, site: EntityId) -> Result<()> {
        let placement = add_local_placement(&mut self.file, Some(self.base_placement), [0.0; 3]);
        let slots = ["Name", "Description", "ObjectType", "LongName"];
        let values = vec![
            Value::text(new_guid()),
            Value::Ref(self.owner_history),
            opt_attr(&building.attributes, "Name", &slots),
            opt_attr(&building.attributes, "Description", &slots),
            opt_attr(&building.attributes, "ObjectType", &slots),
            Value::Ref(placement),
            Value::Null,
            opt_attr(&building.attributes, "LongName", &slots),
            Value::Enum("ELEMENT"),
            Value::Null,
            Value::Null,
            Value::Null,
        ];
        let ifc_building = self.file.entity("IFCBUILDING", values);
        self.property_sets(ifc_building, &building.property_sets);
        add_rel_aggregates(&mut self.file, self.owner_history, site, &[ifc_building]);

        let mut contained = Vec::with_capacity(building.parts.len());
        for part in &building.parts {
            if part.polygons.is_empty() {
                continue;
            }
            let style = self.surface_style(part.color);
            let brep = self.brep_from_polygons(&part.polygons);
            add_styled_item(&mut self.file, brep, style);
            let shape = self.product_shape(brep, "Brep");
            let part_placement =
                add_local_placement(&mut self.file, Some(self.base_placement), [0.0; 3]);
            let product =
                self.product_entity(part.entity_kind, &part.attributes, part_placement, shape);
            self.property_sets(product, &part.property_sets);
            contained.push(product);
        }
        if !contained.is_empty() {
            add_rel_contained_in_spatial_structure(
                &mut self.file,
                self.owner_history,
                &contained,
                ifc_building,
            );
        }
        Ok(())
    }

    /// Representation of an element's geometry in the configured mode.
    fn element_shape(&mut self, element: &Element, style: EntityId) -> Result<EntityId> {
        let mode = self.builder.settings.representation_mode;
        let item = match (&element.geometry, mode) {
            (Geometry::Triangulation(triangles), RepresentationMode::Tessellation) => {
                self.tessellation(triangles)
            }
            (Geometry::Triangulation(triangles), RepresentationMode::Brep) => {
                self.brep_from_triangles(triangles)
            }
            (Geometry::Polygons(_), _) => {
                return Err(Error::UnsupportedConfiguration(
                    "element geometry must be a triangulation".into(),
                ))
            }
        };
        add_styled_item(&mut self.file, item, style);
        Ok(self.product_shape(item, mode.representation_type()))
    }

    /// Deduplicated vertex list referenced by one triangulated face set.
    fn tessellation(&mut self, triangles: &[[[f64; 3]; 3]]) -> EntityId {
        let mut index: HashMap<[u64; 3], i64> = HashMap::new();
        let mut coords: Vec<Vec<f64>> = Vec::new();
        let mut coord_index: Vec<Vec<i64>> = Vec::with_capacity(triangles.len());
        for triangle in triangles {
            let mut face = Vec::with_capacity(3);
            for vertex in triangle {
                let key = vertex.map(f64::to_bits);
                let position = *index.entry(key).or_insert_with(|| {
                    coords.push(vertex.to_vec());
                    coords.len() as i64
                });
                face.push(position);
            }
            coord_index.push(face);
        }

        let point_list = self.file.entity(
            "IFCCARTESIANPOINTLIST3D",
            vec![Value::RealListList(coords), Value::Null],
        );
        self.file.entity(
            "IFCTRIANGULATEDFACESET",
            vec![
                Value::Ref(point_list),
                Value::Null,
                Value::Bool(false),
                Value::IntListList(coord_index),
                Value::Null,
            ],
        )
    }

    /// One face per triangle with deduplicated cartesian points.
    fn brep_from_triangles(&mut self, triangles: &[[[f64; 3]; 3]]) -> EntityId {
        let polygons: Vec<Vec<[f64; 3]>> = triangles.iter().map(|t| t.to_vec()).collect();
        self.brep_from_polygons(&polygons)
    }

    fn brep_from_polygons(&mut self, polygons: &[Vec<[f64; 3]>]) -> EntityId {
        let mut index: HashMap<[u64; 3], EntityId> = HashMap::new();
        let mut faces = Vec::with_capacity(polygons.len());
        for polygon in polygons {
            let points: Vec<EntityId> = polygon
                .iter()
                .map(|vertex| {
                    let key = vertex.map(f64::to_bits);
                    *index
                        .entry(key)
                        .or_insert_with(|| add_cartesian_point(&mut self.file, *vertex))
                })
                .collect();
            let loop_id = self
                .file
                .entity("IFCPOLYLOOP", vec![Value::RefList(points)]);
            let bound = self.file.entity(
                "IFCFACEOUTERBOUND",
                vec![Value::Ref(loop_id), Value::Bool(true)],
            );
            faces.push(
                self.file
                    .entity("IFCFACE", vec![Value::RefList(vec![bound])]),
            );
        }
        let shell = self
            .file
            .entity("IFCCLOSEDSHELL", vec![Value::RefList(faces)]);
        self.file
            .entity("IFCFACETEDBREP", vec![Value::Ref(shell)])
    }

    fn product_shape(&mut self, item: EntityId, representation_type: &str) -> EntityId {
        let representation = self.file.entity(
            "IFCSHAPEREPRESENTATION",
            vec![
                Value::Ref(self.sub_context),
                Value::text("Body"),
                Value::text(representation_type),
                Value::RefList(vec![item]),
            ],
        );
        self.file.entity(
            "IFCPRODUCTDEFINITIONSHAPE",
            vec![Value::Null, Value::Null, Value::RefList(vec![representation])],
        )
    }

    /// Emit the product entity for an element kind, applying only the
    /// attributes the entity has a matching slot for.
    fn product_entity(
        &mut self,
        kind: ElementEntityKind,
        attributes: &BTreeMap<String, String>,
        placement: EntityId,
        shape: EntityId,
    ) -> EntityId {
        let (type_name, slots): (&str, &[&str]) = match kind {
            ElementEntityKind::GeographicElement => {
                ("IFCGEOGRAPHICELEMENT", &["Name", "Description", "ObjectType", "Tag"])
            }
            ElementEntityKind::Wall => ("IFCWALL", &["Name", "Description", "ObjectType", "Tag"]),
            ElementEntityKind::Slab => ("IFCSLAB", &["Name", "Description", "ObjectType", "Tag"]),
            ElementEntityKind::Roof => ("IFCROOF", &["Name", "Description", "ObjectType", "Tag"]),
            ElementEntityKind::BuildingElementProxy => (
                "IFCBUILDINGELEMENTPROXY",
                &["Name", "Description", "ObjectType", "Tag"],
            ),
            ElementEntityKind::Space => {
                ("IFCSPACE", &["Name", "Description", "ObjectType", "LongName"])
            }
        };

        for name in attributes.keys() {
            if !slots.contains(&name.as_str()) {
                tracing::debug!(attribute = %name, entity = type_name, "no matching attribute slot, skipped");
            }
        }

        let mut values = vec![
            Value::text(new_guid()),
            Value::Ref(self.owner_history),
            opt_attr(attributes, "Name", slots),
            opt_attr(attributes, "Description", slots),
            opt_attr(attributes, "ObjectType", slots),
            Value::Ref(placement),
            Value::Ref(shape),
        ];
        match kind {
            ElementEntityKind::Space => {
                values.push(opt_attr(attributes, "LongName", slots));
                // CompositionType, PredefinedType, ElevationWithFlooring
                values.extend([Value::Enum("ELEMENT"), Value::Null, Value::Null]);
            }
            _ => {
                values.push(opt_attr(attributes, "Tag", slots));
                values.push(Value::Null);
            }
        }
        self.file.entity(type_name, values)
    }

    fn property_sets(
        &mut self,
        product: EntityId,
        sets: &BTreeMap<String, crate::model::PropertySet>,
    ) {
        for (name, set) in sets {
            let properties: Vec<EntityId> = set
                .properties
                .iter()
                .map(|(key, value)| {
                    self.file.entity(
                        "IFCPROPERTYSINGLEVALUE",
                        vec![
                            Value::text(key),
                            Value::Null,
                            Value::Typed("IFCTEXT", Box::new(Value::text(value))),
                            Value::Null,
                        ],
                    )
                })
                .collect();
            let property_set = self.file.entity(
                "IFCPROPERTYSET",
                vec![
                    Value::text(new_guid()),
                    Value::Ref(self.owner_history),
                    Value::text(name),
                    Value::Null,
                    Value::RefList(properties),
                ],
            );
            self.file.entity(
                "IFCRELDEFINESBYPROPERTIES",
                vec![
                    Value::text(new_guid()),
                    Value::Ref(self.owner_history),
                    Value::Null,
                    Value::Null,
                    Value::RefList(vec![product]),
                    Value::Ref(property_set),
                ],
            );
        }
    }

    /// One spatial structure container per distinct configuration key.
    fn spatial_structure(&mut self, key: &str, feature_class: &FeatureClass) -> Result<EntityId> {
        if let Some(&existing) = self.spatial_structures.get(key) {
            return Ok(existing);
        }
        let definition = feature_class.spatial_structure.clone();
        self.site(key, &definition)
    }

    fn site(
        &mut self,
        key: &str,
        definition: &crate::config::SpatialStructureDef,
    ) -> Result<EntityId> {
        if let Some(&existing) = self.spatial_structures.get(key) {
            return Ok(existing);
        }
        debug_assert!(matches!(definition.kind, SpatialStructureKind::Site));

        let slots = ["Name", "Description", "ObjectType", "LongName"];
        for name in definition.attributes.keys() {
            if !slots.contains(&name.as_str()) {
                tracing::debug!(attribute = %name, entity = "IFCSITE", "no matching attribute slot, skipped");
            }
        }
        let site = self.file.entity(
            "IFCSITE",
            vec![
                Value::text(new_guid()),
                Value::Ref(self.owner_history),
                opt_attr(&definition.attributes, "Name", &slots),
                opt_attr(&definition.attributes, "Description", &slots),
                opt_attr(&definition.attributes, "ObjectType", &slots),
                Value::Ref(self.base_placement),
                Value::Null,
                opt_attr(&definition.attributes, "LongName", &slots),
                Value::Enum("ELEMENT"),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
            ],
        );
        add_rel_aggregates(&mut self.file, self.owner_history, self.project, &[site]);
        self.spatial_structures.insert(key.to_string(), site);
        Ok(site)
    }

    fn contained_in_structure(&mut self, elements: &[EntityId], structure: EntityId) {
        if !elements.is_empty() {
            add_rel_contained_in_spatial_structure(
                &mut self.file,
                self.owner_history,
                elements,
                structure,
            );
        }
    }

    /// Materialize a dotted group path, nesting each new segment under its
    /// parent, and return the leaf group.
    fn group_hierarchy(&mut self, path: &str) -> EntityId {
        let builder = self.builder;
        let mut walked = String::new();
        let mut leaf = None;
        for segment in path.split('.') {
            let parent = (!walked.is_empty()).then(|| self.groups[&walked]);
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);
            if let Some(&existing) = self.groups.get(&walked) {
                leaf = Some(existing);
                continue;
            }

            let group = match builder.groups.get(&walked) {
                Some(definition) => self.configured_group(segment, definition),
                None => add_group_entity(
                    &mut self.file,
                    self.owner_history,
                    "IFCGROUP",
                    segment,
                    None,
                    &[],
                ),
            };
            if let Some(parent) = parent {
                add_rel_assigns_to_group(&mut self.file, self.owner_history, &[group], parent);
            }
            self.groups.insert(walked.clone(), group);
            leaf = Some(group);
        }
        leaf.expect("group path has at least one segment")
    }

    fn configured_group(&mut self, name: &str, definition: &GroupDef) -> EntityId {
        for attribute in definition.attributes.keys() {
            if attribute != "Name" && attribute != "Description" {
                tracing::debug!(attribute = %attribute, "no matching group attribute slot, skipped");
            }
        }
        let description = definition.attributes.get("Description").map(String::as_str);
        let name = definition
            .attributes
            .get("Name")
            .map(String::as_str)
            .unwrap_or(name);
        let (type_name, trailing): (&str, Vec<Value>) = match definition.entity_kind {
            GroupEntityKind::Group => ("IFCGROUP", vec![]),
            GroupEntityKind::Zone => ("IFCZONE", vec![Value::Null]),
            GroupEntityKind::DistributionSystem => {
                ("IFCDISTRIBUTIONSYSTEM", vec![Value::Null, Value::Null])
            }
            GroupEntityKind::DistributionCircuit => {
                ("IFCDISTRIBUTIONCIRCUIT", vec![Value::Null, Value::Null])
            }
            GroupEntityKind::BuildingSystem => {
                ("IFCBUILDINGSYSTEM", vec![Value::Null, Value::Null])
            }
            GroupEntityKind::StructuralAnalysisModel => (
                "IFCSTRUCTURALANALYSISMODEL",
                vec![Value::Enum("NOTDEFINED"), Value::Null, Value::Null, Value::Null, Value::Null],
            ),
        };
        add_group_entity(
            &mut self.file,
            self.owner_history,
            type_name,
            name,
            description,
            &trailing,
        )
    }

    /// Styles are shared between products with the same color.
    fn surface_style(&mut self, color: Color) -> EntityId {
        let key = [color.r, color.g, color.b, color.a].map(f64::to_bits);
        if let Some(&existing) = self.styles.get(&key) {
            return existing;
        }
        let rgb = self.file.entity(
            "IFCCOLOURRGB",
            vec![
                Value::Null,
                Value::Real(color.r),
                Value::Real(color.g),
                Value::Real(color.b),
            ],
        );
        let shading = self.file.entity(
            "IFCSURFACESTYLESHADING",
            vec![Value::Ref(rgb), Value::Real(color.a)],
        );
        let style = self.file.entity(
            "IFCSURFACESTYLE",
            vec![
                Value::Null,
                Value::Enum("BOTH"),
                Value::RefList(vec![shading]),
            ],
        );
        self.styles.insert(key, style);
        style
    }
}

fn opt_attr(attributes: &BTreeMap<String, String>, name: &str, slots: &[&str]) -> Value {
    if !slots.contains(&name) {
        return Value::Null;
    }
    match attributes.get(name) {
        Some(value) => Value::text(value),
        None => Value::Null,
    }
}

fn add_cartesian_point(file: &mut StepFile, coordinates: [f64; 3]) -> EntityId {
    file.entity(
        "IFCCARTESIANPOINT",
        vec![Value::RealList(coordinates.to_vec())],
    )
}

fn add_owner_history(file: &mut StepFile, name: &str, version: &str, application: &str) -> EntityId {
    let person = file.entity(
        "IFCPERSON",
        vec![
            Value::Null,
            Value::Null,
            Value::text(name),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ],
    );
    let organization = file.entity(
        "IFCORGANIZATION",
        vec![
            Value::Null,
            Value::text(name),
            Value::Null,
            Value::Null,
            Value::Null,
        ],
    );
    let owning_user = file.entity(
        "IFCPERSONANDORGANIZATION",
        vec![Value::Ref(person), Value::Ref(organization), Value::Null],
    );
    let owning_application = file.entity(
        "IFCAPPLICATION",
        vec![
            Value::Ref(organization),
            Value::text(version),
            Value::text(application),
            Value::text(application),
        ],
    );
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    file.entity(
        "IFCOWNERHISTORY",
        vec![
            Value::Ref(owning_user),
            Value::Ref(owning_application),
            Value::Null,
            Value::Enum("ADDED"),
            Value::Int(timestamp),
            Value::Null,
            Value::Null,
            Value::Int(timestamp),
        ],
    )
}

fn add_si_unit(file: &mut StepFile, unit_type: &'static str, name: &'static str) -> EntityId {
    file.entity(
        "IFCSIUNIT",
        vec![
            Value::Derived,
            Value::Enum(unit_type),
            Value::Null,
            Value::Enum(name),
        ],
    )
}

fn add_unit_assignment(
    file: &mut StepFile,
    length_unit: EntityId,
    area_unit: EntityId,
    volume_unit: EntityId,
    radian_unit: EntityId,
) -> EntityId {
    let angle_measure = Value::Typed(
        "IFCPLANEANGLEMEASURE",
        Box::new(Value::Real(std::f64::consts::PI / 180.0)),
    );
    let conversion_factor = file.entity(
        "IFCMEASUREWITHUNIT",
        vec![angle_measure, Value::Ref(radian_unit)],
    );
    let dimensions = file.entity(
        "IFCDIMENSIONALEXPONENTS",
        vec![Value::Int(0); 7],
    );
    let degree_unit = file.entity(
        "IFCCONVERSIONBASEDUNIT",
        vec![
            Value::Ref(dimensions),
            Value::Enum("PLANEANGLEUNIT"),
            Value::text("DEGREE"),
            Value::Ref(conversion_factor),
        ],
    );
    file.entity(
        "IFCUNITASSIGNMENT",
        vec![Value::RefList(vec![
            length_unit,
            area_unit,
            volume_unit,
            degree_unit,
        ])],
    )
}

fn add_representation_context(file: &mut StepFile, location: [f64; 3]) -> EntityId {
    let point = add_cartesian_point(file, location);
    let world_coordinate_system = file.entity(
        "IFCAXIS2PLACEMENT3D",
        vec![Value::Ref(point), Value::Null, Value::Null],
    );
    file.entity(
        "IFCGEOMETRICREPRESENTATIONCONTEXT",
        vec![
            Value::Null,
            Value::text("Model"),
            Value::Int(3),
            Value::Real(1e-5),
            Value::Ref(world_coordinate_system),
            Value::Null,
        ],
    )
}

fn add_representation_sub_context(file: &mut StepFile, context: EntityId) -> EntityId {
    file.entity(
        "IFCGEOMETRICREPRESENTATIONSUBCONTEXT",
        vec![
            Value::text("Body"),
            Value::text("Model"),
            Value::Derived,
            Value::Derived,
            Value::Derived,
            Value::Derived,
            Value::Ref(context),
            Value::Null,
            Value::Enum("MODEL_VIEW"),
            Value::Null,
        ],
    )
}

/// Explicit map conversion to the Swiss projected CRS.
fn add_map_conversion(
    file: &mut StepFile,
    map_unit: EntityId,
    source_crs: EntityId,
    origin: [f64; 3],
) -> EntityId {
    let target_crs = file.entity(
        "IFCPROJECTEDCRS",
        vec![
            Value::text("EPSG:2056"),
            Value::text("CH1903+ / LV95 -- Swiss CH1903+ / LV95"),
            Value::text("CH1903+"),
            Value::text("LN02"),
            Value::text("CH1903+ / LV95"),
            Value::Null,
            Value::Ref(map_unit),
        ],
    );
    file.entity(
        "IFCMAPCONVERSION",
        vec![
            Value::Ref(source_crs),
            Value::Ref(target_crs),
            Value::Real(origin[0]),
            Value::Real(origin[1]),
            Value::Real(origin[2]),
            Value::Real(1.0),
            Value::Real(0.0),
            Value::Null,
        ],
    )
}

fn add_local_placement(
    file: &mut StepFile,
    relative_to: Option<EntityId>,
    location: [f64; 3],
) -> EntityId {
    let point = add_cartesian_point(file, location);
    let placement = file.entity(
        "IFCAXIS2PLACEMENT3D",
        vec![Value::Ref(point), Value::Null, Value::Null],
    );
    file.entity(
        "IFCLOCALPLACEMENT",
        vec![
            relative_to.map(Value::Ref).unwrap_or(Value::Null),
            Value::Ref(placement),
        ],
    )
}

fn add_rel_aggregates(
    file: &mut StepFile,
    owner_history: EntityId,
    relating: EntityId,
    related: &[EntityId],
) -> EntityId {
    file.entity(
        "IFCRELAGGREGATES",
        vec![
            Value::text(new_guid()),
            Value::Ref(owner_history),
            Value::Null,
            Value::Null,
            Value::Ref(relating),
            Value::RefList(related.to_vec()),
        ],
    )
}

fn add_rel_contained_in_spatial_structure(
    file: &mut StepFile,
    owner_history: EntityId,
    elements: &[EntityId],
    structure: EntityId,
) -> EntityId {
    file.entity(
        "IFCRELCONTAINEDINSPATIALSTRUCTURE",
        vec![
            Value::text(new_guid()),
            Value::Ref(owner_history),
            Value::Null,
            Value::Null,
            Value::RefList(elements.to_vec()),
            Value::Ref(structure),
        ],
    )
}

fn add_group_entity(
    file: &mut StepFile,
    owner_history: EntityId,
    type_name: &str,
    name: &str,
    description: Option<&str>,
    trailing: &[Value],
) -> EntityId {
    let mut values = vec![
        Value::text(new_guid()),
        Value::Ref(owner_history),
        Value::text(name),
        description.map(Value::text).unwrap_or(Value::Null),
        Value::Null,
    ];
    values.extend(trailing.iter().cloned());
    file.entity(type_name, values)
}

fn add_rel_assigns_to_group(
    file: &mut StepFile,
    owner_history: EntityId,
    related: &[EntityId],
    group: EntityId,
) -> EntityId {
    file.entity(
        "IFCRELASSIGNSTOGROUP",
        vec![
            Value::text(new_guid()),
            Value::Ref(owner_history),
            Value::Null,
            Value::Null,
            Value::RefList(related.to_vec()),
            Value::Null,
            Value::Ref(group),
        ],
    )
}

fn add_styled_item(file: &mut StepFile, item: EntityId, style: EntityId) -> EntityId {
    file.entity(
        "IFCSTYLEDITEM",
        vec![
            Value::Ref(item),
            Value::RefList(vec![style]),
            Value::Null,
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IfcVersion, SpatialStructureDef};
    use crate::model::PropertySet;

    fn settings(mode: RepresentationMode, geo: GeoReferencing) -> IfcSettings {
        IfcSettings {
            author: "tester".into(),
            version: "1.0".into(),
            application_name: "terrabim".into(),
            project_name: "test project".into(),
            geo_referencing: geo,
            representation_mode: mode,
        }
    }

    fn terrain_class() -> FeatureClass {
        FeatureClass {
            entity_kind: ElementEntityKind::GeographicElement,
            spatial_structure: SpatialStructureDef {
                kind: SpatialStructureKind::Site,
                attributes: BTreeMap::from([("Name".into(), "Terrain".into())]),
            },
            color: Color {
                r: 0.3,
                g: 0.6,
                b: 0.3,
                a: 0.0,
            },
        }
    }

    fn one_triangle_model() -> Model {
        let mut model = Model::new("test", IfcVersion::Ifc4, [0.0; 3]);
        let geometry = Geometry::Triangulation(vec![[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ]]);
        let mut element = Element::new(
            BTreeMap::from([("Name".into(), "parcel 1".into())]),
            vec!["canton.bern".into()],
            geometry,
        );
        element.add_property("Pset_Terrain", "egrid", "CH1234");
        model.add_element("parcels", element);
        model
    }

    fn build(model: &Model, mode: RepresentationMode, geo: GeoReferencing) -> String {
        let builder = IfcBuilder::new(
            settings(mode, geo),
            BTreeMap::from([("parcels".to_string(), terrain_class())]),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        builder.build(model).unwrap().to_step_string()
    }

    #[test]
    fn tessellation_mode_emits_face_set() {
        let text = build(
            &one_triangle_model(),
            RepresentationMode::Tessellation,
            GeoReferencing::LoGeoRef40,
        );
        assert!(text.contains("IFCTRIANGULATEDFACESET"));
        assert!(text.contains("IFCCARTESIANPOINTLIST3D"));
        assert!(text.contains("IFCGEOGRAPHICELEMENT"));
        assert!(text.contains("'parcel 1'"));
        assert!(text.contains("IFCPROPERTYSET"));
        assert!(text.contains("'CH1234'"));
        assert!(!text.contains("IFCFACETEDBREP"));
    }

    #[test]
    fn brep_mode_emits_faces() {
        let text = build(
            &one_triangle_model(),
            RepresentationMode::Brep,
            GeoReferencing::LoGeoRef40,
        );
        assert!(text.contains("IFCFACETEDBREP"));
        assert!(text.contains("IFCPOLYLOOP"));
        assert!(text.contains("IFCFACEOUTERBOUND"));
        assert!(!text.contains("IFCTRIANGULATEDFACESET"));
    }

    #[test]
    fn tessellation_deduplicates_vertices() {
        let mut model = Model::new("test", IfcVersion::Ifc4, [0.0; 3]);
        // two triangles sharing an edge: 4 unique vertices
        let geometry = Geometry::Triangulation(vec![
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
        ]);
        model.add_element(
            "parcels",
            Element::new(BTreeMap::new(), vec![], geometry),
        );
        let text = build(&model, RepresentationMode::Tessellation, GeoReferencing::LoGeoRef40);
        let coord_list = text
            .lines()
            .find(|l| l.contains("IFCCARTESIANPOINTLIST3D"))
            .unwrap();
        assert_eq!(coord_list.matches("(0.,").count() + coord_list.matches("(1.,").count(), 4);
    }

    #[test]
    fn map_conversion_only_in_lo_geo_ref_50() {
        let with = build(
            &one_triangle_model(),
            RepresentationMode::Tessellation,
            GeoReferencing::LoGeoRef50,
        );
        let without = build(
            &one_triangle_model(),
            RepresentationMode::Tessellation,
            GeoReferencing::LoGeoRef40,
        );
        assert!(with.contains("IFCMAPCONVERSION"));
        assert!(with.contains("'EPSG:2056'"));
        assert!(!without.contains("IFCMAPCONVERSION"));
    }

    #[test]
    fn origin_lands_on_the_configured_carrier() {
        let mut model = one_triangle_model();
        model.origin = [2600000.0, 1200000.0, 400.0];

        let geo30 = build(&model, RepresentationMode::Tessellation, GeoReferencing::LoGeoRef30);
        let geo40 = build(&model, RepresentationMode::Tessellation, GeoReferencing::LoGeoRef40);
        assert!(geo30.contains("(2600000.,1200000.,400.)"));
        assert!(geo40.contains("(2600000.,1200000.,400.)"));
    }

    #[test]
    fn groups_nest_along_dotted_paths() {
        let builder = IfcBuilder::new(
            settings(RepresentationMode::Tessellation, GeoReferencing::LoGeoRef40),
            BTreeMap::from([("parcels".to_string(), terrain_class())]),
            BTreeMap::new(),
            BTreeMap::from([(
                "canton".to_string(),
                GroupDef {
                    entity_kind: GroupEntityKind::Zone,
                    attributes: BTreeMap::new(),
                },
            )]),
        );
        let text = builder.build(&one_triangle_model()).unwrap().to_step_string();

        // configured prefix becomes a zone, unconfigured leaf a plain group
        assert!(text.contains("IFCZONE"));
        assert!(text.contains("IFCGROUP"));
        assert_eq!(text.matches("IFCRELASSIGNSTOGROUP").count(), 2);
        assert!(text.contains("'bern'"));
    }

    #[test]
    fn unknown_feature_class_is_fatal() {
        let builder = IfcBuilder::new(
            settings(RepresentationMode::Tessellation, GeoReferencing::LoGeoRef40),
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        let err = builder.build(&one_triangle_model()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedConfiguration(_)));
    }

    #[test]
    fn buildings_are_aggregated_with_parts() {
        let mut model = Model::new("test", IfcVersion::Ifc4, [0.0; 3]);
        let mut building = Building::new();
        building.add_attribute("Name", "EGID 192");
        let mut part = crate::model::BuildingPart::new(
            ElementEntityKind::Wall,
            vec![vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 0.0, 2.0],
                [0.0, 0.0, 2.0],
            ]],
            Color {
                r: 0.8,
                g: 0.8,
                b: 0.8,
                a: 0.0,
            },
        );
        part.add_property("Pset_Wall", "material", "brick");
        building.add_part(part);
        model.add_building("buildings", building);

        let builder = IfcBuilder::new(
            settings(RepresentationMode::Tessellation, GeoReferencing::LoGeoRef40),
            BTreeMap::new(),
            BTreeMap::from([(
                "buildings".to_string(),
                BuildingClass {
                    spatial_structure: SpatialStructureDef {
                        kind: SpatialStructureKind::Site,
                        attributes: BTreeMap::new(),
                    },
                },
            )]),
            BTreeMap::new(),
        );
        let text = builder.build(&model).unwrap().to_step_string();

        assert!(text.contains("IFCBUILDING("));
        assert!(text.contains("IFCWALL"));
        assert!(text.contains("IFCFACETEDBREP"));
        assert!(text.contains("'EGID 192'"));
        assert!(text.contains("IFCRELAGGREGATES"));
        assert!(text.contains("IFCRELCONTAINEDINSPATIALSTRUCTURE"));
    }

    #[test]
    fn rebuilding_yields_the_same_graph_modulo_ids() {
        let model = one_triangle_model();
        let a = build(&model, RepresentationMode::Tessellation, GeoReferencing::LoGeoRef40);
        let b = build(&model, RepresentationMode::Tessellation, GeoReferencing::LoGeoRef40);

        let strip = |text: &str| -> Vec<String> {
            text.lines()
                .filter(|l| l.starts_with('#'))
                .filter(|l| !l.contains("IFCOWNERHISTORY"))
                .map(|l| {
                    // GlobalIds differ between runs; blank the first text attribute
                    // of rooted entities before comparing
                    let mut line = l.to_string();
                    if let (Some(start), Some(end)) = (line.find("('"), line.find("',")) {
                        if end > start {
                            line.replace_range(start + 1..end + 1, "GUID");
                        }
                    }
                    line
                })
                .collect()
        };
        assert_eq!(strip(&a).len(), strip(&b).len());
        for (la, lb) in strip(&a).iter().zip(strip(&b).iter()) {
            assert_eq!(la, lb);
        }
    }

    #[test]
    fn polygons_geometry_on_element_is_unsupported() {
        let mut model = Model::new("test", IfcVersion::Ifc4, [0.0; 3]);
        model.add_element(
            "parcels",
            Element::new(
                BTreeMap::new(),
                vec![],
                Geometry::Polygons(vec![vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]),
            ),
        );
        let builder = IfcBuilder::new(
            settings(RepresentationMode::Tessellation, GeoReferencing::LoGeoRef40),
            BTreeMap::from([("parcels".to_string(), terrain_class())]),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert!(matches!(
            builder.build(&model).unwrap_err(),
            Error::UnsupportedConfiguration(_)
        ));
    }

    #[test]
    fn empty_property_sets_still_emit() {
        let mut model = one_triangle_model();
        model.feature_classes.get_mut("parcels").unwrap()[0]
            .property_sets
            .insert("Pset_Empty".into(), PropertySet::default());
        let text = build(&model, RepresentationMode::Tessellation, GeoReferencing::LoGeoRef40);
        assert!(text.contains("Pset_Empty"));
    }
}
