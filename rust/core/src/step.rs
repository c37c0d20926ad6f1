// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP physical file (ISO 10303-21) writer.
//!
//! Entities are appended in creation order and may reference each other
//! by [`EntityId`]; the header and section framing are emitted on
//! serialization.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::IfcVersion;

/// Instance name (`#n`) of an entity in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(u32);

/// One attribute value of a STEP entity instance.
#[derive(Debug, Clone)]
pub enum Value {
    Ref(EntityId),
    RefList(Vec<EntityId>),
    Text(String),
    Real(f64),
    RealList(Vec<f64>),
    /// Nested real lists, e.g. a `CoordList`.
    RealListList(Vec<Vec<f64>>),
    Int(i64),
    /// Nested integer lists, e.g. a `CoordIndex`.
    IntListList(Vec<Vec<i64>>),
    /// Enumeration literal, written `.LITERAL.`.
    Enum(&'static str),
    /// Select value wrapped in its type, e.g. `IFCTEXT('...')`.
    Typed(&'static str, Box<Value>),
    Bool(bool),
    /// Unset optional attribute (`$`).
    Null,
    /// Attribute derived in a subtype (`*`).
    Derived,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    fn render(&self, out: &mut String) {
        match self {
            Value::Ref(id) => {
                let _ = write!(out, "#{}", id.0);
            }
            Value::RefList(ids) => {
                out.push('(');
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "#{}", id.0);
                }
                out.push(')');
            }
            Value::Text(s) => {
                out.push('\'');
                out.push_str(&s.replace('\'', "''"));
                out.push('\'');
            }
            Value::Real(x) => out.push_str(&format_real(*x)),
            Value::RealList(xs) => {
                out.push('(');
                for (i, x) in xs.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&format_real(*x));
                }
                out.push(')');
            }
            Value::RealListList(lists) => {
                out.push('(');
                for (i, xs) in lists.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    Value::RealList(xs.clone()).render(out);
                }
                out.push(')');
            }
            Value::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Value::IntListList(lists) => {
                out.push('(');
                for (i, ns) in lists.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('(');
                    for (j, n) in ns.iter().enumerate() {
                        if j > 0 {
                            out.push(',');
                        }
                        let _ = write!(out, "{n}");
                    }
                    out.push(')');
                }
                out.push(')');
            }
            Value::Enum(literal) => {
                let _ = write!(out, ".{literal}.");
            }
            Value::Typed(type_name, inner) => {
                let _ = write!(out, "{type_name}(");
                inner.render(out);
                out.push(')');
            }
            Value::Bool(b) => out.push_str(if *b { ".T." } else { ".F." }),
            Value::Null => out.push('$'),
            Value::Derived => out.push('*'),
        }
    }
}

/// STEP reals carry an explicit decimal point.
fn format_real(x: f64) -> String {
    if x == x.trunc() && x.abs() < 1e15 {
        format!("{x}.")
    } else {
        format!("{x}")
    }
}

/// An IFC file under construction.
#[derive(Debug)]
pub struct StepFile {
    schema: IfcVersion,
    file_name: String,
    application: String,
    rows: Vec<String>,
}

impl StepFile {
    pub fn new(schema: IfcVersion, file_name: &str, application: &str) -> Self {
        Self {
            schema,
            file_name: file_name.to_string(),
            application: application.to_string(),
            rows: Vec::new(),
        }
    }

    /// Append an entity instance and return its instance name.
    pub fn entity(&mut self, ifc_type: &str, values: Vec<Value>) -> EntityId {
        let id = EntityId(self.rows.len() as u32 + 1);
        let mut row = format!("#{}={}(", id.0, ifc_type);
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                row.push(',');
            }
            value.render(&mut row);
        }
        row.push_str(");");
        self.rows.push(row);
        id
    }

    pub fn n_entities(&self) -> usize {
        self.rows.len()
    }

    /// Render the complete exchange structure.
    pub fn to_step_string(&self) -> String {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let mut out = String::new();
        out.push_str("ISO-10303-21;\n");
        out.push_str("HEADER;\n");
        out.push_str("FILE_DESCRIPTION(('ViewDefinition [ReferenceView]'),'2;1');\n");
        let _ = writeln!(
            out,
            "FILE_NAME('{}','{}',(''),(''),'','{}','');",
            self.file_name.replace('\'', "''"),
            timestamp,
            self.application.replace('\'', "''"),
        );
        let _ = writeln!(out, "FILE_SCHEMA(('{}'));", self.schema.schema_name());
        out.push_str("ENDSEC;\n");
        out.push_str("DATA;\n");
        for row in &self.rows {
            out.push_str(row);
            out.push('\n');
        }
        out.push_str("ENDSEC;\n");
        out.push_str("END-ISO-10303-21;\n");
        out
    }

    /// Write the exchange structure to `path`.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(self.to_step_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_entity_rows() {
        let mut file = StepFile::new(IfcVersion::Ifc4, "test.ifc", "terrabim");
        let point = file.entity(
            "IFCCARTESIANPOINT",
            vec![Value::RealList(vec![0.0, 1.5, 2.0])],
        );
        file.entity(
            "IFCAXIS2PLACEMENT3D",
            vec![Value::Ref(point), Value::Null, Value::Null],
        );

        let text = file.to_step_string();
        assert!(text.contains("#1=IFCCARTESIANPOINT((0.,1.5,2.));"));
        assert!(text.contains("#2=IFCAXIS2PLACEMENT3D(#1,$,$);"));
    }

    #[test]
    fn escapes_apostrophes_in_text() {
        let mut file = StepFile::new(IfcVersion::Ifc4, "test.ifc", "terrabim");
        file.entity("IFCORGANIZATION", vec![Value::Null, Value::text("l'org")]);
        assert!(file.to_step_string().contains("'l''org'"));
    }

    #[test]
    fn frames_header_and_sections() {
        let file = StepFile::new(IfcVersion::Ifc4x3, "model.ifc", "terrabim");
        let text = file.to_step_string();
        assert!(text.starts_with("ISO-10303-21;"));
        assert!(text.contains("FILE_SCHEMA(('IFC4X3'));"));
        assert!(text.ends_with("END-ISO-10303-21;\n"));
    }

    #[test]
    fn formats_reals_with_decimal_point() {
        assert_eq!(format_real(5.0), "5.");
        assert_eq!(format_real(-3.0), "-3.");
        assert_eq!(format_real(0.125), "0.125");
    }

    #[test]
    fn renders_typed_and_enum_values() {
        let mut file = StepFile::new(IfcVersion::Ifc4, "t.ifc", "terrabim");
        file.entity(
            "IFCMEASUREWITHUNIT",
            vec![
                Value::Typed("IFCPLANEANGLEMEASURE", Box::new(Value::Real(0.5))),
                Value::Enum("RADIAN"),
            ],
        );
        let text = file.to_step_string();
        assert!(text.contains("IFCPLANEANGLEMEASURE(0.5)"));
        assert!(text.contains(".RADIAN."));
    }
}
