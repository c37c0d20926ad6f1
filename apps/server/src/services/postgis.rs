// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spatial database access.
//!
//! Feature class statements are opaque SQL loaded from the configured
//! files; every statement takes the request polygon as its only bind
//! variable (`$1`) and is expected to return text columns.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Column, Row};
use wkt::Wkt;

use crate::config::DbConfig;
use crate::error::GenerationError;
use crate::services::bounding_box::BoundingBox;

#[derive(Debug, Clone)]
pub struct PostgisService {
    pool: PgPool,
}

impl PostgisService {
    pub async fn connect(config: &DbConfig) -> Result<Self, GenerationError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&config.url())
            .await?;
        Ok(Self { pool })
    }

    /// Run a feature class statement and return its rows as string maps.
    pub async fn fetch_feature_class_elements(
        &self,
        sql: &str,
        polygon: &str,
    ) -> Result<Vec<HashMap<String, String>>, GenerationError> {
        let rows = sqlx::query(sql).bind(polygon).fetch_all(&self.pool).await?;

        let mut elements = Vec::with_capacity(rows.len());
        for row in &rows {
            if row.columns().is_empty() {
                return Err(GenerationError::Data(
                    "feature class query returned no columns".into(),
                ));
            }
            let mut element = HashMap::with_capacity(row.columns().len());
            for column in row.columns() {
                if let Some(value) = decode_column(row, column.ordinal()) {
                    element.insert(column.name().to_string(), value);
                } else {
                    tracing::debug!(column = column.name(), "column not decodable as text, skipped");
                }
            }
            elements.push(element);
        }
        Ok(elements)
    }

    /// Minimal bounding box containing all geometries of `wkts`.
    pub async fn bounding_box(&self, wkts: &[String]) -> Result<BoundingBox, GenerationError> {
        if wkts.is_empty() {
            return Err(GenerationError::Data(
                "bounding box requested for no geometries".into(),
            ));
        }
        let members: Vec<String> = (1..=wkts.len())
            .map(|i| format!("ST_GeomFromText(${i})"))
            .collect();
        let sql = format!(
            "SELECT ST_AsText(ST_Envelope(ST_Collect(ARRAY[{}])))",
            members.join(",")
        );
        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for wkt in wkts {
            query = query.bind(wkt);
        }
        let envelope = query.fetch_one(&self.pool).await?;
        parse_envelope(&envelope)
    }
}

fn decode_column(row: &sqlx::postgres::PgRow, ordinal: usize) -> Option<String> {
    if let Ok(value) = row.try_get::<Option<String>, _>(ordinal) {
        return value;
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(ordinal) {
        return value.map(|v| v.to_string());
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(ordinal) {
        return value.map(|v| v.to_string());
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(ordinal) {
        return value.map(|v| v.to_string());
    }
    None
}

/// Parse the WKT envelope returned by PostGIS back into plane extents.
fn parse_envelope(envelope: &str) -> Result<BoundingBox, GenerationError> {
    let parsed: Wkt<f64> = Wkt::from_str(envelope.trim())
        .map_err(|e| GenerationError::Data(format!("bounding box envelope not parseable: {e}")))?;

    let mut coords: Vec<(f64, f64)> = Vec::new();
    collect_coords(&parsed, &mut coords);
    if coords.is_empty() {
        return Err(GenerationError::Data(
            "bounding box envelope is empty".into(),
        ));
    }

    let mut bbox = BoundingBox {
        min_easting: f64::INFINITY,
        min_northing: f64::INFINITY,
        max_easting: f64::NEG_INFINITY,
        max_northing: f64::NEG_INFINITY,
    };
    for (x, y) in coords {
        bbox.min_easting = bbox.min_easting.min(x);
        bbox.min_northing = bbox.min_northing.min(y);
        bbox.max_easting = bbox.max_easting.max(x);
        bbox.max_northing = bbox.max_northing.max(y);
    }
    Ok(bbox)
}

fn collect_coords(geometry: &Wkt<f64>, out: &mut Vec<(f64, f64)>) {
    match geometry {
        Wkt::Point(p) => {
            if let Some(coord) = &p.0 {
                out.push((coord.x, coord.y));
            }
        }
        Wkt::LineString(ls) => {
            out.extend(ls.0.iter().map(|c| (c.x, c.y)));
        }
        Wkt::Polygon(poly) => {
            for ring in &poly.0 {
                out.extend(ring.0.iter().map(|c| (c.x, c.y)));
            }
        }
        _ => {}
    }
}
