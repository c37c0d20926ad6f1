// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Validated polygonal footprints.
//!
//! Circular arcs are not supported and must be segmented upstream
//! (`ST_CurveToLine` with flag 1 produces symmetric output so adjacent
//! areas do not overlap).

use std::str::FromStr;

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Area as GeoArea, Coord, Line, LineString, Polygon, Winding};
use wkt::Wkt;

use crate::error::{Error, Result};

/// A simple polygon with zero or more holes, origin-reduced.
///
/// Invariants established at construction: the exterior ring is
/// counter-clockwise, every hole is clockwise, and all coordinates are
/// shifted by the 2D origin. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct Area {
    polygon: Polygon<f64>,
}

impl Area {
    /// Parse a WKT polygon and normalize it.
    ///
    /// Fails with [`Error::BadGeometry`] on non-polygon WKT, multi-polygon
    /// input, unclosed rings or self-intersecting rings.
    pub fn new(wkt_str: &str, origin: [f64; 2]) -> Result<Self> {
        let parsed: Wkt<f64> = Wkt::from_str(wkt_str)
            .map_err(|e| Error::BadGeometry(format!("WKT parse failed: {e}")))?;

        let wkt_polygon = match parsed {
            Wkt::Polygon(p) => p,
            Wkt::MultiPolygon(_) => {
                return Err(Error::BadGeometry(
                    "multi-polygon input is not supported".into(),
                ))
            }
            _ => return Err(Error::BadGeometry("WKT is not a polygon".into())),
        };

        if wkt_polygon.0.is_empty() {
            return Err(Error::BadGeometry("polygon has no rings".into()));
        }

        let mut rings = Vec::with_capacity(wkt_polygon.0.len());
        for ring in &wkt_polygon.0 {
            let coords: Vec<Coord<f64>> = ring
                .0
                .iter()
                .map(|c| Coord {
                    x: c.x - origin[0],
                    y: c.y - origin[1],
                })
                .collect();
            check_ring(&coords)?;
            rings.push(LineString::from(coords));
        }

        let mut exterior = rings.remove(0);
        exterior.make_ccw_winding();
        for hole in rings.iter_mut() {
            hole.make_cw_winding();
        }

        Ok(Self {
            polygon: Polygon::new(exterior, rings),
        })
    }

    /// The normalized polygon, for containment and filtering tests.
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Vertices of the exterior ring.
    ///
    /// The duplicated closing point is excluded unless
    /// `include_closing_point` is set.
    pub fn exterior_points(&self, include_closing_point: bool) -> Vec<[f64; 2]> {
        ring_points(self.polygon.exterior(), include_closing_point)
    }

    /// Number of holes.
    pub fn n_interiors(&self) -> usize {
        self.polygon.interiors().len()
    }

    /// Vertices of every interior ring.
    pub fn interior_points(&self, include_closing_point: bool) -> Vec<Vec<[f64; 2]>> {
        self.polygon
            .interiors()
            .iter()
            .map(|ring| ring_points(ring, include_closing_point))
            .collect()
    }

    /// Planar area of the footprint (holes subtracted).
    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }
}

fn ring_points(ring: &LineString<f64>, include_closing_point: bool) -> Vec<[f64; 2]> {
    let coords = &ring.0;
    let take = if include_closing_point {
        coords.len()
    } else {
        coords.len().saturating_sub(1)
    };
    coords[..take].iter().map(|c| [c.x, c.y]).collect()
}

/// Reject open or self-intersecting rings.
fn check_ring(coords: &[Coord<f64>]) -> Result<()> {
    if coords.len() < 4 {
        return Err(Error::BadGeometry(format!(
            "ring needs at least 4 points, got {}",
            coords.len()
        )));
    }
    let first = coords[0];
    let last = coords[coords.len() - 1];
    if first.x != last.x || first.y != last.y {
        return Err(Error::BadGeometry("ring is not closed".into()));
    }

    let segments: Vec<Line<f64>> = coords.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { is_proper, .. }) => {
                    if is_proper || !adjacent {
                        return Err(Error::BadGeometry("ring is self-intersecting".into()));
                    }
                }
                Some(LineIntersection::Collinear { .. }) => {
                    return Err(Error::BadGeometry("ring has collinear overlap".into()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SQUARE: &str = "POLYGON((0 0,10 0,10 10,0 10,0 0))";

    #[test]
    fn normalizes_cw_exterior_to_ccw() {
        let area = Area::new("POLYGON((0 0,0 10,10 10,10 0,0 0))", [0.0, 0.0]).unwrap();
        assert!(area.polygon().exterior().is_ccw());
    }

    #[test]
    fn normalizes_ccw_hole_to_cw() {
        let area = Area::new(
            "POLYGON((0 0,10 0,10 10,0 10,0 0),(2 2,8 2,8 8,2 8,2 2))",
            [0.0, 0.0],
        )
        .unwrap();
        assert_eq!(area.n_interiors(), 1);
        assert!(area.polygon().interiors()[0].is_cw());
    }

    #[test]
    fn reduces_by_origin() {
        let area = Area::new(SQUARE, [5.0, 5.0]).unwrap();
        let points = area.exterior_points(false);
        assert!(points.contains(&[-5.0, -5.0]));
        assert!(points.contains(&[5.0, 5.0]));
    }

    #[test]
    fn excludes_closing_point_by_default() {
        let area = Area::new(SQUARE, [0.0, 0.0]).unwrap();
        assert_eq!(area.exterior_points(false).len(), 4);
        assert_eq!(area.exterior_points(true).len(), 5);
    }

    #[test]
    fn computes_area_with_holes() {
        let area = Area::new(
            "POLYGON((0 0,10 0,10 10,0 10,0 0),(2 2,8 2,8 8,2 8,2 2))",
            [0.0, 0.0],
        )
        .unwrap();
        assert_relative_eq!(area.area(), 64.0);
    }

    #[test]
    fn rejects_unclosed_ring() {
        let err = Area::new("POLYGON((0 0,10 0,10 10,0 10))", [0.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::BadGeometry(_)));
    }

    #[test]
    fn rejects_multipolygon() {
        let err = Area::new(
            "MULTIPOLYGON(((0 0,10 0,10 10,0 10,0 0)))",
            [0.0, 0.0],
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadGeometry(_)));
    }

    #[test]
    fn rejects_non_polygon() {
        let err = Area::new("POINT(1 2)", [0.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::BadGeometry(_)));
    }

    #[test]
    fn rejects_self_intersection() {
        let err = Area::new("POLYGON((0 0,10 10,10 0,0 10,0 0))", [0.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::BadGeometry(_)));
    }
}
