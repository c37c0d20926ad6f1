// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar distance predicates.
//!
//! Membership in a round-joined outward buffer of distance `d` is exactly
//! `distance <= d`, so buffered containment tests reduce to these.

use geo::{Contains, Point, Polygon};

/// Minimum 2D distance from a point to a closed polyline.
pub(crate) fn distance_to_ring(p: [f64; 2], ring: &[[f64; 2]]) -> f64 {
    let mut best = f64::INFINITY;
    for segment in ring.windows(2) {
        let (a, b) = (segment[0], segment[1]);
        let ab = [b[0] - a[0], b[1] - a[1]];
        let ap = [p[0] - a[0], p[1] - a[1]];
        let len_sq = ab[0] * ab[0] + ab[1] * ab[1];
        let t = if len_sq > 0.0 {
            ((ap[0] * ab[0] + ap[1] * ab[1]) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let dx = p[0] - (a[0] + t * ab[0]);
        let dy = p[1] - (a[1] + t * ab[1]);
        best = best.min((dx * dx + dy * dy).sqrt());
    }
    best
}

fn ring_coords(ring: &geo::LineString<f64>) -> Vec<[f64; 2]> {
    ring.0.iter().map(|c| [c.x, c.y]).collect()
}

/// Minimum 2D distance from a point to a polygon; zero inside.
pub(crate) fn distance_to_polygon(p: [f64; 2], polygon: &Polygon<f64>) -> f64 {
    if polygon.contains(&Point::new(p[0], p[1])) {
        return 0.0;
    }
    let mut best = distance_to_ring(p, &ring_coords(polygon.exterior()));
    for interior in polygon.interiors() {
        best = best.min(distance_to_ring(p, &ring_coords(interior)));
    }
    best
}
