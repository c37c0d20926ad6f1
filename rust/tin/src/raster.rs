// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Origin-reduced 3D raster points with spatial filtering.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use geo::{BoundingRect, Contains, Point, Polygon};

use crate::error::{Error, Result};
use crate::predicates::distance_to_polygon;

/// A set of scattered 3D terrain points, immutable after construction.
#[derive(Debug, Clone)]
pub struct RasterPoints {
    points: Vec<[f64; 3]>,
}

impl RasterPoints {
    /// Shift `data` by `origin` and index it.
    pub fn new(data: Vec<[f64; 3]>, origin: [f64; 3]) -> Self {
        let points = if origin == [0.0; 3] {
            data
        } else {
            data.into_iter()
                .map(|p| [p[0] - origin[0], p[1] - origin[1], p[2] - origin[2]])
                .collect()
        };
        Self { points }
    }

    /// Load a space-delimited xyz text file with one header row (the DTM
    /// asset format) and reduce it by `origin`.
    pub fn from_xyz_file(path: &Path, origin: [f64; 3]) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut data = Vec::new();
        for (number, line) in reader.lines().enumerate().skip(1) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut values = line.split_whitespace().map(str::parse::<f64>);
            let (x, y, z) = match (values.next(), values.next(), values.next()) {
                (Some(Ok(x)), Some(Ok(y)), Some(Ok(z))) => (x, y, z),
                _ => {
                    return Err(Error::InvalidRaster(format!(
                        "line {} of {} is not an xyz triple",
                        number + 1,
                        path.display()
                    )))
                }
            };
            data.push([x, y, z]);
        }
        Ok(Self::new(data, origin))
    }

    /// All points held by this set.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points whose (x, y) lies within `polygon`, optionally buffered
    /// outward by `buffer_dist`.
    ///
    /// A bounding-box filter precedes the polygon test; `None` is returned
    /// when the buffered polygon's bounding box contains no candidate.
    pub fn within(&self, polygon: &Polygon<f64>, buffer_dist: f64) -> Option<Vec<[f64; 3]>> {
        let bbox = polygon.bounding_rect()?;
        let (min_x, min_y) = (bbox.min().x - buffer_dist, bbox.min().y - buffer_dist);
        let (max_x, max_y) = (bbox.max().x + buffer_dist, bbox.max().y + buffer_dist);

        let candidates: Vec<&[f64; 3]> = self
            .points
            .iter()
            .filter(|p| p[0] >= min_x && p[0] <= max_x && p[1] >= min_y && p[1] <= max_y)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        Some(
            candidates
                .into_iter()
                .filter(|p| {
                    if buffer_dist > 0.0 {
                        distance_to_polygon([p[0], p[1]], polygon) <= buffer_dist
                    } else {
                        polygon.contains(&Point::new(p[0], p[1]))
                    }
                })
                .copied()
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Area;

    fn grid(n: usize, spacing: f64, z: f64) -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                points.push([i as f64 * spacing, j as f64 * spacing, z]);
            }
        }
        points
    }

    #[test]
    fn reduces_by_origin() {
        let raster = RasterPoints::new(vec![[10.0, 20.0, 30.0]], [10.0, 20.0, 25.0]);
        assert_eq!(raster.points(), &[[0.0, 0.0, 5.0]]);
    }

    #[test]
    fn filters_points_within_polygon() {
        let area = Area::new("POLYGON((2 2,8 2,8 8,2 8,2 2))", [0.0, 0.0]).unwrap();
        let raster = RasterPoints::new(grid(11, 1.0, 5.0), [0.0; 3]);

        let inside = raster.within(area.polygon(), 0.0).unwrap();
        // strictly interior 3..=7 in both axes
        assert_eq!(inside.len(), 25);
        assert!(inside.iter().all(|p| p[0] > 2.0 && p[0] < 8.0));
    }

    #[test]
    fn buffer_extends_the_filter() {
        let area = Area::new("POLYGON((2 2,8 2,8 8,2 8,2 2))", [0.0, 0.0]).unwrap();
        let raster = RasterPoints::new(grid(11, 1.0, 5.0), [0.0; 3]);

        let inside = raster.within(area.polygon(), 0.0).unwrap();
        let buffered = raster.within(area.polygon(), 1.5).unwrap();
        assert!(buffered.len() > inside.len());
    }

    #[test]
    fn returns_none_outside_bbox() {
        let area = Area::new("POLYGON((100 100,110 100,110 110,100 110,100 100))", [0.0, 0.0])
            .unwrap();
        let raster = RasterPoints::new(grid(5, 1.0, 0.0), [0.0; 3]);
        assert!(raster.within(area.polygon(), 0.0).is_none());
    }
}
