// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 2.5D triangle surfaces built from scattered terrain points.
//!
//! A [`Mesh`] is an indexed triangle set whose 2D projection is a simple
//! planar graph. Construction runs a 2D Delaunay triangulation over the
//! (x, y) projections with z carried on the vertices; clipping re-triangulates
//! with the footprint boundaries as breaklines and discards faces outside
//! the footprint.

use geo::{Contains, Point};
use rustc_hash::{FxHashMap, FxHashSet};
use spade::{
    ConstrainedDelaunayTriangulation, DelaunayTriangulation, HasPosition, Point2,
    Triangulation as SpadeTriangulation,
};

use crate::area::Area;
use crate::error::{Error, Result};
use crate::predicates::{distance_to_polygon, distance_to_ring};

/// Buffer distance applied to the footprint when filtering clipped faces.
pub(crate) const CLIP_TOLERANCE: f64 = 5e-4;

/// Offset-retry ladder for vertical ray projection.
const OFFSET_START: f64 = 1e-5;
const OFFSET_STEP: f64 = 1e-5;
const OFFSET_CAP: f64 = 1e-4;

/// Points considered coincident when assembling boundary polylines.
const MERGE_TOLERANCE: f64 = 1e-9;

/// Triangulation vertex: 2D position for spade, height carried along.
pub(crate) struct TinPoint {
    position: Point2<f64>,
    z: f64,
}

impl TinPoint {
    pub(crate) fn new(p: [f64; 3]) -> Self {
        Self {
            position: Point2::new(p[0], p[1]),
            z: p[2],
        }
    }
}

impl HasPosition for TinPoint {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

/// A triangulated surface over 3D points.
///
/// Every face holds exactly three valid vertex indices.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub(crate) vertices: Vec<[f64; 3]>,
    pub(crate) faces: Vec<[usize; 3]>,
}

impl Mesh {
    /// Triangulate scattered points over their (x, y) projections.
    ///
    /// Fails with [`Error::EmptyInput`] on fewer than three points.
    /// Collinear input yields a mesh with zero triangles; downstream
    /// operations tolerate that.
    pub fn from_points(points: &[[f64; 3]]) -> Result<Self> {
        if points.len() < 3 {
            return Err(Error::EmptyInput(format!(
                "triangulation needs at least 3 points, got {}",
                points.len()
            )));
        }
        let vertices: Vec<TinPoint> = points.iter().map(|p| TinPoint::new(*p)).collect();
        let triangulation = DelaunayTriangulation::<TinPoint>::bulk_load_stable(vertices)
            .map_err(|e| Error::NumericalIssue(format!("triangulation rejected input: {e}")))?;
        Ok(Self::from_triangulation(&triangulation))
    }

    fn from_triangulation<T>(triangulation: &T) -> Self
    where
        T: SpadeTriangulation<Vertex = TinPoint>,
    {
        let vertices = triangulation
            .vertices()
            .map(|v| {
                let data = v.data();
                [data.position.x, data.position.y, data.z]
            })
            .collect();
        let faces = triangulation
            .inner_faces()
            .map(|face| {
                let [a, b, c] = face.vertices();
                [a.fix().index(), b.fix().index(), c.fix().index()]
            })
            .collect();
        Self { vertices, faces }
    }

    pub fn n_triangles(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Vertex coordinates and triangle index list.
    pub fn get_data(&self) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
        (self.vertices.clone(), self.faces.clone())
    }

    /// Project unique 2D points onto the surface with a vertical ray.
    ///
    /// Exact edge or vertex hits are numerically unstable; on a miss the
    /// query is retried with incremental XY offsets and the offset is
    /// subtracted from the returned coordinates. Output order matches
    /// input order.
    pub fn project_points_on_surface(&self, pts_2d: &[[f64; 2]]) -> Result<Vec<[f64; 3]>> {
        let mut seen = FxHashSet::default();
        for p in pts_2d {
            if !seen.insert((p[0].to_bits(), p[1].to_bits())) {
                return Err(Error::DuplicatePoints(format!(
                    "({}, {}) appears more than once",
                    p[0], p[1]
                )));
            }
        }
        pts_2d.iter().map(|p| self.project_point(*p)).collect()
    }

    fn project_point(&self, p: [f64; 2]) -> Result<[f64; 3]> {
        if let Some(z) = self.ray_hit(p) {
            return Ok([p[0], p[1], z]);
        }
        let mut offset = OFFSET_START;
        while offset <= OFFSET_CAP {
            if let Some(z) = self.ray_hit([p[0] + offset, p[1] + offset]) {
                return Ok([p[0], p[1], z]);
            }
            offset += OFFSET_STEP;
        }
        Err(Error::NumericalIssue(format!(
            "no surface intersection at ({}, {})",
            p[0], p[1]
        )))
    }

    /// First intersection of the vertical ray through (x, y) with the
    /// surface, as interpolated height.
    fn ray_hit(&self, p: [f64; 2]) -> Option<f64> {
        for face in &self.faces {
            let a = self.vertices[face[0]];
            let b = self.vertices[face[1]];
            let c = self.vertices[face[2]];

            if p[0] < a[0].min(b[0]).min(c[0])
                || p[0] > a[0].max(b[0]).max(c[0])
                || p[1] < a[1].min(b[1]).min(c[1])
                || p[1] > a[1].max(b[1]).max(c[1])
            {
                continue;
            }

            let denom = (b[1] - c[1]) * (a[0] - c[0]) + (c[0] - b[0]) * (a[1] - c[1]);
            if denom.abs() < f64::MIN_POSITIVE {
                continue;
            }
            let l1 = ((b[1] - c[1]) * (p[0] - c[0]) + (c[0] - b[0]) * (p[1] - c[1])) / denom;
            let l2 = ((c[1] - a[1]) * (p[0] - c[0]) + (a[0] - c[0]) * (p[1] - c[1])) / denom;
            let l3 = 1.0 - l1 - l2;
            if l1 >= 0.0 && l2 >= 0.0 && l3 >= 0.0 {
                return Some(l1 * a[2] + l2 * b[2] + l3 * c[2]);
            }
        }
        None
    }

    /// Undirected edges of the surface.
    fn unique_edges(&self) -> FxHashSet<(usize, usize)> {
        let mut edges = FxHashSet::default();
        for face in &self.faces {
            for (u, v) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                edges.insert((u.min(v), u.max(v)));
            }
        }
        edges
    }

    /// Intersections of the surface with the vertical plane through the
    /// segment, restricted to the segment's 2D bounding box and ordered by
    /// distance from `p_start`.
    fn edge_segment(
        &self,
        edges: &FxHashSet<(usize, usize)>,
        p_start: [f64; 3],
        p_end: [f64; 3],
    ) -> Vec<[f64; 3]> {
        let dir = [p_end[0] - p_start[0], p_end[1] - p_start[1]];
        let side = |p: &[f64; 3]| dir[0] * (p[1] - p_start[1]) - dir[1] * (p[0] - p_start[0]);

        let min_x = p_start[0].min(p_end[0]) - MERGE_TOLERANCE;
        let max_x = p_start[0].max(p_end[0]) + MERGE_TOLERANCE;
        let min_y = p_start[1].min(p_end[1]) - MERGE_TOLERANCE;
        let max_y = p_start[1].max(p_end[1]) + MERGE_TOLERANCE;

        let mut hits: Vec<[f64; 3]> = Vec::new();
        for &(u, v) in edges {
            let a = &self.vertices[u];
            let b = &self.vertices[v];
            let sa = side(a);
            let sb = side(b);
            if sa == 0.0 && sb == 0.0 {
                continue;
            }
            if (sa > 0.0 && sb > 0.0) || (sa < 0.0 && sb < 0.0) {
                continue;
            }
            let t = sa / (sa - sb);
            let q = [
                a[0] + t * (b[0] - a[0]),
                a[1] + t * (b[1] - a[1]),
                a[2] + t * (b[2] - a[2]),
            ];
            if q[0] >= min_x && q[0] <= max_x && q[1] >= min_y && q[1] <= max_y {
                hits.push(q);
            }
        }

        let dist = |q: &[f64; 3]| {
            let dx = q[0] - p_start[0];
            let dy = q[1] - p_start[1];
            dx * dx + dy * dy
        };
        hits.sort_by(|a, b| dist(a).total_cmp(&dist(b)));
        hits
    }

    /// Trace a closed 2D polyline over the surface.
    ///
    /// Returns the full 3D boundary polyline together with a closed
    /// line-index definition (`0..n` followed by `0`).
    pub fn slice_along_boundary(
        &self,
        vertices_2d: &[[f64; 2]],
    ) -> Result<(Vec<[f64; 3]>, Vec<usize>)> {
        let projected = self.project_points_on_surface(vertices_2d)?;
        let edges = self.unique_edges();

        let mut boundary: Vec<[f64; 3]> = Vec::new();
        let push = |pts: &mut Vec<[f64; 3]>, q: [f64; 3]| {
            let duplicate = |p: &[f64; 3]| {
                (p[0] - q[0]).abs() <= MERGE_TOLERANCE && (p[1] - q[1]).abs() <= MERGE_TOLERANCE
            };
            if pts.last().is_some_and(duplicate) || pts.first().is_some_and(duplicate) {
                return;
            }
            pts.push(q);
        };

        for i in 0..projected.len() {
            let p_start = projected[i];
            let p_end = projected[(i + 1) % projected.len()];
            push(&mut boundary, p_start);
            for q in self.edge_segment(&edges, p_start, p_end) {
                push(&mut boundary, q);
            }
        }

        let line_definition: Vec<usize> = (0..boundary.len()).chain(std::iter::once(0)).collect();
        Ok((boundary, line_definition))
    }

    /// Clip this surface to the footprint of `area`.
    ///
    /// Boundary polylines are traced over the surface per ring, combined
    /// with `points_within`, re-triangulated with the rings as breaklines,
    /// and faces outside the footprint are discarded. Succeeds with only
    /// boundary-derived points when `points_within` is empty.
    pub fn clip_by_area(&self, area: &Area, points_within: &[[f64; 3]]) -> Result<Mesh> {
        let mut boundaries = vec![area.exterior_points(false)];
        boundaries.extend(area.interior_points(false));

        let mut combined: Vec<[f64; 3]> = points_within.to_vec();
        let mut breaklines: Vec<Vec<usize>> = Vec::with_capacity(boundaries.len());
        for ring in &boundaries {
            let (points, line_definition) = self.slice_along_boundary(ring)?;
            let offset = combined.len();
            breaklines.push(line_definition.iter().map(|i| i + offset).collect());
            combined.extend(points);
        }

        let mut cdt = ConstrainedDelaunayTriangulation::<TinPoint>::new();
        let mut handles = Vec::with_capacity(combined.len());
        for p in &combined {
            let handle = cdt
                .insert(TinPoint::new(*p))
                .map_err(|e| Error::NumericalIssue(format!("re-triangulation failed: {e}")))?;
            handles.push(handle);
        }
        for line in &breaklines {
            for pair in line.windows(2) {
                let (a, b) = (handles[pair[0]], handles[pair[1]]);
                if a == b {
                    continue;
                }
                if cdt.can_add_constraint(a, b) {
                    cdt.add_constraint(a, b);
                } else {
                    tracing::debug!("breakline segment crosses an existing constraint, skipped");
                }
            }
        }

        Ok(Self::from_triangulation(&cdt).filter_faces(area))
    }

    /// Drop faces outside the footprint.
    ///
    /// The boundary rings are breaklines of the triangulation, so no face
    /// straddles them: a face is kept iff its centroid lies inside the
    /// footprint, every vertex is within [`CLIP_TOLERANCE`] of it (the
    /// buffered-footprint test), and the centroid is farther than
    /// [`CLIP_TOLERANCE`] from the exterior boundary. The last test
    /// rejects thin faces on the wrong side of very close boundaries.
    fn filter_faces(&self, area: &Area) -> Mesh {
        let polygon = area.polygon();
        let exterior = area.exterior_points(true);

        let faces = self
            .faces
            .iter()
            .filter(|face| {
                let corners = face.map(|v| [self.vertices[v][0], self.vertices[v][1]]);
                let centroid = [
                    (corners[0][0] + corners[1][0] + corners[2][0]) / 3.0,
                    (corners[0][1] + corners[1][1] + corners[2][1]) / 3.0,
                ];
                polygon.contains(&Point::new(centroid[0], centroid[1]))
                    && corners
                        .iter()
                        .all(|c| distance_to_polygon(*c, polygon) <= CLIP_TOLERANCE)
                    && distance_to_ring(centroid, &exterior) >= CLIP_TOLERANCE
            })
            .copied()
            .collect();

        Mesh {
            vertices: self.vertices.clone(),
            faces,
        }
        .compacted()
    }

    /// Drop vertices no face references and remap indices.
    pub(crate) fn compacted(self) -> Mesh {
        let mut remap: FxHashMap<usize, usize> = FxHashMap::default();
        let mut vertices = Vec::new();
        let faces = self
            .faces
            .iter()
            .map(|face| {
                face.map(|index| {
                    *remap.entry(index).or_insert_with(|| {
                        vertices.push(self.vertices[index]);
                        vertices.len() - 1
                    })
                })
            })
            .collect();
        Mesh { vertices, faces }
    }

    /// Planar area covered by this mesh, summed over all triangles.
    pub fn area_2d(&self) -> f64 {
        self.faces
            .iter()
            .map(|face| {
                let a = self.vertices[face[0]];
                let b = self.vertices[face[1]];
                let c = self.vertices[face[2]];
                ((a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1])) / 2.0).abs()
            })
            .sum()
    }

    /// Whether the planar area of this mesh differs from `area` by less
    /// than `threshold`. Diagnostic only, never enforced.
    pub fn check_area_consistency(&self, area: f64, threshold: f64) -> bool {
        let difference = (self.area_2d() - area).abs();
        tracing::debug!(difference, "area consistency");
        difference < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    pub(crate) fn flat_grid(n: usize, spacing: f64, z: f64) -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                points.push([i as f64 * spacing, j as f64 * spacing, z]);
            }
        }
        points
    }

    #[test]
    fn triangulates_a_grid() {
        let mesh = Mesh::from_points(&flat_grid(3, 1.0, 0.0)).unwrap();
        // 2x2 cells, two triangles each
        assert_eq!(mesh.n_triangles(), 8);
        assert_relative_eq!(mesh.area_2d(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn rejects_fewer_than_three_points() {
        let err = Mesh::from_points(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, Error::EmptyInput(_)));
    }

    #[test]
    fn collinear_points_give_zero_triangles() {
        let mesh =
            Mesh::from_points(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]).unwrap();
        assert!(mesh.is_empty());
    }

    #[test]
    fn projects_interior_points() {
        let mesh = Mesh::from_points(&flat_grid(4, 1.0, 5.0)).unwrap();
        let projected = mesh
            .project_points_on_surface(&[[0.5, 0.5], [1.25, 2.5], [2.0, 1.0]])
            .unwrap();
        assert_eq!(projected.len(), 3);
        for p in &projected {
            assert_relative_eq!(p[2], 5.0, epsilon = 1e-9);
        }
        // order is preserved
        assert_relative_eq!(projected[1][0], 1.25);
    }

    #[test]
    fn projects_tilted_plane() {
        let points: Vec<[f64; 3]> = flat_grid(4, 1.0, 0.0)
            .into_iter()
            .map(|p| [p[0], p[1], 0.01 * (p[0] + p[1])])
            .collect();
        let mesh = Mesh::from_points(&points).unwrap();
        let projected = mesh.project_points_on_surface(&[[1.5, 1.5]]).unwrap();
        assert_relative_eq!(projected[0][2], 0.03, epsilon = 1e-9);
    }

    #[test]
    fn rejects_duplicate_projection_input() {
        let mesh = Mesh::from_points(&flat_grid(3, 1.0, 0.0)).unwrap();
        let err = mesh
            .project_points_on_surface(&[[0.5, 0.5], [0.5, 0.5]])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatePoints(_)));
    }

    #[test]
    fn retry_ladder_recovers_points_marginally_outside() {
        let mesh = Mesh::from_points(&flat_grid(11, 1.0, 7.0)).unwrap();
        // just off the hull: the first ray misses, the offset ladder hits
        let projected = mesh.project_points_on_surface(&[[-5e-6, 5.0]]).unwrap();
        assert_relative_eq!(projected[0][0], -5e-6);
        assert_relative_eq!(projected[0][1], 5.0);
        assert_relative_eq!(projected[0][2], 7.0, epsilon = 1e-9);
    }

    #[test]
    fn projection_fails_outside_surface() {
        let mesh = Mesh::from_points(&flat_grid(3, 1.0, 0.0)).unwrap();
        let err = mesh.project_points_on_surface(&[[50.0, 50.0]]).unwrap_err();
        assert!(matches!(err, Error::NumericalIssue(_)));
    }

    #[test]
    fn slices_along_a_boundary() {
        let mesh = Mesh::from_points(&flat_grid(5, 1.0, 2.0)).unwrap();
        let ring = [[0.5, 0.5], [3.5, 0.5], [3.5, 3.5], [0.5, 3.5]];
        let (points, line) = mesh.slice_along_boundary(&ring).unwrap();

        // ring vertices plus mesh-edge crossings, closed index list
        assert!(points.len() >= ring.len());
        assert_eq!(line.len(), points.len() + 1);
        assert_eq!(*line.last().unwrap(), 0);
        for p in &points {
            assert_relative_eq!(p[2], 2.0, epsilon = 1e-9);
        }
    }

}
