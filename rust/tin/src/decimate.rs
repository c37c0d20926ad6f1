// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Curvature-aware mesh reduction.
//!
//! Edges whose adjacent-face normals differ by less than the feature angle
//! are collapsed, flattest first, until the reduction target is reached or
//! no admissible collapse remains. The feature angle scales with the
//! permissible vertical deviation so flat regions decimate aggressively
//! while steep regions keep detail.

use std::collections::BinaryHeap;

use nalgebra::Vector3;
use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::mesh::Mesh;

const REDUCTION_TARGET: f64 = 0.99;
const MAX_FEATURE_ANGLE_DEG: f64 = 45.0;
const MIN_FACE_AREA: f64 = 1e-12;
const COLLINEAR_TOLERANCE: f64 = 1e-9;

impl Mesh {
    /// Reduce the triangle count of this surface.
    ///
    /// The feature angle is
    /// `min(2 * atan(max_height_error / grid_size) in degrees, 45)`; edges
    /// whose adjacent-face normals differ by less than it are collapsed,
    /// up to a 99% reduction target. Topology is preserved, boundary
    /// vertices are only removed where they are collinear with their
    /// boundary neighbours, and no splitting takes place. If
    /// `max_edge_len > 0`, edges longer than it are subdivided afterwards.
    pub fn decimate(&self, max_height_error: f64, grid_size: f64, max_edge_len: f64) -> Result<Mesh> {
        if grid_size <= 0.0 {
            return Err(Error::NumericalIssue(
                "decimation requires a positive grid size".into(),
            ));
        }
        let feature_angle = (2.0 * (max_height_error / grid_size).atan().to_degrees())
            .min(MAX_FEATURE_ANGLE_DEG);

        let before = self.n_triangles();
        let mut mesh = Decimator::new(self.clone(), feature_angle.to_radians()).run();
        if max_edge_len > 0.0 {
            mesh = subdivide_long_edges(mesh, max_edge_len);
        }
        tracing::debug!(
            feature_angle,
            faces_before = before,
            faces_after = mesh.n_triangles(),
            "decimation finished"
        );
        Ok(mesh)
    }
}

/// Collapse candidate, ordered flattest-first.
struct Candidate {
    angle: f64,
    u: usize,
    v: usize,
    versions: (u64, u64),
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.angle == other.angle
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    // BinaryHeap is a max-heap; invert so the smallest angle pops first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.angle.total_cmp(&self.angle)
    }
}

struct Decimator {
    vertices: Vec<[f64; 3]>,
    faces: Vec<[usize; 3]>,
    alive: Vec<bool>,
    vertex_faces: Vec<FxHashSet<usize>>,
    boundary: Vec<bool>,
    version: Vec<u64>,
    heap: BinaryHeap<Candidate>,
    threshold: f64,
    alive_faces: usize,
}

impl Decimator {
    fn new(mesh: Mesh, threshold: f64) -> Self {
        let Mesh { vertices, faces } = mesh;

        let mut vertex_faces = vec![FxHashSet::default(); vertices.len()];
        for (id, face) in faces.iter().enumerate() {
            for &v in face {
                vertex_faces[v].insert(id);
            }
        }

        let mut boundary = vec![false; vertices.len()];
        let mut edges: FxHashSet<(usize, usize)> = FxHashSet::default();
        for face in &faces {
            for (u, v) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                edges.insert((u.min(v), u.max(v)));
            }
        }
        for &(u, v) in &edges {
            let shared = vertex_faces[u].intersection(&vertex_faces[v]).count();
            if shared == 1 {
                boundary[u] = true;
                boundary[v] = true;
            }
        }

        let alive_faces = faces.len();
        let mut decimator = Self {
            version: vec![0; vertices.len()],
            vertex_faces,
            boundary,
            alive: vec![true; faces.len()],
            vertices,
            faces,
            heap: BinaryHeap::new(),
            threshold,
            alive_faces,
        };
        for (u, v) in edges {
            decimator.seed_candidate(u, v);
        }
        decimator
    }

    fn run(mut self) -> Mesh {
        let target = ((self.alive_faces as f64) * (1.0 - REDUCTION_TARGET)).ceil().max(1.0) as usize;

        while self.alive_faces > target {
            let Some(candidate) = self.heap.pop() else {
                break;
            };
            let Candidate { u, v, versions, .. } = candidate;
            if versions != (self.version[u], self.version[v]) {
                continue;
            }
            // re-validate against current geometry
            let Some(angle) = self.edge_angle(u, v) else {
                continue;
            };
            if angle >= self.threshold {
                continue;
            }
            self.try_collapse(u, v);
        }

        let faces = self
            .faces
            .into_iter()
            .zip(self.alive)
            .filter_map(|(face, alive)| alive.then_some(face))
            .collect();
        Mesh {
            vertices: self.vertices,
            faces,
        }
        .compacted()
    }

    fn face_normal(&self, id: usize) -> Option<Vector3<f64>> {
        let [a, b, c] = self.faces[id];
        let a = Vector3::from(self.vertices[a]);
        let b = Vector3::from(self.vertices[b]);
        let c = Vector3::from(self.vertices[c]);
        let normal = (b - a).cross(&(c - a));
        let len = normal.norm();
        (len > 0.0).then(|| normal / len)
    }

    fn shared_faces(&self, u: usize, v: usize) -> Vec<usize> {
        self.vertex_faces[u]
            .intersection(&self.vertex_faces[v])
            .copied()
            .filter(|&f| self.alive[f])
            .collect()
    }

    /// Angle between the normals of the faces adjacent to the edge.
    /// Boundary edges count as perfectly flat.
    fn edge_angle(&self, u: usize, v: usize) -> Option<f64> {
        match self.shared_faces(u, v).as_slice() {
            [a, b] => {
                let na = self.face_normal(*a)?;
                let nb = self.face_normal(*b)?;
                Some(na.dot(&nb).clamp(-1.0, 1.0).acos())
            }
            [_] => Some(0.0),
            _ => None,
        }
    }

    fn seed_candidate(&mut self, u: usize, v: usize) {
        if let Some(angle) = self.edge_angle(u, v) {
            if angle < self.threshold {
                self.heap.push(Candidate {
                    angle,
                    u,
                    v,
                    versions: (self.version[u], self.version[v]),
                });
            }
        }
    }

    fn neighbours(&self, v: usize) -> FxHashSet<usize> {
        let mut out = FxHashSet::default();
        for &f in &self.vertex_faces[v] {
            if self.alive[f] {
                for &w in &self.faces[f] {
                    if w != v {
                        out.insert(w);
                    }
                }
            }
        }
        out
    }

    /// A vertex on a feature edge would flatten real relief if removed.
    fn vertex_is_flat(&self, r: usize) -> bool {
        self.neighbours(r)
            .into_iter()
            .all(|n| matches!(self.edge_angle(r, n), Some(angle) if angle < self.threshold))
    }

    /// Boundary vertices are removable only along the boundary and only
    /// when collinear with their two boundary neighbours, which keeps the
    /// footprint unchanged.
    fn removable(&self, r: usize, k: usize) -> bool {
        if !self.vertex_is_flat(r) {
            return false;
        }
        if !self.boundary[r] {
            return true;
        }
        if !self.boundary[k] {
            return false;
        }
        let ring: Vec<usize> = self
            .neighbours(r)
            .into_iter()
            .filter(|&n| self.boundary[n] && self.shared_faces(r, n).len() == 1)
            .collect();
        let [n1, n2] = ring.as_slice() else {
            return false;
        };
        if *n1 != k && *n2 != k {
            return false;
        }
        let a = Vector3::from(self.vertices[*n1]);
        let b = Vector3::from(self.vertices[*n2]);
        let p = Vector3::from(self.vertices[r]);
        let ab = b - a;
        let len = ab.norm();
        if len <= 0.0 {
            return false;
        }
        (p - a).cross(&ab).norm() / len < COLLINEAR_TOLERANCE
    }

    fn try_collapse(&mut self, u: usize, v: usize) -> bool {
        let (r, k) = if self.removable(v, u) {
            (v, u)
        } else if self.removable(u, v) {
            (u, v)
        } else {
            return false;
        };

        let shared = self.shared_faces(r, k);
        if shared.is_empty() || shared.len() > 2 {
            return false;
        }

        // link condition keeps the surface manifold
        let opposite: FxHashSet<usize> = shared
            .iter()
            .flat_map(|&f| self.faces[f])
            .filter(|&w| w != r && w != k)
            .collect();
        let common: FxHashSet<usize> = self
            .neighbours(r)
            .intersection(&self.neighbours(k))
            .copied()
            .collect();
        if common != opposite {
            return false;
        }

        // a collapse must not flip or degenerate any surviving face in 2D
        let moved: Vec<usize> = self.vertex_faces[r]
            .iter()
            .copied()
            .filter(|f| self.alive[*f] && !shared.contains(f))
            .collect();
        for &f in &moved {
            let old = self.faces[f];
            let new = old.map(|w| if w == r { k } else { w });
            if new[0] == new[1] || new[1] == new[2] || new[2] == new[0] {
                return false;
            }
            let before = signed_area_2d(&self.vertices, old);
            let after = signed_area_2d(&self.vertices, new);
            if after.abs() < MIN_FACE_AREA || before.signum() != after.signum() {
                return false;
            }
        }

        for &f in &shared {
            self.alive[f] = false;
            self.alive_faces -= 1;
            for w in self.faces[f] {
                self.vertex_faces[w].remove(&f);
            }
        }
        for &f in &moved {
            self.faces[f] = self.faces[f].map(|w| if w == r { k } else { w });
            self.vertex_faces[k].insert(f);
        }
        self.vertex_faces[r].clear();

        // invalidate and re-seed the changed region
        let mut affected: FxHashSet<usize> = FxHashSet::default();
        affected.insert(k);
        for &f in &self.vertex_faces[k].clone() {
            if self.alive[f] {
                affected.extend(self.faces[f]);
            }
        }
        self.version[r] += 1;
        for &w in &affected {
            self.version[w] += 1;
        }
        let mut reseed: FxHashSet<(usize, usize)> = FxHashSet::default();
        for &f in &self.vertex_faces[k] {
            if self.alive[f] {
                let face = self.faces[f];
                for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                    reseed.insert((a.min(b), a.max(b)));
                }
            }
        }
        for (a, b) in reseed {
            self.seed_candidate(a, b);
        }
        true
    }
}

fn signed_area_2d(vertices: &[[f64; 3]], face: [usize; 3]) -> f64 {
    let a = vertices[face[0]];
    let b = vertices[face[1]];
    let c = vertices[face[2]];
    (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1])) / 2.0
}

/// Split edges longer than `max_edge_len` at their midpoint until none
/// remain. The adjacent faces are divided in two per split.
fn subdivide_long_edges(mesh: Mesh, max_edge_len: f64) -> Mesh {
    let Mesh {
        mut vertices,
        mut faces,
    } = mesh;

    // generous cap in case of degenerate geometry
    let mut remaining_splits = faces.len() * 64 + 1024;
    while remaining_splits > 0 {
        remaining_splits -= 1;
        let Some((u, v)) = find_long_edge(&vertices, &faces, max_edge_len) else {
            break;
        };
        let a = vertices[u];
        let b = vertices[v];
        let mid = [
            (a[0] + b[0]) / 2.0,
            (a[1] + b[1]) / 2.0,
            (a[2] + b[2]) / 2.0,
        ];
        vertices.push(mid);
        let m = vertices.len() - 1;

        let mut updated = Vec::with_capacity(faces.len() + 2);
        for face in faces {
            let has_u = face.contains(&u);
            let has_v = face.contains(&v);
            if has_u && has_v {
                updated.push(face.map(|w| if w == v { m } else { w }));
                updated.push(face.map(|w| if w == u { m } else { w }));
            } else {
                updated.push(face);
            }
        }
        faces = updated;
    }
    if remaining_splits == 0 {
        tracing::warn!("edge subdivision stopped early, split cap exhausted");
    }

    Mesh { vertices, faces }
}

fn find_long_edge(
    vertices: &[[f64; 3]],
    faces: &[[usize; 3]],
    max_edge_len: f64,
) -> Option<(usize, usize)> {
    let limit = max_edge_len * max_edge_len;
    for face in faces {
        for (u, v) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
            let a = vertices[u];
            let b = vertices[v];
            let len = (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2);
            if len > limit {
                return Some((u, v));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(n: usize, z: impl Fn(f64, f64) -> f64) -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let (x, y) = (i as f64, j as f64);
                points.push([x, y, z(x, y)]);
            }
        }
        points
    }

    #[test]
    fn flat_grid_collapses_to_corner_triangles() {
        let mesh = Mesh::from_points(&grid(11, |_, _| 5.0)).unwrap();
        let decimated = mesh.decimate(0.1, 1.0, 0.0).unwrap();

        assert!(decimated.n_triangles() <= 4);
        assert_relative_eq!(decimated.area_2d(), 100.0, epsilon = 1e-6);
        let (points, _) = decimated.get_data();
        for p in &points {
            assert_relative_eq!(p[2], 5.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn tilted_plane_keeps_corner_heights() {
        let mesh = Mesh::from_points(&grid(11, |x, y| 0.01 * (x + y))).unwrap();
        let decimated = mesh.decimate(0.1, 1.0, 0.0).unwrap();

        assert!(decimated.n_triangles() <= 4);
        let (points, _) = decimated.get_data();
        for p in &points {
            assert_relative_eq!(p[2], 0.01 * (p[0] + p[1]), epsilon = 1e-9);
        }
        let zs: Vec<f64> = points.iter().map(|p| p[2]).collect();
        assert!(zs.iter().any(|z| (z - 0.0).abs() < 1e-9));
        assert!(zs.iter().any(|z| (z - 0.2).abs() < 1e-9));
    }

    #[test]
    fn steep_ridge_survives_decimation() {
        // fold along x = 5: flat on the left, steep on the right
        let mesh = Mesh::from_points(&grid(11, |x, _| if x <= 5.0 { 0.0 } else { 2.0 * (x - 5.0) }))
            .unwrap();
        let decimated = mesh.decimate(0.1, 1.0, 0.0).unwrap();

        // the ridge line must keep vertices at x = 5
        let (points, _) = decimated.get_data();
        assert!(points.iter().any(|p| (p[0] - 5.0).abs() < 1e-9));
        // heights stay on the fold surface
        for p in &points {
            let expected = if p[0] <= 5.0 { 0.0 } else { 2.0 * (p[0] - 5.0) };
            assert_relative_eq!(p[2], expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn preserves_planar_area() {
        let mesh = Mesh::from_points(&grid(8, |x, y| (x * 0.7).sin() + (y * 0.3).cos())).unwrap();
        let area_before = mesh.area_2d();
        let decimated = mesh.decimate(0.5, 1.0, 0.0).unwrap();
        assert_relative_eq!(decimated.area_2d(), area_before, epsilon = 1e-6);
    }

    #[test]
    fn rejects_non_positive_grid_size() {
        let mesh = Mesh::from_points(&grid(3, |_, _| 0.0)).unwrap();
        assert!(mesh.decimate(0.1, 0.0, 0.0).is_err());
    }

    #[test]
    fn subdivides_long_edges() {
        let mesh = Mesh::from_points(&[
            [0.0, 0.0, 0.0],
            [8.0, 0.0, 0.0],
            [0.0, 8.0, 0.0],
        ])
        .unwrap();
        let subdivided = mesh.decimate(0.1, 1.0, 3.0).unwrap();

        let (points, faces) = subdivided.get_data();
        for face in &faces {
            for (u, v) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                let a = points[u];
                let b = points[v];
                let len = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2))
                    .sqrt();
                assert!(len <= 3.0 + 1e-9);
            }
        }
        assert_relative_eq!(subdivided.area_2d(), 32.0, epsilon = 1e-9);
    }
}
