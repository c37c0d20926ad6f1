// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end clipping scenarios: footprint clipping, hole cutouts and the
//! full clip-then-decimate pipeline.

use approx::assert_relative_eq;
use geo::{Contains, Point};
use terrabim_tin::{Area, Mesh};

fn grid(n: usize, spacing: f64, z: impl Fn(f64, f64) -> f64) -> Vec<[f64; 3]> {
    let mut points = Vec::new();
    for i in 0..n {
        for j in 0..n {
            let (x, y) = (i as f64 * spacing, j as f64 * spacing);
            points.push([x, y, z(x, y)]);
        }
    }
    points
}

fn within(points: &[[f64; 3]], area: &Area) -> Vec<[f64; 3]> {
    points
        .iter()
        .filter(|p| area.polygon().contains(&Point::new(p[0], p[1])))
        .copied()
        .collect()
}

#[test]
fn flat_square_clips_to_footprint_area() {
    let area = Area::new("POLYGON((0 0,10 0,10 10,0 10,0 0))", [0.0, 0.0]).unwrap();
    let points = grid(11, 1.0, |_, _| 5.0);
    let mesh = Mesh::from_points(&points).unwrap();

    let clipped = mesh.clip_by_area(&area, &within(&points, &area)).unwrap();

    assert!(clipped.check_area_consistency(area.area(), 0.1));
    assert_relative_eq!(clipped.area_2d(), 100.0, epsilon = 0.1);
    let (vertices, _) = clipped.get_data();
    for v in &vertices {
        assert_relative_eq!(v[2], 5.0, epsilon = 1e-9);
    }
}

#[test]
fn flat_square_decimates_to_a_few_triangles() {
    let area = Area::new("POLYGON((0 0,10 0,10 10,0 10,0 0))", [0.0, 0.0]).unwrap();
    let points = grid(11, 1.0, |_, _| 5.0);
    let mesh = Mesh::from_points(&points).unwrap();

    let decimated = mesh
        .clip_by_area(&area, &within(&points, &area))
        .unwrap()
        .decimate(0.1, 1.0, 0.0)
        .unwrap();

    assert!(decimated.n_triangles() <= 4);
    assert_relative_eq!(decimated.area_2d(), 100.0, epsilon = 0.1);
}

#[test]
fn tilted_plane_preserves_corner_heights() {
    let area = Area::new("POLYGON((0 0,10 0,10 10,0 10,0 0))", [0.0, 0.0]).unwrap();
    let points = grid(11, 1.0, |x, y| 0.01 * (x + y));
    let mesh = Mesh::from_points(&points).unwrap();

    let decimated = mesh
        .clip_by_area(&area, &within(&points, &area))
        .unwrap()
        .decimate(0.1, 1.0, 0.0)
        .unwrap();

    assert!(decimated.check_area_consistency(area.area(), 0.1));

    let expected = [(0.0, 0.0, 0.0), (10.0, 0.0, 0.1), (0.0, 10.0, 0.1), (10.0, 10.0, 0.2)];
    let (vertices, _) = decimated.get_data();
    for (x, y, z) in expected {
        let corner = vertices
            .iter()
            .find(|v| (v[0] - x).abs() < 1e-6 && (v[1] - y).abs() < 1e-6)
            .unwrap_or_else(|| panic!("corner ({x}, {y}) missing"));
        assert_relative_eq!(corner[2], z, epsilon = 0.01);
    }
}

#[test]
fn hole_is_cut_out_of_the_mesh() {
    let area = Area::new(
        "POLYGON((0 0,10 0,10 10,0 10,0 0),(2 2,8 2,8 8,2 8,2 2))",
        [0.0, 0.0],
    )
    .unwrap();
    let points = grid(11, 1.0, |_, _| 1.0);
    let mesh = Mesh::from_points(&points).unwrap();

    let clipped = mesh.clip_by_area(&area, &within(&points, &area)).unwrap();

    assert!(clipped.check_area_consistency(area.area(), 0.1));
    assert_relative_eq!(clipped.area_2d(), 64.0, epsilon = 0.1);

    // no face centroid inside the hole
    let (vertices, faces) = clipped.get_data();
    for face in &faces {
        let cx = (vertices[face[0]][0] + vertices[face[1]][0] + vertices[face[2]][0]) / 3.0;
        let cy = (vertices[face[0]][1] + vertices[face[1]][1] + vertices[face[2]][1]) / 3.0;
        let in_hole = cx > 2.0 && cx < 8.0 && cy > 2.0 && cy < 8.0;
        assert!(!in_hole, "face centroid ({cx}, {cy}) lies inside the hole");
    }
}

#[test]
fn every_clipped_face_lies_within_the_area() {
    let area = Area::new("POLYGON((1.5 1.5,8.5 1.5,8.5 8.5,1.5 8.5,1.5 1.5))", [0.0, 0.0])
        .unwrap();
    let points = grid(11, 1.0, |x, y| 0.1 * x + 0.05 * y);
    let mesh = Mesh::from_points(&points).unwrap();

    let clipped = mesh.clip_by_area(&area, &within(&points, &area)).unwrap();

    let (vertices, faces) = clipped.get_data();
    assert!(!faces.is_empty());
    for face in &faces {
        let cx = (vertices[face[0]][0] + vertices[face[1]][0] + vertices[face[2]][0]) / 3.0;
        let cy = (vertices[face[0]][1] + vertices[face[1]][1] + vertices[face[2]][1]) / 3.0;
        assert!(
            area.polygon().contains(&Point::new(cx, cy)),
            "face centroid ({cx}, {cy}) lies outside the area"
        );
    }
    assert!(clipped.check_area_consistency(area.area(), 0.1));
}

#[test]
fn clipping_succeeds_without_interior_points() {
    let area = Area::new("POLYGON((2 2,8 2,8 8,2 8,2 2))", [0.0, 0.0]).unwrap();
    let points = grid(11, 1.0, |_, _| 3.0);
    let mesh = Mesh::from_points(&points).unwrap();

    let clipped = mesh.clip_by_area(&area, &[]).unwrap();

    assert!(!clipped.is_empty());
    assert_relative_eq!(clipped.area_2d(), 36.0, epsilon = 0.1);
}
