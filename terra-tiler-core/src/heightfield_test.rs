//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

use crate::heightfield::*;
use crate::mesh::{level_zero_geometric_error, Mesh, TriangleCollector};
use tile_grid::{Extent, Grid, TileCoordinate};

const SIZE: usize = 65;

fn flat_field() -> HeightField {
    HeightField::new(vec![0.0; SIZE * SIZE], SIZE)
}

fn generate(field: &mut HeightField, bounds: Extent) -> Mesh {
    let mut mesh = Mesh::default();
    {
        let mut collector = TriangleCollector::new(bounds, &mut mesh, SIZE as u16);
        field.generate_mesh(&mut collector, 0);
    }
    mesh
}

fn signed_area(mesh: &Mesh, triangle: &[u32]) -> f64 {
    let a = &mesh.vertices[triangle[0] as usize];
    let b = &mesh.vertices[triangle[1] as usize];
    let c = &mesh.vertices[triangle[2] as usize];
    0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y))
}

#[test]
fn test_flat_field_reduces_to_two_triangles() {
    // Geometric error budget for a flat geodetic level zero tile
    let max_error = level_zero_geometric_error(6378137.0, 0.25, 65, 2);
    assert!(max_error > 70_000.0 && max_error < 80_000.0);

    let mut field = flat_field();
    field.apply_geometric_error(max_error, false);

    let mesh = generate(&mut field, Extent::new(-180.0, -90.0, 0.0, 90.0));
    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.triangle_count(), 2);

    for triangle in mesh.indices.chunks(3) {
        // all indices valid, no degenerate triangles, CCW winding
        assert!(triangle.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        assert!(signed_area(&mesh, triangle) > 0.0);
    }
}

#[test]
fn test_rough_field_keeps_detail() {
    let mut heights = vec![0.0f32; SIZE * SIZE];
    // a sharp spike in the center cell
    heights[32 * SIZE + 32] = 8000.0;
    let mut field = HeightField::new(heights, SIZE);
    field.apply_geometric_error(100.0, false);

    let mesh = generate(&mut field, Extent::new(0.0, 0.0, 90.0, 90.0));
    assert!(mesh.vertices.len() > 4);
    assert!(mesh.triangle_count() > 2);
    for triangle in mesh.indices.chunks(3) {
        assert!(signed_area(&mesh, triangle) > 0.0);
    }
    // the spike vertex survives the reduction
    assert!(mesh
        .vertices
        .iter()
        .any(|v| (v.z - 8000.0).abs() < f64::EPSILON));
}

#[test]
fn test_generation_is_deterministic() {
    let mut heights = vec![0.0f32; SIZE * SIZE];
    for (i, height) in heights.iter_mut().enumerate() {
        *height = ((i * 37) % 523) as f32;
    }

    let mut first = HeightField::new(heights.clone(), SIZE);
    first.apply_geometric_error(50.0, false);
    let mesh_a = generate(&mut first, Extent::new(0.0, 0.0, 1.0, 1.0));

    let mut second = HeightField::new(heights, SIZE);
    second.apply_geometric_error(50.0, false);
    let mesh_b = generate(&mut second, Extent::new(0.0, 0.0, 1.0, 1.0));

    assert_eq!(mesh_a.indices, mesh_b.indices);
    assert_eq!(mesh_a.vertices.len(), mesh_b.vertices.len());
}

#[test]
fn test_smooth_small_zooms_activates_lattice() {
    let max_error = level_zero_geometric_error(6378137.0, 0.25, 65, 2);

    let mut field = flat_field();
    field.apply_geometric_error(max_error, true);
    let smooth = generate(&mut field, Extent::new(-180.0, -90.0, 0.0, 90.0));

    // every 4th grid vertex is forced active: a 17x17 lattice
    assert_eq!(smooth.vertices.len(), 17 * 17);
    for triangle in smooth.indices.chunks(3) {
        assert!(signed_area(&smooth, triangle) > 0.0);
    }
}

#[test]
fn test_corner_levels_active() {
    let mut field = flat_field();
    field.apply_geometric_error(1000.0, false);
    let size = (SIZE - 1) as i32;
    assert_eq!(field.get_level(0, 0), Some(0));
    assert_eq!(field.get_level(size, 0), Some(0));
    assert_eq!(field.get_level(0, size), Some(0));
    assert_eq!(field.get_level(size, size), Some(0));
    // interior stays unset on a flat field
    assert_eq!(field.get_level(13, 7), None);
}

#[test]
fn test_neighbor_coord() {
    let grid = Grid::geodetic(65);
    let coord = TileCoordinate::new(1, 0, 0);
    assert_eq!(
        HeightField::neighbor_coord(&grid, &coord, BORDER_EAST),
        Some(TileCoordinate::new(1, 1, 0))
    );
    assert_eq!(
        HeightField::neighbor_coord(&grid, &coord, BORDER_NORTH),
        Some(TileCoordinate::new(1, 0, 1))
    );
    // west and south neighbours fall off the grid
    assert_eq!(HeightField::neighbor_coord(&grid, &coord, BORDER_WEST), None);
    assert_eq!(HeightField::neighbor_coord(&grid, &coord, BORDER_SOUTH), None);

    let last = TileCoordinate::new(1, 3, 1);
    assert_eq!(HeightField::neighbor_coord(&grid, &last, BORDER_EAST), None);
    assert_eq!(HeightField::neighbor_coord(&grid, &last, BORDER_NORTH), None);
    assert_eq!(
        HeightField::neighbor_coord(&grid, &last, BORDER_WEST),
        Some(TileCoordinate::new(1, 2, 1))
    );
}

#[test]
fn test_border_activation_import() {
    // A neighbour with detail along its west column
    let mut neighbor_heights = vec![0.0f32; SIZE * SIZE];
    for y in 0..SIZE {
        neighbor_heights[y * SIZE] = if y % 2 == 0 { 0.0 } else { 500.0 };
    }
    let mut neighbor = HeightField::new(neighbor_heights, SIZE);
    neighbor.apply_geometric_error(10.0, false);
    assert!(neighbor.get_level(0, 31).is_some());

    // import the neighbour's west border into this field's east border
    let mut field = flat_field();
    field.apply_geometric_error(10.0, false);
    assert_eq!(field.get_level(64, 31), None);
    field.apply_border_activation(&neighbor, BORDER_EAST);
    assert!(field.get_level(64, 31).is_some());

    // the import keeps the mesh valid
    let mesh = generate(&mut field, Extent::new(0.0, 0.0, 1.0, 1.0));
    assert!(mesh.triangle_count() >= 2);
    for triangle in mesh.indices.chunks(3) {
        assert!(signed_area(&mesh, triangle) > 0.0);
    }
}
