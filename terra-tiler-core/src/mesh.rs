//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! Irregular triangle meshes in CRS space

use crate::errors::TilerResult;
use crate::heightfield::{HeightField, MeshSink};
use std::collections::HashMap;
use std::io::Write;
use std::ops::{Add, Mul, Sub};
use tile_grid::{Extent, TileCoordinate};

/// A 3D vertex with x/y in CRS units and z in metres
#[derive(PartialEq, Clone, Copy, Debug, Default)]
pub struct Vertex3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vertex3 {
    pub fn new(x: f64, y: f64, z: f64) -> Vertex3 {
        Vertex3 { x, y, z }
    }

    /// Component by axis index (0 = x, 1 = y, 2 = z)
    pub fn get(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn dot(&self, other: &Vertex3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vertex3) -> Vertex3 {
        Vertex3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn magnitude_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    /// Unit length vector in the same direction, +Z for a null vector
    pub fn normalize(&self) -> Vertex3 {
        let magnitude = self.magnitude();
        if magnitude == 0.0 {
            Vertex3::new(0.0, 0.0, 1.0)
        } else {
            *self * (1.0 / magnitude)
        }
    }
}

impl Add for Vertex3 {
    type Output = Vertex3;
    fn add(self, other: Vertex3) -> Vertex3 {
        Vertex3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vertex3 {
    type Output = Vertex3;
    fn sub(self, other: Vertex3) -> Vertex3 {
        Vertex3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Vertex3 {
    type Output = Vertex3;
    fn mul(self, factor: f64) -> Vertex3 {
        Vertex3::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

/// A mesh of triangles over shared vertices
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    /// The array of shared vertices
    pub vertices: Vec<Vertex3>,
    /// Vertex indices, three for each triangle
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Dump the triangles as WKT polygons for debugging
    pub fn write_wkt(&self, out: &mut dyn Write) -> TilerResult<()> {
        for triangle in self.indices.chunks(3) {
            let v0 = &self.vertices[triangle[0] as usize];
            let v1 = &self.vertices[triangle[1] as usize];
            let v2 = &self.vertices[triangle[2] as usize];
            writeln!(
                out,
                "POLYGON Z(({:.8} {:.8} {}, {:.8} {:.8} {}, {:.8} {:.8} {}, {:.8} {:.8} {}))",
                v0.x, v0.y, v0.z, v1.x, v1.y, v1.z, v2.x, v2.y, v2.z, v0.x, v0.y, v0.z
            )?;
        }
        Ok(())
    }
}

/// A mesh tile of the pyramid
#[derive(Clone, Debug)]
pub struct MeshTile {
    pub coord: TileCoordinate,
    pub mesh: Mesh,
    children: u8,
}

impl MeshTile {
    pub fn new(coord: TileCoordinate) -> MeshTile {
        MeshTile {
            coord,
            mesh: Mesh::default(),
            children: 0,
        }
    }

    pub fn child_flags(&self) -> u8 {
        self.children
    }

    pub fn set_child_flags(&mut self, children: u8) {
        self.children = children;
    }

    pub fn has_children(&self) -> bool {
        self.children != 0
    }
}

/// Appropriate geometric error estimate at zoom level zero when the
/// geometry comes from a heightmap
pub fn level_zero_geometric_error(
    maximum_radius: f64,
    heightmap_terrain_quality: f64,
    tile_width: u16,
    root_tiles: u32,
) -> f64 {
    maximum_radius * 2.0 * std::f64::consts::PI * heightmap_terrain_quality
        / (tile_width as f64 * root_tiles as f64)
}

/// Collects strip vertices emitted by the heightfield walk into a `Mesh`
///
/// Grid coordinates are mapped to CRS positions over the tile bounds with
/// row zero at the northern edge. Vertices are deduplicated by grid index
/// and the first two vertices of every other triangle are swapped so the
/// output keeps a consistent winding.
pub struct TriangleCollector<'a> {
    mesh: &'a mut Mesh,
    bounds: Extent,
    cell_size_x: f64,
    cell_size_y: f64,
    index_map: HashMap<usize, u32>,
    triangle: [(i32, i32); 3],
    tri_index: usize,
    odd_order: bool,
}

impl<'a> TriangleCollector<'a> {
    pub fn new(bounds: Extent, mesh: &'a mut Mesh, tile_size: u16) -> TriangleCollector<'a> {
        let cell_size_x = bounds.width() / (tile_size as f64 - 1.0);
        let cell_size_y = bounds.height() / (tile_size as f64 - 1.0);
        TriangleCollector {
            mesh,
            bounds,
            cell_size_x,
            cell_size_y,
            index_map: HashMap::new(),
            triangle: [(0, 0); 3],
            tri_index: 0,
            odd_order: false,
        }
    }

    fn append_vertex(&mut self, heightfield: &HeightField, x: i32, y: i32) {
        let index = heightfield.index_of(x, y);
        let TriangleCollector {
            mesh,
            bounds,
            cell_size_x,
            cell_size_y,
            index_map,
            ..
        } = self;
        let vertex_index = *index_map.entry(index).or_insert_with(|| {
            let iv = mesh.vertices.len() as u32;
            mesh.vertices.push(Vertex3::new(
                bounds.minx + x as f64 * *cell_size_x,
                bounds.maxy - y as f64 * *cell_size_y,
                heightfield.height(x, y) as f64,
            ));
            iv
        });
        mesh.indices.push(vertex_index);
    }
}

impl<'a> MeshSink for TriangleCollector<'a> {
    fn clear(&mut self) {
        self.mesh.vertices.clear();
        self.mesh.indices.clear();
        self.index_map.clear();
        self.tri_index = 0;
        self.odd_order = false;
    }

    fn emit_vertex(&mut self, heightfield: &HeightField, x: i32, y: i32) {
        self.triangle[self.tri_index] = (x, y);
        self.tri_index += 1;

        if self.tri_index == 3 {
            // Winding parity follows the strip position, not the emitted
            // triangle count, so degenerate strip joins still flip it.
            self.odd_order = !self.odd_order;

            let [a, b, c] = self.triangle;
            let degenerate = a == b || b == c || a == c;
            if !degenerate {
                if self.odd_order {
                    self.append_vertex(heightfield, a.0, a.1);
                    self.append_vertex(heightfield, b.0, b.1);
                } else {
                    self.append_vertex(heightfield, b.0, b.1);
                    self.append_vertex(heightfield, a.0, a.1);
                }
                self.append_vertex(heightfield, c.0, c.1);
            }

            self.triangle[0] = self.triangle[1];
            self.triangle[1] = self.triangle[2];
            self.tri_index = 2;
        }
    }
}
