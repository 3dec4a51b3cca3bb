//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! The quantized-mesh-1.0 tile format
//!
//! Encodes an irregular triangle mesh as an ECEF header (tile center,
//! bounding sphere and horizon occlusion point), per axis quantized and
//! delta encoded vertices, high water mark encoded triangle indices, the
//! vertex index lists of the four tile edges and an optional oct encoded
//! per vertex normals extension. The payload is gzip compressed.

use crate::errors::{TilerError, TilerResult};
use crate::mesh::{Mesh, MeshTile, Vertex3};
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::Write;

// Ellipsoid radii used for horizon culling (see the Cesium horizon culling
// articles).
const RADIUS_X: f64 = 6378137.0;
const RADIUS_Y: f64 = 6378137.0;
const RADIUS_Z: f64 = 6356752.3142451793;

const SCALE_X: f64 = 1.0 / RADIUS_X;
const SCALE_Y: f64 = 1.0 / RADIUS_Y;
const SCALE_Z: f64 = 1.0 / RADIUS_Z;

// WGS84 reference ellipsoid
const WGS84_A: f64 = RADIUS_X;
const WGS84_E2: f64 = 0.00669437999014758;

const SHORT_MAX: f64 = 32767.0;
// Vertex count above which triangle and edge indices use 32 bits
const BYTE_SPLIT: usize = 65536;

fn ellipsoid_n(latitude: f64) -> f64 {
    let sin_lat = latitude.sin();
    WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt()
}

/// Convert a (longitude, latitude, height) vertex to earth centered fixed
/// cartesian coordinates
pub fn llh_to_ecef(vertex: &Vertex3) -> Vertex3 {
    let lon = vertex.x.to_radians();
    let lat = vertex.y.to_radians();
    let alt = vertex.z;

    let n = ellipsoid_n(lat);
    Vertex3::new(
        (n + alt) * lat.cos() * lon.cos(),
        (n + alt) * lat.cos() * lon.sin(),
        (n * (1.0 - WGS84_E2) + alt) * lat.sin(),
    )
}

/// Convert earth centered fixed coordinates back to (longitude, latitude,
/// height)
pub fn ecef_to_llh(vertex: &Vertex3) -> Vertex3 {
    // Bowring's iterative method
    let p = (vertex.x * vertex.x + vertex.y * vertex.y).sqrt();
    let lon = vertex.y.atan2(vertex.x);
    let mut lat = (vertex.z / (p * (1.0 - WGS84_E2))).atan();
    for _ in 0..8 {
        let n = ellipsoid_n(lat);
        lat = ((vertex.z + WGS84_E2 * n * lat.sin()) / p).atan();
    }
    let n = ellipsoid_n(lat);
    let alt = if lat.cos().abs() > 1e-12 {
        p / lat.cos() - n
    } else {
        vertex.z.abs() - n * (1.0 - WGS84_E2)
    };
    Vertex3::new(lon.to_degrees(), lat.to_degrees(), alt)
}

/// Axis aligned box over a point stream
#[derive(Clone, Debug)]
pub struct BoundingBox {
    pub min: Vertex3,
    pub max: Vertex3,
}

impl BoundingBox {
    pub fn from_points(points: &[Vertex3]) -> BoundingBox {
        let mut min = Vertex3::new(
            std::f64::INFINITY,
            std::f64::INFINITY,
            std::f64::INFINITY,
        );
        let mut max = Vertex3::new(
            std::f64::NEG_INFINITY,
            std::f64::NEG_INFINITY,
            std::f64::NEG_INFINITY,
        );
        for point in points {
            min.x = min.x.min(point.x);
            min.y = min.y.min(point.y);
            min.z = min.z.min(point.z);
            max.x = max.x.max(point.x);
            max.y = max.y.max(point.y);
            max.z = max.z.max(point.z);
        }
        BoundingBox { min, max }
    }

    pub fn center(&self) -> Vertex3 {
        Vertex3::new(
            self.min.x + 0.5 * (self.max.x - self.min.x),
            self.min.y + 0.5 * (self.max.y - self.min.y),
            self.min.z + 0.5 * (self.max.z - self.min.z),
        )
    }
}

/// A spherical bounding region defined by a center point and a radius
#[derive(Clone, Debug)]
pub struct BoundingSphere {
    pub center: Vertex3,
    pub radius: f64,
}

impl BoundingSphere {
    /// Calculate the center and radius from the specified point stream,
    /// based on Ritter's algorithm. The smaller of the Ritter sphere and
    /// a naive bounding box sphere is kept.
    pub fn from_points(points: &[Vertex3]) -> BoundingSphere {
        let mut min_point_x = Vertex3::new(std::f64::INFINITY, 0.0, 0.0);
        let mut min_point_y = Vertex3::new(0.0, std::f64::INFINITY, 0.0);
        let mut min_point_z = Vertex3::new(0.0, 0.0, std::f64::INFINITY);
        let mut max_point_x = Vertex3::new(std::f64::NEG_INFINITY, 0.0, 0.0);
        let mut max_point_y = Vertex3::new(0.0, std::f64::NEG_INFINITY, 0.0);
        let mut max_point_z = Vertex3::new(0.0, 0.0, std::f64::NEG_INFINITY);

        // The points containing the smallest and largest component, used
        // for the naive approach
        for point in points {
            if point.x < min_point_x.x {
                min_point_x = *point;
            }
            if point.y < min_point_y.y {
                min_point_y = *point;
            }
            if point.z < min_point_z.z {
                min_point_z = *point;
            }
            if point.x > max_point_x.x {
                max_point_x = *point;
            }
            if point.y > max_point_y.y {
                max_point_y = *point;
            }
            if point.z > max_point_z.z {
                max_point_z = *point;
            }
        }

        let x_span = (max_point_x - min_point_x).magnitude_squared();
        let y_span = (max_point_y - min_point_y).magnitude_squared();
        let z_span = (max_point_z - min_point_z).magnitude_squared();

        let mut diameter1 = min_point_x;
        let mut diameter2 = max_point_x;
        let mut max_span = x_span;
        if y_span > max_span {
            diameter1 = min_point_y;
            diameter2 = max_point_y;
            max_span = y_span;
        }
        if z_span > max_span {
            diameter1 = min_point_z;
            diameter2 = max_point_z;
        }

        let mut ritter_center = Vertex3::new(
            (diameter1.x + diameter2.x) * 0.5,
            (diameter1.y + diameter2.y) * 0.5,
            (diameter1.z + diameter2.z) * 0.5,
        );
        let mut radius_squared = (diameter2 - ritter_center).magnitude_squared();
        let mut ritter_radius = radius_squared.sqrt();

        let min_box_point = Vertex3::new(min_point_x.x, min_point_y.y, min_point_z.z);
        let max_box_point = Vertex3::new(max_point_x.x, max_point_y.y, max_point_z.z);
        let naive_center = (min_box_point + max_box_point) * 0.5;
        let mut naive_radius: f64 = 0.0;

        for point in points {
            // The furthest point from the naive center drives the naive
            // radius.
            naive_radius = naive_radius.max((*point - naive_center).magnitude());

            // Grow the Ritter sphere to include all points.
            let old_center_to_point_squared = (*point - ritter_center).magnitude_squared();
            if old_center_to_point_squared > radius_squared {
                let old_center_to_point = old_center_to_point_squared.sqrt();
                ritter_radius = (ritter_radius + old_center_to_point) * 0.5;
                radius_squared = ritter_radius * ritter_radius;

                let old_to_new = old_center_to_point - ritter_radius;
                ritter_center = Vertex3::new(
                    (ritter_radius * ritter_center.x + old_to_new * point.x) / old_center_to_point,
                    (ritter_radius * ritter_center.y + old_to_new * point.y) / old_center_to_point,
                    (ritter_radius * ritter_center.z + old_to_new * point.z) / old_center_to_point,
                );
            }
        }

        if naive_radius < ritter_radius {
            BoundingSphere {
                center: ritter_center,
                radius: ritter_radius,
            }
        } else {
            BoundingSphere {
                center: naive_center,
                radius: naive_radius,
            }
        }
    }
}

fn occlusion_magnitude(position: &Vertex3, sphere_center: &Vertex3) -> f64 {
    let magnitude_squared = position.magnitude_squared();
    let magnitude = magnitude_squared.sqrt();
    let direction = *position * (1.0 / magnitude);

    // Points below the ellipsoid are considered to be on it instead.
    let magnitude_squared = magnitude_squared.max(1.0);
    let magnitude = magnitude.max(1.0);

    let cos_alpha = direction.dot(sphere_center);
    let sin_alpha = direction.cross(sphere_center).magnitude();
    let cos_beta = 1.0 / magnitude;
    let sin_beta = (magnitude_squared - 1.0).sqrt() * cos_beta;

    1.0 / (cos_alpha * cos_beta - sin_alpha * sin_beta)
}

/// The horizon occlusion point of a point stream, expressed in the
/// ellipsoid scaled earth centered fixed frame
pub fn occlusion_point(points: &[Vertex3], sphere_center: &Vertex3) -> Vertex3 {
    let scaled_center = Vertex3::new(
        sphere_center.x * SCALE_X,
        sphere_center.y * SCALE_Y,
        sphere_center.z * SCALE_Z,
    );

    let mut max_magnitude = std::f64::NEG_INFINITY;
    for point in points {
        let scaled = Vertex3::new(point.x * SCALE_X, point.y * SCALE_Y, point.z * SCALE_Z);
        let magnitude = occlusion_magnitude(&scaled, &scaled_center);
        if magnitude > max_magnitude {
            max_magnitude = magnitude;
        }
    }
    scaled_center * max_magnitude
}

/// ZigZag encode a number (-1 = 1, -2 = 3, 0 = 0, 1 = 2, 2 = 4)
pub fn zigzag_encode(n: i32) -> u16 {
    ((n << 1) ^ (n >> 31)) as u16
}

/// Decode a ZigZag encoded number
pub fn zigzag_decode(n: u16) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

fn quantize(origin: f64, factor: f64, value: f64) -> i32 {
    ((value - origin) * factor).round() as i32
}

// Triangle area over the raw position vectors: 0.5 * |a x b|. Kept in this
// form to stay bit compatible with existing tile producers.
fn triangle_area(a: &Vertex3, b: &Vertex3) -> f64 {
    let i = (a.y * b.z - a.z * b.y).powi(2);
    let j = (a.z * b.x - a.x * b.z).powi(2);
    let k = (a.x * b.y - a.y * b.x).powi(2);
    0.5 * (i + j + k).sqrt()
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Convert a scalar in [-1.0, 1.0] to a SNORM byte
fn snorm(value: f64) -> u8 {
    ((clamp(value, -1.0, 1.0) * 0.5 + 0.5) * 255.0).round() as u8
}

/// Encode a unit vector into two SNORM bytes following the 'oct' encoding
///
/// Oct encoding is a compact representation of unit length vectors,
/// described in "A Survey of Efficient Representations of Independent Unit
/// Vectors" (Cigolle et al 2014).
pub fn oct_encode(vector: &Vertex3) -> (u8, u8) {
    let ll_norm = vector.x.abs() + vector.y.abs() + vector.z.abs();
    let mut tx = vector.x / ll_norm;
    let mut ty = vector.y / ll_norm;

    if vector.z < 0.0 {
        let x = tx;
        let y = ty;
        tx = (1.0 - y.abs()) * if x < 0.0 { -1.0 } else { 1.0 };
        ty = (1.0 - x.abs()) * if y < 0.0 { -1.0 } else { 1.0 };
    }
    (snorm(tx), snorm(ty))
}

/// Decode an oct encoded vector back to a unit vector
pub fn oct_decode(x: u8, y: u8) -> Vertex3 {
    let mut vx = x as f64 / 255.0 * 2.0 - 1.0;
    let mut vy = y as f64 / 255.0 * 2.0 - 1.0;
    let vz = 1.0 - vx.abs() - vy.abs();
    if vz < 0.0 {
        let old_x = vx;
        vx = (1.0 - vy.abs()) * if old_x < 0.0 { -1.0 } else { 1.0 };
        vy = (1.0 - old_x.abs()) * if vy < 0.0 { -1.0 } else { 1.0 };
    }
    Vertex3::new(vx, vy, vz).normalize()
}

/// Write the ordered distinct indices of the vertices lying on one tile
/// edge
fn write_edge_indices(
    out: &mut dyn Write,
    mesh: &Mesh,
    edge_coord: f64,
    component: usize,
    wide: bool,
) -> TilerResult<()> {
    let mut indices: Vec<u32> = Vec::new();
    let mut seen: HashMap<u32, usize> = HashMap::new();

    for (position, &index) in mesh.indices.iter().enumerate() {
        let value = mesh.vertices[index as usize].get(component);
        if value == edge_coord && !seen.contains_key(&index) {
            seen.insert(index, position);
            indices.push(index);
        }
    }

    out.write_i32::<LittleEndian>(indices.len() as i32)?;
    for index in indices {
        if wide {
            out.write_u32::<LittleEndian>(index)?;
        } else {
            out.write_u16::<LittleEndian>(index as u16)?;
        }
    }
    Ok(())
}

/// Write the raw uncompressed quantized-mesh tile data
pub fn write_to(tile: &MeshTile, out: &mut dyn Write, write_vertex_normals: bool) -> TilerResult<()> {
    let mesh = &tile.mesh;
    if mesh.vertices.is_empty() {
        return Err(TilerError::Encode("mesh tile has no vertices".to_string()));
    }
    if let Some(&index) = mesh.indices.iter().max() {
        if index as usize >= mesh.vertices.len() {
            return Err(TilerError::Encode(format!(
                "mesh index {} out of range for {} vertices",
                index,
                mesh.vertices.len()
            )));
        }
    }

    let cartesian_vertices: Vec<Vertex3> = mesh.vertices.iter().map(|v| llh_to_ecef(v)).collect();
    let cartesian_bounds = BoundingBox::from_points(&cartesian_vertices);
    let cartesian_sphere = BoundingSphere::from_points(&cartesian_vertices);
    let bounds = BoundingBox::from_points(&mesh.vertices);

    // The center of the tile in earth centered fixed coordinates
    let center = cartesian_bounds.center();
    out.write_f64::<LittleEndian>(center.x)?;
    out.write_f64::<LittleEndian>(center.y)?;
    out.write_f64::<LittleEndian>(center.z)?;

    // The minimum and maximum heights in the area covered by this tile
    out.write_f32::<LittleEndian>(bounds.min.z as f32)?;
    out.write_f32::<LittleEndian>(bounds.max.z as f32)?;

    // The tile's bounding sphere, coordinates in earth centered fixed and
    // the radius in meters
    out.write_f64::<LittleEndian>(cartesian_sphere.center.x)?;
    out.write_f64::<LittleEndian>(cartesian_sphere.center.y)?;
    out.write_f64::<LittleEndian>(cartesian_sphere.center.z)?;
    out.write_f64::<LittleEndian>(cartesian_sphere.radius)?;

    // The horizon occlusion point in the ellipsoid scaled frame
    let occlusion = occlusion_point(&cartesian_vertices, &cartesian_sphere.center);
    out.write_f64::<LittleEndian>(occlusion.x)?;
    out.write_f64::<LittleEndian>(occlusion.y)?;
    out.write_f64::<LittleEndian>(occlusion.z)?;

    // Mesh vertices: per axis 15 bit quantisation, zigzag delta encoded,
    // all x values then all y then all z
    let vertex_count = mesh.vertices.len();
    out.write_i32::<LittleEndian>(vertex_count as i32)?;
    for component in 0..3 {
        let origin = bounds.min.get(component);
        let range = bounds.max.get(component) - origin;
        let factor = if range > 0.0 { SHORT_MAX / range } else { 0.0 };

        let mut u0 = quantize(origin, factor, mesh.vertices[0].get(component));
        out.write_u16::<LittleEndian>(zigzag_encode(u0))?;
        for vertex in &mesh.vertices[1..] {
            let u1 = quantize(origin, factor, vertex.get(component));
            out.write_u16::<LittleEndian>(zigzag_encode(u1 - u0))?;
            u0 = u1;
        }
    }

    // Triangle indices, high water mark encoded
    let triangle_count = mesh.indices.len() / 3;
    out.write_i32::<LittleEndian>(triangle_count as i32)?;
    let wide = vertex_count > BYTE_SPLIT;
    if wide {
        let mut highest: u32 = 0;
        for &index in &mesh.indices {
            let code = highest.wrapping_sub(index);
            out.write_u32::<LittleEndian>(code)?;
            if code == 0 {
                highest = highest.wrapping_add(1);
            }
        }
    } else {
        let mut highest: u16 = 0;
        for &index in &mesh.indices {
            let code = highest.wrapping_sub(index as u16);
            out.write_u16::<LittleEndian>(code)?;
            if code == 0 {
                highest = highest.wrapping_add(1);
            }
        }
    }

    // All vertices on the edges of the tile (W, S, E, N)
    write_edge_indices(out, mesh, bounds.min.x, 0, wide)?;
    write_edge_indices(out, mesh, bounds.min.y, 1, wide)?;
    write_edge_indices(out, mesh, bounds.max.x, 0, wide)?;
    write_edge_indices(out, mesh, bounds.max.y, 1, wide)?;

    // 'Oct-Encoded Per-Vertex Normals' extension for terrain lighting
    if write_vertex_normals && triangle_count > 0 {
        out.write_u8(1)?; // extensionId
        out.write_i32::<LittleEndian>(2 * vertex_count as i32)?;

        let mut normals_per_vertex = vec![Vertex3::default(); vertex_count];
        for triangle in mesh.indices.chunks(3) {
            let v0 = &cartesian_vertices[triangle[0] as usize];
            let v1 = &cartesian_vertices[triangle[1] as usize];
            let v2 = &cartesian_vertices[triangle[2] as usize];

            let normal = (*v1 - *v0).cross(&(*v2 - *v0));
            let weighted = normal * triangle_area(v0, v1);

            for &index in triangle {
                let sum = normals_per_vertex[index as usize] + weighted;
                normals_per_vertex[index as usize] = sum;
            }
        }
        for normal in &normals_per_vertex {
            let (x, y) = oct_encode(&normal.normalize());
            out.write_u8(x)?;
            out.write_u8(y)?;
        }
    }

    Ok(())
}

/// Write the gzip compressed quantized-mesh tile data
pub fn write_gz_to(
    tile: &MeshTile,
    out: &mut dyn Write,
    write_vertex_normals: bool,
) -> TilerResult<()> {
    let mut gz = GzEncoder::new(out, Compression::default());
    write_to(tile, &mut gz, write_vertex_normals)?;
    gz.finish()
        .map_err(|e| TilerError::Compress(format!("gzip finalize failed: {}", e)))?;
    Ok(())
}

/// Encode the tile as a gzip compressed byte vector
pub fn to_gz_bytes(tile: &MeshTile, write_vertex_normals: bool) -> TilerResult<Vec<u8>> {
    let mut data = Vec::new();
    write_gz_to(tile, &mut data, write_vertex_normals)?;
    Ok(data)
}
