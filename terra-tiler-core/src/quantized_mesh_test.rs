//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

use crate::mesh::{Mesh, MeshTile, Vertex3};
use crate::quantized_mesh::*;
use byteorder::{LittleEndian, ReadBytesExt};
use tile_grid::TileCoordinate;

fn single_triangle_tile() -> MeshTile {
    let mut tile = MeshTile::new(TileCoordinate::new(0, 0, 0));
    tile.mesh = Mesh {
        vertices: vec![
            Vertex3::new(0.0, 0.0, 0.0),
            Vertex3::new(1.0, 0.0, 0.0),
            Vertex3::new(0.0, 1.0, 100.0),
        ],
        indices: vec![0, 1, 2],
    };
    tile
}

fn encode(tile: &MeshTile, normals: bool) -> Vec<u8> {
    let mut data = Vec::new();
    write_to(tile, &mut data, normals).unwrap();
    data
}

#[test]
fn test_zigzag() {
    assert_eq!(zigzag_encode(0), 0);
    assert_eq!(zigzag_encode(-1), 1);
    assert_eq!(zigzag_encode(1), 2);
    assert_eq!(zigzag_encode(-2), 3);
    assert_eq!(zigzag_encode(2), 4);
    assert_eq!(zigzag_encode(32767), 65534);

    for n in -32768..=32767 {
        assert_eq!(zigzag_decode(zigzag_encode(n)), n);
    }
}

#[test]
fn test_llh_ecef_round_trip() {
    let points = [
        Vertex3::new(0.0, 0.0, 0.0),
        Vertex3::new(8.54, 47.37, 408.0),
        Vertex3::new(-170.0, -89.9, -100.0),
        Vertex3::new(179.99, 89.9, 8848.0),
        Vertex3::new(-74.0, 40.7, 10.0),
    ];
    for point in &points {
        let ecef = llh_to_ecef(point);
        let back = llh_to_ecef(&ecef_to_llh(&ecef));
        assert!(
            (back - ecef).magnitude() < 1e-6,
            "round trip error for {:?}",
            point
        );
    }
}

#[test]
fn test_oct_round_trip() {
    let vectors = [
        Vertex3::new(0.0, 0.0, 1.0),
        Vertex3::new(0.0, 0.0, -1.0),
        Vertex3::new(1.0, 0.0, 0.0),
        Vertex3::new(0.70710678, -0.70710678, 0.0),
        Vertex3::new(0.26726124, 0.53452248, 0.80178373),
        Vertex3::new(-0.57735027, -0.57735027, -0.57735027),
    ];
    let max_angle = 0.5f64.to_radians();
    for vector in &vectors {
        let (x, y) = oct_encode(vector);
        let decoded = oct_decode(x, y);
        let angle = vector.dot(&decoded).min(1.0).acos();
        assert!(
            angle < max_angle,
            "oct round trip angular error {} for {:?}",
            angle.to_degrees(),
            vector
        );
    }
}

#[test]
fn test_header_center_and_heights() {
    let tile = single_triangle_tile();
    let data = encode(&tile, false);
    let mut reader = &data[..];

    let center_x = reader.read_f64::<LittleEndian>().unwrap();
    let center_y = reader.read_f64::<LittleEndian>().unwrap();
    let center_z = reader.read_f64::<LittleEndian>().unwrap();

    let ecef: Vec<Vertex3> = tile.mesh.vertices.iter().map(|v| llh_to_ecef(v)).collect();
    let bounds = BoundingBox::from_points(&ecef);
    let expected = bounds.center();
    assert!((center_x - expected.x).abs() < 1e-9);
    assert!((center_y - expected.y).abs() < 1e-9);
    assert!((center_z - expected.z).abs() < 1e-9);

    let min_height = reader.read_f32::<LittleEndian>().unwrap();
    let max_height = reader.read_f32::<LittleEndian>().unwrap();
    assert_eq!(min_height, 0.0);
    assert_eq!(max_height, 100.0);

    // the bounding sphere covers all vertices
    let sphere_x = reader.read_f64::<LittleEndian>().unwrap();
    let sphere_y = reader.read_f64::<LittleEndian>().unwrap();
    let sphere_z = reader.read_f64::<LittleEndian>().unwrap();
    let radius = reader.read_f64::<LittleEndian>().unwrap();
    let center = Vertex3::new(sphere_x, sphere_y, sphere_z);
    for point in &ecef {
        assert!((*point - center).magnitude() <= radius + 1e-6);
    }
}

#[test]
fn test_bounding_sphere_keeps_smaller_radius() {
    let points = [
        Vertex3::new(-1.0, 0.0, 0.0),
        Vertex3::new(1.0, 0.0, 0.0),
        Vertex3::new(0.0, 0.5, 0.0),
        Vertex3::new(0.0, -0.5, 0.0),
    ];
    let sphere = BoundingSphere::from_points(&points);
    for point in &points {
        assert!((*point - sphere.center).magnitude() <= sphere.radius + 1e-12);
    }
    // not larger than the trivial enclosing sphere of this input
    assert!(sphere.radius <= 1.0 + 1e-12);
}

#[test]
fn test_vertex_and_index_encoding() {
    let tile = single_triangle_tile();
    let data = encode(&tile, false);

    // header is 88 bytes
    let mut reader = &data[88..];
    let vertex_count = reader.read_i32::<LittleEndian>().unwrap();
    assert_eq!(vertex_count, 3);

    // u components: quantized x values 0, 32767, 0
    let u0 = zigzag_decode(reader.read_u16::<LittleEndian>().unwrap());
    let u1 = u0 + zigzag_decode(reader.read_u16::<LittleEndian>().unwrap());
    let u2 = u1 + zigzag_decode(reader.read_u16::<LittleEndian>().unwrap());
    assert_eq!((u0, u1, u2), (0, 32767, 0));

    // v components: quantized y values 0, 0, 32767
    let v0 = zigzag_decode(reader.read_u16::<LittleEndian>().unwrap());
    let v1 = v0 + zigzag_decode(reader.read_u16::<LittleEndian>().unwrap());
    let v2 = v1 + zigzag_decode(reader.read_u16::<LittleEndian>().unwrap());
    assert_eq!((v0, v1, v2), (0, 0, 32767));

    // h components: quantized heights 0, 0, 32767
    let h0 = zigzag_decode(reader.read_u16::<LittleEndian>().unwrap());
    let h1 = h0 + zigzag_decode(reader.read_u16::<LittleEndian>().unwrap());
    let h2 = h1 + zigzag_decode(reader.read_u16::<LittleEndian>().unwrap());
    assert_eq!((h0, h1, h2), (0, 0, 32767));

    let triangle_count = reader.read_i32::<LittleEndian>().unwrap();
    assert_eq!(triangle_count, 1);

    // high water mark encoding of [0, 1, 2] is [0, 0, 0]
    assert_eq!(reader.read_u16::<LittleEndian>().unwrap(), 0);
    assert_eq!(reader.read_u16::<LittleEndian>().unwrap(), 0);
    assert_eq!(reader.read_u16::<LittleEndian>().unwrap(), 0);

    // west edge: vertices 0 and 2
    assert_eq!(reader.read_i32::<LittleEndian>().unwrap(), 2);
    assert_eq!(reader.read_u16::<LittleEndian>().unwrap(), 0);
    assert_eq!(reader.read_u16::<LittleEndian>().unwrap(), 2);
    // south edge: vertices 0 and 1
    assert_eq!(reader.read_i32::<LittleEndian>().unwrap(), 2);
    assert_eq!(reader.read_u16::<LittleEndian>().unwrap(), 0);
    assert_eq!(reader.read_u16::<LittleEndian>().unwrap(), 1);
    // east edge: vertex 1
    assert_eq!(reader.read_i32::<LittleEndian>().unwrap(), 1);
    assert_eq!(reader.read_u16::<LittleEndian>().unwrap(), 1);
    // north edge: vertex 2
    assert_eq!(reader.read_i32::<LittleEndian>().unwrap(), 1);
    assert_eq!(reader.read_u16::<LittleEndian>().unwrap(), 2);

    // no extension without normals
    assert!(reader.is_empty());
}

#[test]
fn test_normals_extension() {
    let tile = single_triangle_tile();
    let plain = encode(&tile, false);
    let with_normals = encode(&tile, true);

    // extension id byte + length + 2 bytes per vertex
    assert_eq!(with_normals.len(), plain.len() + 1 + 4 + 2 * 3);
    assert_eq!(with_normals[plain.len()], 1);
    let mut reader = &with_normals[plain.len() + 1..];
    assert_eq!(reader.read_i32::<LittleEndian>().unwrap(), 6);
}

#[test]
fn test_encoding_is_deterministic() {
    let tile = single_triangle_tile();
    assert_eq!(encode(&tile, true), encode(&tile, true));
    assert_eq!(to_gz_bytes(&tile, false).unwrap(), to_gz_bytes(&tile, false).unwrap());
}

#[test]
fn test_wkt_dump() {
    let tile = single_triangle_tile();
    let mut text = Vec::new();
    tile.mesh.write_wkt(&mut text).unwrap();
    let text = String::from_utf8(text).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("POLYGON Z(("));
    assert!(text.contains("100"));
}

#[test]
fn test_empty_mesh_is_an_encode_error() {
    let tile = MeshTile::new(TileCoordinate::new(0, 0, 0));
    let mut data = Vec::new();
    assert!(write_to(&tile, &mut data, false).is_err());
}

#[test]
fn test_out_of_range_index_is_an_encode_error() {
    let mut tile = single_triangle_tile();
    tile.mesh.indices = vec![0, 1, 7];
    let mut data = Vec::new();
    assert!(write_to(&tile, &mut data, false).is_err());
}
