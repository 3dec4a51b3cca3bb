//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

use crate::heightmap::*;
use tile_grid::{Extent, TileCoordinate};

#[test]
fn test_quantize_height() {
    assert_eq!(quantize_height(0.0), 5000);
    assert_eq!(quantize_height(-1000.0), 0);
    assert_eq!(quantize_height(100.5), 5503);
}

#[test]
fn test_quantize_saturates() {
    assert_eq!(quantize_height(1.0e6), i16::max_value());
    assert_eq!(quantize_height(-1.0e6), i16::min_value());
    // largest representable height
    assert_eq!(quantize_height(5553.4), 32767);
}

#[test]
fn test_round_trip() {
    let coord = TileCoordinate::new(4, 3, 2);
    let mut tile = TerrainTile::new(coord);
    for (i, cell) in tile.heights_mut().iter_mut().enumerate() {
        *cell = (i % 1000) as i16 - 500;
    }
    tile.set_child_flags(CHILD_SW | CHILD_NE);

    let data = tile.to_gz_bytes().unwrap();
    let read = TerrainTile::read_gz_from(&mut &data[..], coord).unwrap();

    assert_eq!(read.heights(), tile.heights());
    assert_eq!(read.child_flags(), CHILD_SW | CHILD_NE);
    assert!(read.is_land());
    assert!(!read.has_water_mask());

    // decompressed payload has the small mask size
    let mut raw = Vec::new();
    tile.write_to(&mut raw).unwrap();
    assert_eq!(raw.len(), TILE_CELL_SIZE * 2 + 2);
}

#[test]
fn test_water_mask_round_trip() {
    let coord = TileCoordinate::new(0, 0, 0);
    let mut tile = TerrainTile::new(coord);
    let mut mask = vec![0u8; MASK_CELL_SIZE];
    mask[0] = 1;
    mask[MASK_CELL_SIZE - 1] = 1;
    tile.set_water_mask(mask.into_boxed_slice());

    let mut raw = Vec::new();
    tile.write_to(&mut raw).unwrap();
    assert_eq!(raw.len(), MAX_TERRAIN_SIZE);

    let data = tile.to_gz_bytes().unwrap();
    let read = TerrainTile::read_gz_from(&mut &data[..], coord).unwrap();
    assert!(read.has_water_mask());
    assert!(!read.is_land());
    assert!(!read.is_water());
}

#[test]
fn test_rejects_wrong_payload_size() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut data = Vec::new();
    let mut gz = GzEncoder::new(&mut data, Compression::default());
    gz.write_all(&[0u8; 1234]).unwrap();
    gz.finish().unwrap();

    let coord = TileCoordinate::new(0, 0, 0);
    assert!(TerrainTile::read_gz_from(&mut &data[..], coord).is_err());
}

#[test]
fn test_child_flags_for() {
    // Source in the north east, target tile below it: only the eastern
    // quadrant adjoining the shared edge is flagged.
    let source = Extent::new(0.0, 0.0, 90.0, 45.0);
    let tile = Extent::new(-90.0, -90.0, 90.0, 0.0);
    assert_eq!(child_flags_for(&source, &tile), CHILD_SE);

    // Source covering everything flags all four children
    let world = Extent::new(-180.0, -90.0, 180.0, 90.0);
    assert_eq!(
        child_flags_for(&world, &tile),
        CHILD_SW | CHILD_SE | CHILD_NW | CHILD_NE
    );

    // A disjoint source flags nothing
    let far = Extent::new(120.0, 30.0, 150.0, 60.0);
    assert_eq!(child_flags_for(&far, &tile), 0);
}
