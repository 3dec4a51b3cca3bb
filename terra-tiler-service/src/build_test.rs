//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

use crate::build::run;
use crate::config::{BuildOptions, OutputFormat};
use gdal::raster::Buffer;
use gdal::spatial_ref::{AxisMappingStrategy, SpatialRef};
use gdal::DriverManager;
use std::fs;
use std::path::{Path, PathBuf};
use terra_tiler_core::heightmap::{TerrainTile, TILE_CELL_SIZE};
use tile_grid::TileCoordinate;

/// A world covering GTiff with a constant elevation
fn write_world_raster(path: &Path, value: f32) {
    let (width, height) = (360, 180);
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f32, _>(path, width, height, 1)
        .unwrap();
    let mut srs = SpatialRef::from_epsg(4326).unwrap();
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    dataset.set_spatial_ref(&srs).unwrap();
    dataset
        .set_geo_transform(&[-180.0, 1.0, 0.0, 90.0, 0.0, -1.0])
        .unwrap();
    let mut band = dataset.rasterband(1).unwrap();
    let mut buffer = Buffer::new((width, height), vec![value; width * height]);
    band.write((0, 0), (width, height), &mut buffer).unwrap();
    drop(band);
    dataset.flush_cache().unwrap();
}

fn test_dir(name: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("terra_tiler_{}", name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn options_for(dir: &Path) -> BuildOptions {
    let input = dir.join("dem.tif");
    write_world_raster(&input, 42.0);
    let output_dir = dir.join("tiles");
    fs::create_dir_all(&output_dir).unwrap();
    let mut options = BuildOptions::new(input, output_dir);
    options.start_zoom = Some(1);
    options.thread_count = Some(2);
    options.show_progress = false;
    options
}

#[test]
fn test_heightmap_pyramid() {
    let dir = test_dir("heightmap_pyramid");
    let options = options_for(&dir);

    run(&options).unwrap();

    let tiles = &options.output_dir;
    // zoom 1 has 4x2 tiles, zoom 0 has 2x1
    for (zoom, x, y) in &[
        (1, 0, 0),
        (1, 1, 0),
        (1, 2, 0),
        (1, 3, 1),
        (0, 0, 0),
        (0, 1, 0),
    ] {
        let path = tiles
            .join(zoom.to_string())
            .join(x.to_string())
            .join(format!("{}.terrain", y));
        assert!(path.exists(), "missing tile {:?}", path);
    }

    // tiles decode to the quantized source height
    let path = tiles.join("0").join("0").join("0.terrain");
    let mut file = fs::File::open(&path).unwrap();
    let tile = TerrainTile::read_gz_from(&mut file, TileCoordinate::new(0, 0, 0)).unwrap();
    assert_eq!(tile.heights().len(), TILE_CELL_SIZE);
    // (42 + 1000) * 5
    assert_eq!(tile.heights()[TILE_CELL_SIZE / 2], 5210);
    // the source covers all four sub quadrants below zoom 0
    assert_eq!(tile.child_flags(), 15);
    assert!(tile.is_land());

    // the manifest reports both levels
    let layer: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tiles.join("layer.json")).unwrap()).unwrap();
    assert_eq!(layer["format"], "heightmap-1.0");
    assert_eq!(layer["available"].as_array().unwrap().len(), 2);
    assert_eq!(layer["available"][1][0]["endX"], 3);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_resume_keeps_existing_tiles() {
    let dir = test_dir("resume");
    let mut options = options_for(&dir);
    run(&options).unwrap();

    let path = options.output_dir.join("0").join("0").join("0.terrain");
    let first_run = fs::metadata(&path).unwrap().modified().unwrap();

    options.resume = true;
    run(&options).unwrap();
    let second_run = fs::metadata(&path).unwrap().modified().unwrap();
    assert_eq!(first_run, second_run);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_mesh_pyramid() {
    let dir = test_dir("mesh_pyramid");
    let mut options = options_for(&dir);
    options.format = OutputFormat::Mesh;
    options.write_vertex_normals = true;

    run(&options).unwrap();

    let path = options.output_dir.join("1").join("2").join("1.terrain");
    let data = fs::read(&path).unwrap();
    // gzip magic
    assert_eq!(&data[..2], &[0x1f, 0x8b]);

    let layer: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(options.output_dir.join("layer.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(layer["format"], "quantized-mesh-1.0");
    assert_eq!(layer["extensions"][0], "octvertexnormals");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_metadata_only() {
    let dir = test_dir("metadata_only");
    let mut options = options_for(&dir);
    options.metadata_only = true;

    run(&options).unwrap();

    assert!(options.output_dir.join("layer.json").exists());
    assert!(!options.output_dir.join("1").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_output_dir_is_a_config_error() {
    let dir = test_dir("missing_output");
    let mut options = options_for(&dir);
    options.output_dir = dir.join("does_not_exist");
    assert!(run(&options).is_err());
    let _ = fs::remove_dir_all(&dir);
}
