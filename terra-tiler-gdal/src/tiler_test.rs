//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

use crate::tiler::{resample_alg_from_name, GdalTiler, TilerOptions};
use gdal::raster::Buffer;
use gdal::spatial_ref::{AxisMappingStrategy, SpatialRef};
use gdal::{Dataset, DriverManager};
use gdal_sys::GDALResampleAlg;
use std::path::Path;
use tile_grid::{Grid, TileCoordinate};

fn mem_dataset(width: usize, height: usize, bounds: [f64; 4], epsg: u32, value: f32) -> Dataset {
    let driver = DriverManager::get_driver_by_name("MEM").expect("MEM driver");
    let mut dataset = driver
        .create_with_band_type::<f32, _>("", width, height, 1)
        .expect("create mem dataset");
    let mut srs = SpatialRef::from_epsg(epsg).unwrap();
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    dataset.set_spatial_ref(&srs).unwrap();
    dataset
        .set_geo_transform(&[
            bounds[0],
            (bounds[2] - bounds[0]) / width as f64,
            0.0,
            bounds[3],
            0.0,
            (bounds[1] - bounds[3]) / height as f64,
        ])
        .unwrap();
    let mut band = dataset.rasterband(1).unwrap();
    let mut buffer = Buffer::new((width, height), vec![value; width * height]);
    band.write((0, 0), (width, height), &mut buffer).unwrap();
    drop(band);
    dataset
}

fn tiler_for(dataset: Dataset, grid: Grid) -> GdalTiler {
    GdalTiler::from_dataset(dataset, Path::new("test.mem"), grid, TilerOptions::default())
        .expect("tiler")
}

#[test]
fn test_resample_alg_names() {
    assert_eq!(
        resample_alg_from_name("average"),
        Some(GDALResampleAlg::GRA_Average)
    );
    assert_eq!(
        resample_alg_from_name("nearest"),
        Some(GDALResampleAlg::GRA_NearestNeighbour)
    );
    assert_eq!(resample_alg_from_name("q3"), Some(GDALResampleAlg::GRA_Q3));
    assert_eq!(resample_alg_from_name("bicubic"), None);
}

#[test]
fn test_tiler_metadata() {
    let dataset = mem_dataset(900, 450, [0.0, 0.0, 90.0, 45.0], 4326, 0.0);
    let tiler = tiler_for(dataset, Grid::geodetic(65));

    assert!(!tiler.requires_reprojection());
    assert!((tiler.resolution() - 0.1).abs() < 1e-12);
    let bounds = tiler.bounds();
    assert!((bounds.minx - 0.0).abs() < 1e-9);
    assert!((bounds.maxy - 45.0).abs() < 1e-9);
    // native resolution 0.1 deg/px matches zoom 5 of the 65px geodetic grid
    assert_eq!(tiler.max_zoom_level(), 5);
}

#[test]
fn test_missing_srs_fails() {
    let driver = DriverManager::get_driver_by_name("MEM").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f32, _>("", 10, 10, 1)
        .unwrap();
    dataset
        .set_geo_transform(&[0.0, 1.0, 0.0, 10.0, 0.0, -1.0])
        .unwrap();
    let result = GdalTiler::from_dataset(
        dataset,
        Path::new("test.mem"),
        Grid::geodetic(65),
        TilerOptions::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_missing_geotransform_fails() {
    let driver = DriverManager::get_driver_by_name("MEM").unwrap();
    let dataset = driver
        .create_with_band_type::<f32, _>("", 10, 10, 1)
        .unwrap();
    let result = GdalTiler::from_dataset(
        dataset,
        Path::new("test.mem"),
        Grid::geodetic(65),
        TilerOptions::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_raster_window_reads_source_heights() {
    let dataset = mem_dataset(360, 180, [-180.0, -90.0, 180.0, 90.0], 4326, 42.0);
    let tiler = tiler_for(dataset, Grid::geodetic(65));

    let window = tiler
        .raster_window(tiler.dataset(), &TileCoordinate::new(0, 0, 0))
        .unwrap();
    let heights = window.read_heights(65).unwrap();
    assert_eq!(heights.len(), 65 * 65);
    // interior samples carry the source value
    assert!((heights[32 * 65 + 32] - 42.0).abs() < 1e-3);
}

#[test]
fn test_terrain_window_has_plain_tile_geotransform() {
    let dataset = mem_dataset(360, 180, [-180.0, -90.0, 180.0, 90.0], 4326, 1.0);
    let grid = Grid::geodetic(65);
    let coord = TileCoordinate::new(1, 1, 0);
    let tile_bounds = grid.tile_bounds(&coord);
    let resolution = grid.resolution(1);
    let tiler = tiler_for(dataset, grid);

    let window = tiler.terrain_window(tiler.dataset(), &coord).unwrap();
    let gt = window.dataset().geo_transform().unwrap();
    assert!((gt[0] - tile_bounds.minx).abs() < 1e-9);
    assert!((gt[1] - resolution).abs() < 1e-9);
    assert!((gt[3] - tile_bounds.maxy).abs() < 1e-9);
    assert!((gt[5] + resolution).abs() < 1e-9);
}

#[test]
fn test_reprojected_bounds() {
    // Web mercator source, geodetic grid: bounds come back in degrees
    let dataset = mem_dataset(
        1000,
        562,
        [0.0, 0.0, 10018754.171394622, 5621521.486192066],
        3857,
        0.0,
    );
    let tiler = tiler_for(dataset, Grid::geodetic(65));
    assert!(tiler.requires_reprojection());
    let bounds = tiler.bounds();
    assert!((bounds.minx - 0.0).abs() < 0.01);
    assert!((bounds.miny - 0.0).abs() < 0.01);
    assert!((bounds.maxx - 90.0).abs() < 0.01);
    assert!((bounds.maxy - 45.0).abs() < 0.01);
}
