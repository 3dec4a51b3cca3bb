//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! Synthetic raster helpers

use gdal::raster::Buffer;
use gdal::spatial_ref::{AxisMappingStrategy, SpatialRef};
use gdal::{Dataset, DriverManager};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use terra_tiler_core::errors::{TilerError, TilerResult};
use terra_tiler_core::heightmap::TerrainTile;
use tile_grid::{Grid, TileCoordinate};

fn source_err(e: gdal::errors::GdalError) -> TilerError {
    TilerError::Source(format!("{}", e))
}

/// Build an in-memory raster from the heights of a terrain tile
pub fn heights_to_raster(tile: &TerrainTile, grid: &Grid) -> TilerResult<Dataset> {
    let tile_size = grid.tile_size() as usize;
    let bounds = grid.tile_bounds(&tile.coord);
    let resolution = bounds.width() / tile_size as f64;
    let gt = [bounds.minx, resolution, 0.0, bounds.maxy, 0.0, -resolution];

    let mut srs = SpatialRef::from_epsg(grid.srid as u32).map_err(source_err)?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    let driver = DriverManager::get_driver_by_name("MEM").map_err(source_err)?;
    let mut dataset = driver
        .create_with_band_type::<i16, _>("", tile_size, tile_size, 1)
        .map_err(source_err)?;
    dataset.set_spatial_ref(&srs).map_err(source_err)?;
    dataset.set_geo_transform(&gt).map_err(source_err)?;

    let mut band = dataset.rasterband(1).map_err(source_err)?;
    let mut buffer = Buffer::new((tile_size, tile_size), tile.heights().to_vec());
    band.write((0, 0), (tile_size, tile_size), &mut buffer)
        .map_err(source_err)?;
    drop(band);
    Ok(dataset)
}

/// Create an empty root elevation GTiff covering a tile
///
/// The bounds get a one degree interior offset to avoid warp problems at
/// the poles and the antimeridian. Returns the path of the created file
/// (the input path plus a `.tif` suffix).
pub fn create_empty_root_elevation_file(
    file_name: &Path,
    grid: &Grid,
    coord: &TileCoordinate,
) -> TilerResult<PathBuf> {
    let mut tile_bounds = grid.tile_bounds(coord);
    tile_bounds.set_minx(tile_bounds.minx + 1.0);
    tile_bounds.set_miny(tile_bounds.miny + 1.0);
    tile_bounds.set_maxx(tile_bounds.maxx - 1.0);
    tile_bounds.set_maxy(tile_bounds.maxy - 1.0);
    let tile_size = grid.tile_size() as usize - 2;
    let resolution = tile_bounds.width() / tile_size as f64;
    let gt = [
        tile_bounds.minx,
        resolution,
        0.0,
        tile_bounds.maxy,
        0.0,
        -resolution,
    ];

    let mut srs = SpatialRef::from_epsg(4326).map_err(source_err)?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    let mut path = OsString::from(file_name.as_os_str());
    path.push(".tif");
    let path = PathBuf::from(path);

    let driver = DriverManager::get_driver_by_name("GTiff").map_err(source_err)?;
    let mut dataset = driver
        .create_with_band_type::<f32, _>(&path, tile_size, tile_size, 1)
        .map_err(source_err)?;
    dataset.set_spatial_ref(&srs).map_err(source_err)?;
    dataset.set_geo_transform(&gt).map_err(source_err)?;

    let mut band = dataset.rasterband(1).map_err(source_err)?;
    let mut buffer = Buffer::new((tile_size, tile_size), vec![0f32; tile_size * tile_size]);
    band.write((0, 0), (tile_size, tile_size), &mut buffer)
        .map_err(source_err)?;
    drop(band);
    dataset.flush_cache().map_err(source_err)?;
    Ok(path)
}
