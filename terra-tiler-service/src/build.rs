//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! The pyramid build driver
//!
//! Iterates all tile coordinates from the start zoom down to the end zoom,
//! fans the work out to a pool of OS threads and aggregates the pyramid
//! metadata. Worker threads share a single monotonically increasing global
//! index: each worker advances its private iterator until it reaches the
//! index it claimed, so every coordinate is processed exactly once without
//! a shared queue.

use crate::config::{BuildOptions, OutputFormat, Profile};
use crate::metadata::{LevelInfo, TerrainMetadata};
use gdal::raster::RasterCreationOptions;
use gdal::{DriverManager, Metadata};
use pbr::ProgressBar;
use std::fs;
use std::io::{self, Stdout};
use std::iter::FromIterator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use terra_tiler_core::errors::{TilerError, TilerResult};
use terra_tiler_core::heightfield::HeightField;
use terra_tiler_core::heightmap::{child_flags_for, TerrainTile};
use terra_tiler_core::mesh::{level_zero_geometric_error, MeshTile, TriangleCollector};
use terra_tiler_core::quantized_mesh;
use terra_tiler_core::store::{FileStore, TileStore};
use terra_tiler_gdal::{create_empty_root_elevation_file, GdalTiler, ReaderWithOverviews};
use tile_grid::{Extent, Grid, GridIterator, TileCoordinate};

// Default quality of terrain created from heightmaps
const HEIGHTMAP_TERRAIN_QUALITY: f64 = 0.25;
// Earth semi-major axis in meters
const SEMI_MAJOR_AXIS: f64 = 6378137.0;
// Tiles above this zoom level get their borders stitched against their
// neighbours, tiles below get a smoothing lattice instead
const SMOOTH_ZOOM_LIMIT: u8 = 6;

/// Run a pyramid build
pub fn run(options: &BuildOptions) -> TilerResult<()> {
    let output_metadata = fs::metadata(&options.output_dir).map_err(|_| {
        TilerError::Config(format!(
            "the output directory does not exist: {}",
            options.output_dir.display()
        ))
    })?;
    if !output_metadata.is_dir() {
        return Err(TilerError::Config(format!(
            "the output filepath is not a directory: {}",
            options.output_dir.display()
        )));
    }

    let grid = options.grid();
    let extension = tile_extension(options)?;
    let store = FileStore::new(&options.output_dir, &extension, options.resume);

    // Probe the source once for the native zoom level and its bounds;
    // every worker opens its own handle afterwards.
    let probe = GdalTiler::open(&options.input, grid.clone(), options.tiler_options.clone())?;
    let start_zoom = options
        .start_zoom
        .unwrap_or_else(|| probe.max_zoom_level());
    let end_zoom = options.end_zoom;
    if start_zoom < end_zoom {
        return Err(TilerError::Config(format!(
            "start zoom {} is below end zoom {}",
            start_zoom, end_zoom
        )));
    }
    let source_bounds = probe.bounds().clone();
    drop(probe);
    info!(
        "tiling {} from zoom {} down to {}",
        options.input.display(),
        start_zoom,
        end_zoom
    );

    let total = GridIterator::new(&grid, source_bounds.clone(), start_zoom, end_zoom).size();
    let progress = if options.show_progress {
        Some(Mutex::new(progress_bar(total)))
    } else {
        None
    };

    let metadata = Mutex::new(TerrainMetadata::new());
    let global_index = AtomicUsize::new(0);
    let thread_count = options.thread_count.unwrap_or_else(num_cpus::get).max(1);

    let mut result = Ok(());
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(thread_count);
        for _ in 0..thread_count {
            handles.push(scope.spawn(|| {
                worker(
                    options,
                    &grid,
                    &source_bounds,
                    start_zoom,
                    end_zoom,
                    &store,
                    &global_index,
                    progress.as_ref(),
                    &metadata,
                )
            }));
        }
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    if result.is_ok() {
                        result = Err(error);
                    }
                }
                Err(_) => {
                    if result.is_ok() {
                        result = Err(TilerError::Source("worker thread panicked".to_string()));
                    }
                }
            }
        }
    });
    if let Some(progress) = &progress {
        progress.lock().unwrap().finish();
        println!();
    }
    result?;

    let mut metadata = metadata.into_inner().unwrap();
    if options.cesium_friendly && options.profile == Profile::Geodetic && end_zoom == 0 {
        cesium_friendly_pass(options, &grid, &store, &mut metadata)?;
    }

    let dataset_name = options
        .input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    metadata.write_json_file(
        &options.output_dir.join("layer.json"),
        &dataset_name,
        &options.format,
        &options.profile,
        options.write_vertex_normals,
    )?;
    Ok(())
}

fn progress_bar(total: u64) -> ProgressBar<Stdout> {
    let mut pb = ProgressBar::new(total);
    pb.message("Tiles: ");
    pb.show_speed = false;
    pb.show_percent = false;
    pb.show_time_left = false;
    pb
}

/// Tile file extension of the configured output format
fn tile_extension(options: &BuildOptions) -> TilerResult<String> {
    match &options.format {
        OutputFormat::Heightmap | OutputFormat::Mesh => Ok("terrain".to_string()),
        OutputFormat::Gdal(driver_name) => {
            let driver = DriverManager::get_driver_by_name(driver_name).map_err(|_| {
                TilerError::Config(format!("could not retrieve GDAL driver `{}`", driver_name))
            })?;
            Ok(driver
                .metadata_item("DMD_EXTENSION", "")
                .filter(|extension| !extension.is_empty())
                .unwrap_or_else(|| "tif".to_string()))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker(
    options: &BuildOptions,
    grid: &Grid,
    source_bounds: &Extent,
    start_zoom: u8,
    end_zoom: u8,
    store: &FileStore,
    global_index: &AtomicUsize,
    progress: Option<&Mutex<ProgressBar<Stdout>>>,
    metadata: &Mutex<TerrainMetadata>,
) -> TilerResult<()> {
    let tiler = GdalTiler::open(&options.input, grid.clone(), options.tiler_options.clone())?;
    let mut reader = ReaderWithOverviews::new();
    let mut iter = GridIterator::new(grid, source_bounds.clone(), start_zoom, end_zoom);
    let mut local_metadata = TerrainMetadata::new();
    let mut local_index: usize = 0;

    loop {
        // Claim the next global index and advance the private iterator to
        // it.
        let target = global_index.fetch_add(1, Ordering::SeqCst);
        let mut coord = None;
        while local_index <= target {
            coord = iter.next();
            local_index += 1;
            if coord.is_none() {
                break;
            }
        }
        let coord = match coord {
            Some(coord) => coord,
            None => break,
        };

        local_metadata.add_coordinate(grid, &coord);
        if !options.metadata_only && store.must_serialize(&coord) {
            if let Err(error) =
                process_coordinate(options, &tiler, &mut reader, store, &coord, start_zoom)
            {
                error!(
                    "failed to create tile {}/{}/{}: {}",
                    coord.zoom, coord.x, coord.y, error
                );
                return Err(error);
            }
            debug!("created tile {}/{}/{}", coord.zoom, coord.x, coord.y);
        }
        if let Some(progress) = progress {
            progress.lock().unwrap().inc();
        }
    }

    metadata.lock().unwrap().merge(&local_metadata);
    Ok(())
}

/// Produce and store the tile of one coordinate
fn process_coordinate(
    options: &BuildOptions,
    tiler: &GdalTiler,
    reader: &mut ReaderWithOverviews,
    store: &FileStore,
    coord: &TileCoordinate,
    max_zoom: u8,
) -> TilerResult<()> {
    match &options.format {
        OutputFormat::Heightmap => {
            let heights = reader.read_raster_heights(tiler, coord)?;
            let mut tile = TerrainTile::from_raster_heights(*coord, &heights);
            if coord.zoom != max_zoom {
                let tile_bounds = tiler.grid().tile_bounds(coord);
                tile.set_child_flags(child_flags_for(tiler.bounds(), &tile_bounds));
            }
            store.serialize_tile(coord, &tile.to_gz_bytes()?)
        }
        OutputFormat::Mesh => {
            let tile = create_mesh_tile(options, tiler, reader, coord, max_zoom)?;
            let data = quantized_mesh::to_gz_bytes(&tile, options.write_vertex_normals)?;
            store.serialize_tile(coord, &data)
        }
        OutputFormat::Gdal(driver_name) => {
            let window = tiler.raster_window(tiler.dataset(), coord)?;
            let driver = DriverManager::get_driver_by_name(driver_name).map_err(|_| {
                TilerError::Config(format!("could not retrieve GDAL driver `{}`", driver_name))
            })?;
            let creation_options = RasterCreationOptions::from_iter(&options.creation_options);
            let path = store.prepare_path(coord)?;
            let temp_path = path.with_extension(format!("{}.tmp", store.extension));
            driver
                .create_copy(window.dataset(), &temp_path, &creation_options)
                .map_err(|e| {
                    TilerError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        format!("could not create GDAL tile: {}", e),
                    ))
                })?;
            store.commit(&temp_path, &path)
        }
    }
}

/// Reduce the heightmap of a tile to an irregular mesh
///
/// Tiles above the smoothing zoom limit import the activation state of
/// their neighbours so that meshes stay crack free across tile borders;
/// neighbours wholly outside the source bounds are skipped.
fn create_mesh_tile(
    options: &BuildOptions,
    tiler: &GdalTiler,
    reader: &mut ReaderWithOverviews,
    coord: &TileCoordinate,
    max_zoom: u8,
) -> TilerResult<MeshTile> {
    let grid = tiler.grid();
    let tile_size = grid.tile_size();
    let root_tiles = grid.tile_extent(0).maxx + 1;
    let level_zero_error = level_zero_geometric_error(
        SEMI_MAJOR_AXIS,
        HEIGHTMAP_TERRAIN_QUALITY * options.mesh_quality_factor,
        tile_size,
        root_tiles,
    );
    let max_error = level_zero_error / (1u64 << coord.zoom) as f64;

    let heights = reader.read_raster_heights(tiler, coord)?;
    let mut field = HeightField::new(heights, tile_size as usize);
    field.apply_geometric_error(max_error, coord.zoom <= SMOOTH_ZOOM_LIMIT);

    if coord.zoom > SMOOTH_ZOOM_LIMIT {
        // Propagate the geometric error of neighbours to avoid gaps at the
        // borders
        for border in 0..4 {
            let neighbor_coord = match HeightField::neighbor_coord(grid, coord, border) {
                Some(neighbor_coord) => neighbor_coord,
                None => continue,
            };
            let neighbor_bounds = grid.tile_bounds(&neighbor_coord);
            if !tiler.bounds().overlaps(&neighbor_bounds) {
                continue;
            }
            let neighbor_heights = reader.read_raster_heights(tiler, &neighbor_coord)?;
            let mut neighbor_field = HeightField::new(neighbor_heights, tile_size as usize);
            neighbor_field.apply_geometric_error(max_error, false);
            field.apply_border_activation(&neighbor_field, border);
        }
    }

    let mut tile = MeshTile::new(*coord);
    let tile_bounds = grid.tile_bounds(coord);
    {
        let mut collector = TriangleCollector::new(tile_bounds.clone(), &mut tile.mesh, tile_size);
        field.generate_mesh(&mut collector, 0);
    }

    if coord.zoom != max_zoom {
        tile.set_child_flags(child_flags_for(tiler.bounds(), &tile_bounds));
    }
    Ok(tile)
}

/// Synthesize a missing geodetic root tile so CesiumJS finds both zoom 0
/// tiles, and widen the reported zoom 0 coverage accordingly
fn cesium_friendly_pass(
    options: &BuildOptions,
    grid: &Grid,
    store: &FileStore,
    metadata: &mut TerrainMetadata,
) -> TilerResult<()> {
    if !options.metadata_only
        && matches!(
            options.format,
            OutputFormat::Heightmap | OutputFormat::Mesh
        )
    {
        let west = TileCoordinate::new(0, 0, 0);
        let east = TileCoordinate::new(0, 1, 0);
        let missing = match (
            store.tile_path(&west).exists(),
            store.tile_path(&east).exists(),
        ) {
            (true, false) => Some(east),
            (false, true) => Some(west),
            _ => None,
        };

        if let Some(coord) = missing {
            info!("creating missing root tile 0/{}/{}", coord.x, coord.y);
            let base_path = store.prepare_path(&coord)?;
            let synth_path = create_empty_root_elevation_file(&base_path, grid, &coord)?;

            let synth_result = (|| {
                let tiler = GdalTiler::open(
                    &synth_path,
                    grid.clone(),
                    options.tiler_options.clone(),
                )?;
                let mut reader = ReaderWithOverviews::new();
                process_coordinate(options, &tiler, &mut reader, store, &coord, 0)
            })();
            let _ = fs::remove_file(&synth_path);
            synth_result?;
        }
    }

    if !metadata.levels.is_empty() {
        metadata.levels[0] = LevelInfo {
            start_x: 0,
            start_y: 0,
            final_x: 1,
            final_y: 0,
        };
    }
    Ok(())
}
