//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! Convert a GDAL raster DTM into a pyramid of terrain tiles
//!
//! By default the raster is cut into gzip compressed heightmap-1.0 tiles
//! which are written to an output directory. The `mesh` format produces
//! quantized-mesh-1.0 tiles instead, and any writable GDAL driver name
//! produces plain raster tiles. In the case of a multiband raster only the
//! first band is used for the terrain heights. No water mask is derived
//! and all tiles are flagged as being 'all land'.

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use clap::{App, Arg, ArgMatches};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use terra_tiler_core::errors::TilerError;
use terra_tiler_gdal::resample_alg_from_name;
use terra_tiler_service::build;
use terra_tiler_service::config::{BuildOptions, OutputFormat, Profile};

fn parse_value<T: FromStr>(matches: &ArgMatches, name: &str) -> Option<T> {
    matches.value_of(name).map(|value| {
        value.parse().unwrap_or_else(|_| {
            eprintln!("Error: invalid value for --{}: {}", name, value);
            process::exit(1);
        })
    })
}

fn options_from_args(matches: &ArgMatches) -> BuildOptions {
    let input = PathBuf::from(matches.value_of("GDAL_DATASOURCE").unwrap());
    let output_dir = PathBuf::from(matches.value_of("output-dir").unwrap_or("."));
    let mut options = BuildOptions::new(input, output_dir);

    if let Some(format) = matches.value_of("output-format") {
        options.format = OutputFormat::from_name(format);
    }
    if let Some(profile) = matches.value_of("profile") {
        options.profile = Profile::from_str(profile).unwrap_or_else(|error| {
            eprintln!("Error: {}", error);
            process::exit(1);
        });
    }
    options.tile_size = parse_value(matches, "tile-size");
    options.start_zoom = parse_value(matches, "start-zoom");
    if let Some(end_zoom) = parse_value(matches, "end-zoom") {
        options.end_zoom = end_zoom;
    }
    options.thread_count = parse_value(matches, "thread-count");
    options.resume = matches.is_present("resume");
    if let Some(factor) = parse_value(matches, "mesh-qfactor") {
        options.mesh_quality_factor = factor;
    }
    options.write_vertex_normals = matches.is_present("vertex-normals");
    options.cesium_friendly = matches.is_present("cesium-friendly");
    options.metadata_only = matches.is_present("layer");

    if let Some(name) = matches.value_of("resampling-method") {
        options.tiler_options.resample_alg = resample_alg_from_name(name).unwrap_or_else(|| {
            eprintln!("Error: unknown resampling algorithm: {}", name);
            process::exit(1);
        });
    }
    if let Some(threshold) = parse_value(matches, "error-threshold") {
        options.tiler_options.error_threshold = threshold;
    }
    if let Some(limit) = parse_value(matches, "warp-memory") {
        options.tiler_options.warp_memory_limit = limit;
    }
    if let Some(values) = matches.values_of("creation-option") {
        options.creation_options = values.map(|value| value.to_string()).collect();
    }
    options
}

fn main() {
    let matches = App::new("terra_tiler")
        .version(crate_version!())
        .about("Convert a GDAL raster to terrain tiles")
        .args_from_usage(
            "-o, --output-dir=[DIR] 'Output directory for the tiles (defaults to the working directory)'
             -f, --output-format=[FORMAT] 'Output format: `heightmap` (the default), `mesh` or any format listed by gdalinfo --formats'
             -p, --profile=[PROFILE] 'TMS profile for the tiles: `geodetic` (the default) or `mercator`'
             -c, --thread-count=[COUNT] 'Number of threads used for tile generation (defaults to the number of CPUs)'
             -t, --tile-size=[SIZE] 'Tile size in pixels (defaults to 65 for terrain tiles and 256 for GDAL formats)'
             -s, --start-zoom=[ZOOM] 'Zoom level to start at (defaults to the level matching the source resolution)'
             -e, --end-zoom=[ZOOM] 'Zoom level to end at, less than the start zoom (defaults to 0)'
             -r, --resampling-method=[ALGORITHM] 'Raster resampling algorithm: nearest, bilinear, cubic, cubicspline, lanczos, average, mode, max, min, med, q1 or q3 (defaults to average)'
             -z, --error-threshold=[THRESHOLD] 'Error threshold in pixel units for transform approximation, larger values mean faster transforms (defaults to 0.125)'
             -m, --warp-memory=[BYTES] 'Memory limit in bytes used for warp operations (defaults to the GDAL internal setting)'
             -R, --resume 'Do not overwrite existing files'
             -g, --mesh-qfactor=[FACTOR] 'Factor applied to the estimated geometric error of mesh tiles, larger values mean lower quality (defaults to 1.0)'
             -l, --layer 'Only output the layer.json metadata file'
             -C, --cesium-friendly 'Force the creation of missing root tiles to be CesiumJS friendly'
             -N, --vertex-normals 'Write oct-encoded per-vertex normals for terrain lighting, only for the mesh format'
             <GDAL_DATASOURCE> 'The input raster'",
        )
        .arg(
            Arg::with_name("creation-option")
                .short("n")
                .long("creation-option")
                .value_name("NAME=VALUE")
                .help("GDAL creation option for the output dataset, can be given multiple times. Not valid for terrain tiles")
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .multiple(true)
                .help("Only output errors"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .help("Be more noisy"),
        )
        .get_matches();

    let verbosity: i32 =
        1 + matches.occurrences_of("verbose") as i32 - matches.occurrences_of("quiet") as i32;
    let filter = match verbosity {
        i32::MIN..=0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let mut options = options_from_args(&matches);
    options.show_progress = verbosity > 0;

    if let Err(error) = build::run(&options) {
        error!("{}", error);
        eprintln!("Error: {}", error);
        let code = match error {
            TilerError::Config(_) | TilerError::Source(_) => 1,
            _ => 2,
        };
        process::exit(code);
    }
}
