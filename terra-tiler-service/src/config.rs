//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! Build configuration

use std::path::PathBuf;
use std::str::FromStr;
use terra_tiler_core::errors::TilerError;
use terra_tiler_gdal::TilerOptions;
use tile_grid::Grid;

/// TMS tiling profile
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Profile {
    Geodetic,
    Mercator,
}

impl FromStr for Profile {
    type Err = TilerError;

    fn from_str(value: &str) -> Result<Profile, TilerError> {
        match value {
            "geodetic" => Ok(Profile::Geodetic),
            "mercator" => Ok(Profile::Mercator),
            _ => Err(TilerError::Config(format!("unknown profile: {}", value))),
        }
    }
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Geodetic => "geodetic",
            Profile::Mercator => "mercator",
        }
    }
}

/// Output tile format
#[derive(PartialEq, Clone, Debug)]
pub enum OutputFormat {
    /// heightmap-1.0 terrain tiles
    Heightmap,
    /// quantized-mesh-1.0 terrain tiles
    Mesh,
    /// Tiles written by a named GDAL driver
    Gdal(String),
}

impl OutputFormat {
    /// Parse a format name; `Terrain` and `Mesh` are accepted as the
    /// historical names of the two terrain formats
    pub fn from_name(name: &str) -> OutputFormat {
        match name {
            "heightmap" | "Terrain" => OutputFormat::Heightmap,
            "mesh" | "Mesh" => OutputFormat::Mesh,
            driver => OutputFormat::Gdal(driver.to_string()),
        }
    }

    /// Format name in `layer.json`
    pub fn metadata_name(&self) -> &str {
        match self {
            OutputFormat::Heightmap => "heightmap-1.0",
            OutputFormat::Mesh => "quantized-mesh-1.0",
            OutputFormat::Gdal(_) => "GDAL",
        }
    }
}

/// All settings of a pyramid build
#[derive(Clone, Debug)]
pub struct BuildOptions {
    /// Source raster path
    pub input: PathBuf,
    /// Directory the tiles are written to
    pub output_dir: PathBuf,
    pub profile: Profile,
    pub format: OutputFormat,
    /// Tile size in pixels, default depends on the format
    pub tile_size: Option<u16>,
    /// First zoom level, default matches the source resolution
    pub start_zoom: Option<u8>,
    /// Last zoom level
    pub end_zoom: u8,
    /// Worker threads, default is the CPU count
    pub thread_count: Option<usize>,
    /// Do not overwrite existing tiles
    pub resume: bool,
    /// Factor applied to the estimated geometric error of mesh tiles
    pub mesh_quality_factor: f64,
    /// Write the oct encoded vertex normals extension (mesh only)
    pub write_vertex_normals: bool,
    /// Force creation of missing root tiles for CesiumJS
    pub cesium_friendly: bool,
    /// Only write the layer.json metadata file
    pub metadata_only: bool,
    /// Warp parameters
    pub tiler_options: TilerOptions,
    /// GDAL creation options as NAME=VALUE strings
    pub creation_options: Vec<String>,
    /// Show a progress bar on stdout
    pub show_progress: bool,
}

impl BuildOptions {
    pub fn new(input: PathBuf, output_dir: PathBuf) -> BuildOptions {
        BuildOptions {
            input,
            output_dir,
            profile: Profile::Geodetic,
            format: OutputFormat::Heightmap,
            tile_size: None,
            start_zoom: None,
            end_zoom: 0,
            thread_count: None,
            resume: false,
            mesh_quality_factor: 1.0,
            write_vertex_normals: false,
            cesium_friendly: false,
            metadata_only: false,
            tiler_options: TilerOptions::default(),
            creation_options: Vec::new(),
            show_progress: true,
        }
    }

    /// Effective tile size: 65 for the terrain formats, 256 for GDAL
    /// output
    pub fn tile_size(&self) -> u16 {
        self.tile_size.unwrap_or(match self.format {
            OutputFormat::Heightmap | OutputFormat::Mesh => 65,
            OutputFormat::Gdal(_) => 256,
        })
    }

    /// The tile grid of the selected profile
    pub fn grid(&self) -> Grid {
        match self.profile {
            Profile::Geodetic => Grid::geodetic(self.tile_size()),
            Profile::Mercator => Grid::mercator(self.tile_size()),
        }
    }
}
