//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! Terrain pyramid metadata and the `layer.json` manifest

use crate::config::{OutputFormat, Profile};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use terra_tiler_core::errors::TilerResult;
use tile_grid::{Extent, Grid, TileCoordinate};

/// The valid tile index range of one level of a tileset
#[derive(PartialEq, Clone, Debug)]
pub struct LevelInfo {
    pub start_x: i64,
    pub start_y: i64,
    pub final_x: i64,
    pub final_y: i64,
}

impl LevelInfo {
    pub fn new() -> LevelInfo {
        LevelInfo {
            start_x: i64::max_value(),
            start_y: i64::max_value(),
            final_x: i64::min_value(),
            final_y: i64::min_value(),
        }
    }

    /// Has at least one coordinate been recorded?
    pub fn is_covered(&self) -> bool {
        self.final_x >= self.start_x
    }

    fn add_coordinate(&mut self, coord: &TileCoordinate) {
        self.start_x = self.start_x.min(coord.x as i64);
        self.start_y = self.start_y.min(coord.y as i64);
        self.final_x = self.final_x.max(coord.x as i64);
        self.final_y = self.final_y.max(coord.y as i64);
    }

    fn add(&mut self, other: &LevelInfo) {
        self.start_x = self.start_x.min(other.start_x);
        self.start_y = self.start_y.min(other.start_y);
        self.final_x = self.final_x.max(other.final_x);
        self.final_y = self.final_y.max(other.final_y);
    }
}

impl Default for LevelInfo {
    fn default() -> Self {
        LevelInfo::new()
    }
}

/// Aggregated metadata of a produced pyramid: covered tile indices per
/// zoom level and overall CRS bounds
#[derive(Clone, Debug, Default)]
pub struct TerrainMetadata {
    /// Level infos indexed by zoom
    pub levels: Vec<LevelInfo>,
    /// Union of the bounds of all visited tiles
    pub bounds: Option<Extent>,
}

impl TerrainMetadata {
    pub fn new() -> TerrainMetadata {
        TerrainMetadata::default()
    }

    /// Record a visited tile coordinate
    pub fn add_coordinate(&mut self, grid: &Grid, coord: &TileCoordinate) {
        let tile_bounds = grid.tile_bounds(coord);
        while self.levels.len() <= coord.zoom as usize {
            self.levels.push(LevelInfo::new());
        }
        self.levels[coord.zoom as usize].add_coordinate(coord);

        match &mut self.bounds {
            Some(bounds) => bounds.expand(&tile_bounds),
            None => self.bounds = Some(tile_bounds),
        }
    }

    /// Merge the metadata collected by another worker
    pub fn merge(&mut self, other: &TerrainMetadata) {
        if other.levels.is_empty() {
            return;
        }
        while self.levels.len() < other.levels.len() {
            self.levels.push(LevelInfo::new());
        }
        for (level, other_level) in self.levels.iter_mut().zip(&other.levels) {
            level.add(other_level);
        }
        if let Some(other_bounds) = &other.bounds {
            match &mut self.bounds {
                Some(bounds) => bounds.expand(other_bounds),
                None => self.bounds = Some(other_bounds.clone()),
            }
        }
    }

    /// The `layer.json` document describing the tileset
    pub fn to_json(
        &self,
        dataset_name: &str,
        format: &OutputFormat,
        profile: &Profile,
        write_vertex_normals: bool,
    ) -> serde_json::Value {
        let round2 = |value: f64| (value * 100.0).round() / 100.0;
        let bounds = match &self.bounds {
            Some(bounds) => vec![
                round2(bounds.minx),
                round2(bounds.miny),
                round2(bounds.maxx),
                round2(bounds.maxy),
            ],
            None => vec![0.0, 0.0, 0.0, 0.0],
        };

        #[derive(Serialize)]
        struct AvailableRange {
            #[serde(rename = "startX")]
            start_x: i64,
            #[serde(rename = "startY")]
            start_y: i64,
            #[serde(rename = "endX")]
            end_x: i64,
            #[serde(rename = "endY")]
            end_y: i64,
        }

        let available: Vec<Vec<AvailableRange>> = self
            .levels
            .iter()
            .map(|level| {
                if level.is_covered() {
                    vec![AvailableRange {
                        start_x: level.start_x,
                        start_y: level.start_y,
                        end_x: level.final_x,
                        end_y: level.final_y,
                    }]
                } else {
                    Vec::new()
                }
            })
            .collect();

        let projection = match profile {
            Profile::Geodetic => "EPSG:4326",
            Profile::Mercator => "EPSG:3857",
        };

        let mut doc = json!({
            "tilejson": "2.1.0",
            "name": dataset_name,
            "description": "",
            "version": "1.1.0",
            "format": format.metadata_name(),
            "attribution": "",
            "schema": "tms",
            "tiles": [ "{z}/{x}/{y}.terrain?v={version}" ],
            "projection": projection,
            "bounds": bounds,
            "available": available,
        });
        if write_vertex_normals {
            doc.as_object_mut().unwrap().insert(
                "extensions".to_string(),
                json!(["octvertexnormals"]),
            );
        }
        doc
    }

    /// Write the `layer.json` metadata file
    pub fn write_json_file(
        &self,
        filename: &Path,
        dataset_name: &str,
        format: &OutputFormat,
        profile: &Profile,
        write_vertex_normals: bool,
    ) -> TilerResult<()> {
        let doc = self.to_json(dataset_name, format, profile, write_vertex_normals);
        let mut file = File::create(filename)?;
        file.write_all(serde_json::to_string_pretty(&doc).unwrap().as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}
