//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! Raster height readers

use crate::tiler::GdalTiler;
use gdal::raster::{Buffer, ResampleAlg};
use gdal::{Dataset, DriverManager};
use terra_tiler_core::errors::{TilerError, TilerResult, WindowErrorKind};
use tile_grid::TileCoordinate;

/// Plain height reader without fallback strategies
pub struct DatasetReader;

impl DatasetReader {
    /// Read the 65x65 float heights of a tile coordinate
    pub fn read_raster_heights(
        tiler: &GdalTiler,
        dataset: &Dataset,
        coord: &TileCoordinate,
    ) -> TilerResult<Vec<f32>> {
        let window = tiler.terrain_window(dataset, coord)?;
        window.read_heights(tiler.grid().tile_size() as usize)
    }
}

/// Height reader recovering from reads that fail on extreme zoom ratios
///
/// Very high resolution sources without overviews can overflow the integer
/// arithmetic of the warp transform when cutting low zoom tiles. When a
/// read fails this reader materialises a progressively coarser overview of
/// the source and retries against it. The overview stack is owned by the
/// reader and released with it.
pub struct ReaderWithOverviews {
    overviews: Vec<Dataset>,
    overview_index: i32,
}

impl ReaderWithOverviews {
    pub fn new() -> ReaderWithOverviews {
        ReaderWithOverviews {
            overviews: Vec::new(),
            overview_index: 0,
        }
    }

    /// Read the 65x65 float heights of a tile coordinate, creating source
    /// overviews on demand
    pub fn read_raster_heights(
        &mut self,
        tiler: &GdalTiler,
        coord: &TileCoordinate,
    ) -> TilerResult<Vec<f32>> {
        let tile_size = tiler.grid().tile_size() as usize;

        loop {
            let result = {
                let dataset = self.overviews.last().unwrap_or_else(|| tiler.dataset());
                tiler
                    .terrain_window(dataset, coord)
                    .and_then(|window| window.read_heights(tile_size))
            };
            match result {
                Ok(heights) => return Ok(heights),
                Err(error) => {
                    warn!(
                        "read failed for tile {}/{}/{}, trying overview {}: {}",
                        coord.zoom, coord.x, coord.y, self.overview_index, error
                    );
                    let overview = self.create_overview(tiler, self.overview_index)?;
                    self.overview_index += 1;
                    self.overviews.push(overview);
                }
            }
        }
    }

    /// Release all overviews
    pub fn reset(&mut self) {
        self.overview_index = 0;
        self.overviews.clear();
    }

    /// Materialise an overview of the source, downscaled by `2 << index`
    fn create_overview(&self, tiler: &GdalTiler, index: i32) -> TilerResult<Dataset> {
        let factor = 2usize << index;
        let source = tiler.dataset();
        let (src_width, src_height) = source.raster_size();
        let width = src_width / factor;
        let height = src_height / factor;
        if width <= 4 || height <= 4 {
            return Err(TilerError::window(
                WindowErrorKind::ReadFailed,
                "could not create an overview of current GDAL dataset",
            ));
        }

        let gt = source.geo_transform().map_err(|e| {
            TilerError::window(WindowErrorKind::NoGeotransform, format!("{}", e))
        })?;
        let overview_gt = [
            gt[0],
            gt[1] * factor as f64,
            gt[2],
            gt[3],
            gt[4],
            gt[5] * factor as f64,
        ];

        let mut data = vec![0f32; width * height];
        source
            .rasterband(1)
            .and_then(|band| {
                band.read_into_slice::<f32>(
                    (0, 0),
                    (src_width, src_height),
                    (width, height),
                    &mut data,
                    Some(ResampleAlg::Average),
                )
            })
            .map_err(|e| {
                TilerError::window(
                    WindowErrorKind::ReadFailed,
                    format!("could not downsample source: {}", e),
                )
            })?;

        let build = move || -> gdal::errors::Result<Dataset> {
            let driver = DriverManager::get_driver_by_name("MEM")?;
            let mut overview = driver.create_with_band_type::<f32, _>("", width, height, 1)?;
            overview.set_projection(&source.projection())?;
            overview.set_geo_transform(&overview_gt)?;
            let no_data = source.rasterband(1)?.no_data_value();
            let mut band = overview.rasterband(1)?;
            if let Some(no_data) = no_data {
                band.set_no_data_value(Some(no_data))?;
            }
            let mut buffer = Buffer::new((width, height), data);
            band.write((0, 0), (width, height), &mut buffer)?;
            drop(band);
            Ok(overview)
        };
        build().map_err(|e| {
            TilerError::window(
                WindowErrorKind::WarpSetupFailed,
                format!("could not build overview dataset: {}", e),
            )
        })
    }
}

impl Default for ReaderWithOverviews {
    fn default() -> Self {
        ReaderWithOverviews::new()
    }
}
