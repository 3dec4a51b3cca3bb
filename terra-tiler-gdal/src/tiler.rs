//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! Raster window extraction from a GDAL dataset
//!
//! A `GdalTiler` composes a source dataset with a tile grid. For every tile
//! coordinate it can produce a warped virtual raster (VRT) aligned to the
//! tile's CRS extent at the tile's native resolution, reprojecting when the
//! source spatial reference differs from the grid.

use gdal::cpl::CslStringList;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::{Dataset, DatasetOptions};
use gdal_sys::{CPLErr, GDALResampleAlg};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;
use std::os::raw::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use terra_tiler_core::errors::{TilerError, TilerResult, WindowErrorKind};
use tile_grid::{Extent, Grid, TileCoordinate};

lazy_static! {
    // Transform construction is not guaranteed thread safe and transformed
    // bounds can differ slightly between threads unless serialised.
    static ref TRANSFORM_MUTEX: Mutex<()> = Mutex::new(());
}

/// Warp parameters of a tiler
#[derive(Clone, Debug)]
pub struct TilerOptions {
    pub resample_alg: GDALResampleAlg::Type,
    /// Error threshold in pixel units for approximate transforms, 0 means
    /// exact
    pub error_threshold: f64,
    /// Memory limit in bytes used for warp operations, 0 leaves the GDAL
    /// default
    pub warp_memory_limit: f64,
}

impl Default for TilerOptions {
    fn default() -> TilerOptions {
        TilerOptions {
            resample_alg: GDALResampleAlg::GRA_Average,
            error_threshold: 0.125,
            warp_memory_limit: 0.0,
        }
    }
}

/// Resampling algorithm by its command line name
pub fn resample_alg_from_name(name: &str) -> Option<GDALResampleAlg::Type> {
    let alg = match name {
        "nearest" => GDALResampleAlg::GRA_NearestNeighbour,
        "bilinear" => GDALResampleAlg::GRA_Bilinear,
        "cubic" => GDALResampleAlg::GRA_Cubic,
        "cubicspline" => GDALResampleAlg::GRA_CubicSpline,
        "lanczos" => GDALResampleAlg::GRA_Lanczos,
        "average" => GDALResampleAlg::GRA_Average,
        "mode" => GDALResampleAlg::GRA_Mode,
        "max" => GDALResampleAlg::GRA_Max,
        "min" => GDALResampleAlg::GRA_Min,
        "med" => GDALResampleAlg::GRA_Med,
        "q1" => GDALResampleAlg::GRA_Q1,
        "q3" => GDALResampleAlg::GRA_Q3,
        _ => return None,
    };
    Some(alg)
}

/// A warped raster view over the source data of one tile
///
/// Owns the VRT dataset plus, for approximate transforms, the base image
/// transformer that the warp references. The dataset is released before the
/// transformer.
pub struct RasterWindow {
    dataset: Option<Dataset>,
    base_transformer: *mut c_void,
}

impl RasterWindow {
    pub fn dataset(&self) -> &Dataset {
        self.dataset.as_ref().unwrap()
    }

    pub fn dataset_mut(&mut self) -> &mut Dataset {
        self.dataset.as_mut().unwrap()
    }

    /// Read the first band as float heights
    pub fn read_heights(&self, tile_size: usize) -> TilerResult<Vec<f32>> {
        let mut heights = vec![0f32; tile_size * tile_size];
        let band = self.dataset().rasterband(1).map_err(|e| {
            TilerError::window(WindowErrorKind::ReadFailed, format!("no raster band: {}", e))
        })?;
        band.read_into_slice::<f32>(
            (0, 0),
            (tile_size, tile_size),
            (tile_size, tile_size),
            &mut heights,
            None,
        )
        .map_err(|e| {
            TilerError::window(
                WindowErrorKind::ReadFailed,
                format!("could not read heights from raster: {}", e),
            )
        })?;
        Ok(heights)
    }
}

impl Drop for RasterWindow {
    fn drop(&mut self) {
        // Close the VRT before destroying the transformer it references
        self.dataset.take();
        if !self.base_transformer.is_null() {
            unsafe { gdal_sys::GDALDestroyGenImgProjTransformer(self.base_transformer) };
        }
    }
}

/// Composes a source raster with a tile grid
pub struct GdalTiler {
    grid: Grid,
    dataset: Dataset,
    path: PathBuf,
    /// Source bounds in the grid CRS
    bounds: Extent,
    /// Source resolution in grid CRS units per pixel
    resolution: f64,
    /// Grid SRS WKT, cached when the source needs reprojection
    grid_wkt: Option<String>,
    options: TilerOptions,
    // Source reopened at fixed overview levels, released with the tiler
    overview_cache: RefCell<HashMap<usize, Dataset>>,
}

impl GdalTiler {
    /// Open a source raster read-only and bind it to a grid
    pub fn open(path: &Path, grid: Grid, options: TilerOptions) -> TilerResult<GdalTiler> {
        let dataset = Dataset::open(path)
            .map_err(|e| TilerError::Source(format!("could not open GDAL dataset: {}", e)))?;
        GdalTiler::from_dataset(dataset, path, grid, options)
    }

    /// Bind an open dataset to a grid
    pub fn from_dataset(
        dataset: Dataset,
        path: &Path,
        grid: Grid,
        options: TilerOptions,
    ) -> TilerResult<GdalTiler> {
        let _lock = TRANSFORM_MUTEX.lock().unwrap();

        let gt = dataset.geo_transform().map_err(|_| {
            TilerError::Source(
                "could not get transformation information from source dataset".to_string(),
            )
        })?;
        let (raster_x_size, raster_y_size) = dataset.raster_size();
        let raw_bounds = Extent::new(
            gt[0],
            gt[3] + raster_y_size as f64 * gt[5],
            gt[0] + raster_x_size as f64 * gt[1],
            gt[3],
        );

        let src_wkt = dataset.projection();
        if src_wkt.is_empty() {
            return Err(TilerError::Source(
                "the source dataset does not have a spatial reference system assigned".to_string(),
            ));
        }
        let mut src_srs = SpatialRef::from_wkt(&src_wkt).map_err(|e| {
            TilerError::Source(format!("the source spatial reference system is invalid: {}", e))
        })?;
        src_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        let mut grid_srs = SpatialRef::from_epsg(grid.srid as u32)
            .map_err(|e| TilerError::Source(format!("could not create grid SRS: {}", e)))?;
        grid_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

        let (bounds, resolution, grid_wkt) = if src_srs != grid_srs {
            // Transform the 4 corners of the source bounds to the grid SRS
            // and take their envelope
            let transform = CoordTransform::new(&src_srs, &grid_srs).map_err(|e| {
                TilerError::Transform(format!(
                    "the source dataset to tile grid coordinate transformation could not be created: {}",
                    e
                ))
            })?;
            let mut xs = [
                raw_bounds.minx,
                raw_bounds.maxx,
                raw_bounds.maxx,
                raw_bounds.minx,
            ];
            let mut ys = [
                raw_bounds.miny,
                raw_bounds.miny,
                raw_bounds.maxy,
                raw_bounds.maxy,
            ];
            let mut zs = [0.0; 4];
            transform
                .transform_coords(&mut xs, &mut ys, &mut zs)
                .map_err(|e| {
                    TilerError::Transform(format!(
                        "could not transform dataset bounds to tile spatial reference system: {}",
                        e
                    ))
                })?;
            let bounds = Extent::new(
                xs.iter().cloned().fold(f64::INFINITY, f64::min),
                ys.iter().cloned().fold(f64::INFINITY, f64::min),
                xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            );
            let resolution = bounds.width() / raster_x_size as f64;
            let wkt = grid_srs
                .to_wkt()
                .map_err(|e| TilerError::Source(format!("could not create grid WKT: {}", e)))?;
            (bounds, resolution, Some(wkt))
        } else {
            (raw_bounds, gt[1].abs(), None)
        };
        debug!(
            "source bounds {:?}, resolution {} ({})",
            bounds,
            resolution,
            path.display()
        );

        Ok(GdalTiler {
            grid,
            dataset,
            path: path.to_path_buf(),
            bounds,
            resolution,
            grid_wkt,
            options,
            overview_cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source bounds in the grid CRS
    pub fn bounds(&self) -> &Extent {
        &self.bounds
    }

    /// Source resolution in grid CRS units per pixel
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn requires_reprojection(&self) -> bool {
        self.grid_wkt.is_some()
    }

    /// Zoom level matching the native resolution of the source
    pub fn max_zoom_level(&self) -> u8 {
        self.grid.zoom_for_resolution(self.resolution)
    }

    /// Warped raster window aligned to the plain CRS bounds of a tile
    pub fn raster_window(&self, dataset: &Dataset, coord: &TileCoordinate) -> TilerResult<RasterWindow> {
        let bounds = self.grid.tile_bounds(coord);
        let resolution = self.grid.resolution(coord.zoom);
        let gt = [bounds.minx, resolution, 0.0, bounds.maxy, 0.0, -resolution];
        self.create_warped_window(dataset, gt)
    }

    /// Warped raster window for a heightmap tile
    ///
    /// The window is shifted one pixel west and north so that the 65x65
    /// sample grid shares its edge rows with the neighbouring tiles, as the
    /// heightmap format requires. The plain tile geotransform is stamped on
    /// the VRT afterwards.
    pub fn terrain_window(&self, dataset: &Dataset, coord: &TileCoordinate) -> TilerResult<RasterWindow> {
        let mut bounds = self.grid.tile_bounds(coord);
        let border_size = (self.grid.tile_size() - 1) as f64;
        let resolution = bounds.width() / border_size;
        bounds.set_minx(bounds.minx - resolution);
        bounds.set_maxy(bounds.maxy + resolution);
        let gt = [bounds.minx, resolution, 0.0, bounds.maxy, 0.0, -resolution];

        let mut window = self.create_warped_window(dataset, gt)?;

        // Overwrite the overlap geotransform so the data is addressed by
        // the bounds of the tile itself
        let tile_bounds = self.grid.tile_bounds(coord);
        let tile_resolution = self.grid.resolution(coord.zoom);
        let tile_gt = [
            tile_bounds.minx,
            tile_resolution,
            0.0,
            tile_bounds.maxy,
            0.0,
            -tile_resolution,
        ];
        window
            .dataset_mut()
            .set_geo_transform(&tile_gt)
            .map_err(|e| {
                TilerError::window(
                    WindowErrorKind::WarpSetupFailed,
                    format!("could not set geo transform on VRT: {}", e),
                )
            })?;
        Ok(window)
    }

    /// Build the warped VRT for a target geotransform
    ///
    /// This is the heart of the tiler: a warp specification against the
    /// tile geotransform, using an overview of the source when the target
    /// resolution is much coarser, optionally wrapped in a linear
    /// approximator.
    fn create_warped_window(&self, dataset: &Dataset, mut gt: [f64; 6]) -> TilerResult<RasterWindow> {
        let tile_size = self.grid.tile_size() as c_int;

        let src_wkt = dataset.projection();
        if src_wkt.is_empty() {
            return Err(TilerError::window(
                WindowErrorKind::NoSourceSrs,
                "the source dataset no longer has a spatial reference system assigned",
            ));
        }
        let grid_wkt = self.grid_wkt.clone().unwrap_or_else(|| src_wkt.clone());

        let srs_option_err = |e| {
            TilerError::window(
                WindowErrorKind::TransformSetupFailed,
                format!("could not set transform SRS options: {}", e),
            )
        };
        let mut transform_options = CslStringList::new();
        if self.requires_reprojection() {
            transform_options
                .set_name_value("SRC_SRS", &src_wkt)
                .map_err(srs_option_err)?;
            transform_options
                .set_name_value("DST_SRS", &grid_wkt)
                .map_err(srs_option_err)?;
        }

        let h_src = dataset.c_dataset();

        unsafe {
            let warp_options = gdal_sys::GDALCreateWarpOptions();
            (*warp_options).eResampleAlg = self.options.resample_alg;
            if self.options.warp_memory_limit > 0.0 {
                (*warp_options).dfWarpMemoryLimit = self.options.warp_memory_limit;
            }
            (*warp_options).hSrcDS = h_src;

            let band_count = gdal_sys::GDALGetRasterCount(h_src);
            (*warp_options).nBandCount = band_count;
            (*warp_options).panSrcBands =
                gdal_sys::CPLMalloc(std::mem::size_of::<c_int>() * band_count as usize)
                    as *mut c_int;
            (*warp_options).panDstBands =
                gdal_sys::CPLMalloc(std::mem::size_of::<c_int>() * band_count as usize)
                    as *mut c_int;
            (*warp_options).padfSrcNoDataReal =
                gdal_sys::CPLCalloc(band_count as usize, std::mem::size_of::<f64>()) as *mut f64;
            (*warp_options).padfSrcNoDataImag =
                gdal_sys::CPLCalloc(band_count as usize, std::mem::size_of::<f64>()) as *mut f64;
            (*warp_options).padfDstNoDataReal =
                gdal_sys::CPLCalloc(band_count as usize, std::mem::size_of::<f64>()) as *mut f64;
            (*warp_options).padfDstNoDataImag =
                gdal_sys::CPLCalloc(band_count as usize, std::mem::size_of::<f64>()) as *mut f64;

            for band in 0..band_count {
                let h_band = gdal_sys::GDALGetRasterBand(h_src, band + 1);
                let mut has_no_data: c_int = 0;
                let mut no_data = gdal_sys::GDALGetRasterNoDataValue(h_band, &mut has_no_data);
                if has_no_data == 0 {
                    no_data = -32768.0;
                }
                *(*warp_options).padfSrcNoDataReal.add(band as usize) = no_data;
                *(*warp_options).padfSrcNoDataImag.add(band as usize) = 0.0;
                *(*warp_options).padfDstNoDataReal.add(band as usize) = no_data;
                *(*warp_options).padfDstNoDataImag.add(band as usize) = 0.0;
                *(*warp_options).panSrcBands.add(band as usize) = band + 1;
                *(*warp_options).panDstBands.add(band as usize) = band + 1;
            }

            // Image to image transformer against the tile geotransform
            let mut transformer_arg = gdal_sys::GDALCreateGenImgProjTransformer2(
                h_src,
                std::ptr::null_mut(),
                transform_options.as_ptr(),
            );
            if transformer_arg.is_null() {
                gdal_sys::GDALDestroyWarpOptions(warp_options);
                return Err(TilerError::window(
                    WindowErrorKind::TransformSetupFailed,
                    "could not create image to image transformer",
                ));
            }
            gdal_sys::GDALSetGenImgProjTransformerDstGeoTransform(transformer_arg, gt.as_ptr());

            // Try and get an overview from the source dataset that
            // corresponds more closely to the resolution of this tile.
            let mut h_work_src = h_src;
            if let Some(overview) = self.select_overview(dataset, transformer_arg)? {
                let overview_cache = self.overview_cache.borrow();
                h_work_src = overview_cache.get(&overview).unwrap().c_dataset();
                (*warp_options).hSrcDS = h_work_src;

                // The transformer must be recreated when operating on an
                // overview
                gdal_sys::GDALDestroyGenImgProjTransformer(transformer_arg);
                transformer_arg = gdal_sys::GDALCreateGenImgProjTransformer2(
                    h_work_src,
                    std::ptr::null_mut(),
                    transform_options.as_ptr(),
                );
                if transformer_arg.is_null() {
                    gdal_sys::GDALDestroyWarpOptions(warp_options);
                    return Err(TilerError::window(
                        WindowErrorKind::TransformSetupFailed,
                        "could not create overview image to image transformer",
                    ));
                }
                gdal_sys::GDALSetGenImgProjTransformerDstGeoTransform(transformer_arg, gt.as_ptr());
            }

            let is_approx_transform = self.options.error_threshold > 0.0;
            if is_approx_transform {
                // approximate: wrap the transformer with a linear
                // approximator
                let approx_arg = gdal_sys::GDALCreateApproxTransformer(
                    Some(gdal_sys::GDALGenImgProjTransform),
                    transformer_arg,
                    self.options.error_threshold,
                );
                if approx_arg.is_null() {
                    gdal_sys::GDALDestroyWarpOptions(warp_options);
                    gdal_sys::GDALDestroyGenImgProjTransformer(transformer_arg);
                    return Err(TilerError::window(
                        WindowErrorKind::TransformSetupFailed,
                        "could not create linear approximator",
                    ));
                }
                (*warp_options).pTransformerArg = approx_arg;
                (*warp_options).pfnTransformer = Some(gdal_sys::GDALApproxTransform);
            } else {
                // exact: no wrapping required
                (*warp_options).pTransformerArg = transformer_arg;
                (*warp_options).pfnTransformer = Some(gdal_sys::GDALGenImgProjTransform);
            }

            let h_dst = gdal_sys::GDALCreateWarpedVRT(
                h_work_src,
                tile_size,
                tile_size,
                gt.as_mut_ptr(),
                warp_options,
            );
            gdal_sys::GDALDestroyWarpOptions(warp_options);

            if h_dst.is_null() {
                gdal_sys::GDALDestroyGenImgProjTransformer(transformer_arg);
                return Err(TilerError::window(
                    WindowErrorKind::WarpSetupFailed,
                    "could not create warped VRT",
                ));
            }

            // The projection of the VRT is always the grid SRS
            let grid_wkt_c = CString::new(grid_wkt.as_str()).unwrap();
            if gdal_sys::GDALSetProjection(h_dst, grid_wkt_c.as_ptr()) != CPLErr::CE_None {
                gdal_sys::GDALClose(h_dst);
                gdal_sys::GDALDestroyGenImgProjTransformer(transformer_arg);
                return Err(TilerError::window(
                    WindowErrorKind::WarpSetupFailed,
                    "could not set projection on VRT",
                ));
            }

            Ok(RasterWindow {
                dataset: Some(Dataset::from_c_dataset(h_dst)),
                // The VRT owns the approx transformer; the base transformer
                // is released with the window.
                base_transformer: if is_approx_transform {
                    transformer_arg
                } else {
                    std::ptr::null_mut()
                },
            })
        }
    }

    /// Pick the source overview which best matches the warp transformation
    ///
    /// Adapted from the `gdalwarp -ovr` logic: the overview whose
    /// downsampling ratio is just below the target ratio (or within 0.1 of
    /// it) avoids integer overflow and excessive downsampling when cutting
    /// small scale tiles from high resolution sources. Returns the overview
    /// level, with the reopened dataset parked in the overview cache.
    fn select_overview(
        &self,
        dataset: &Dataset,
        transformer_arg: *mut c_void,
    ) -> TilerResult<Option<usize>> {
        let h_src = dataset.c_dataset();
        unsafe {
            let h_band = gdal_sys::GDALGetRasterBand(h_src, 1);
            let overview_count = gdal_sys::GDALGetOverviewCount(h_band);
            if overview_count <= 0 {
                return Ok(None);
            }

            let mut suggested_gt = [0f64; 6];
            let mut extent = [0f64; 4];
            let mut pixels: c_int = 0;
            let mut lines: c_int = 0;
            if gdal_sys::GDALSuggestedWarpOutput2(
                h_src,
                Some(gdal_sys::GDALGenImgProjTransform),
                transformer_arg,
                suggested_gt.as_mut_ptr(),
                &mut pixels,
                &mut lines,
                extent.as_mut_ptr(),
                0,
            ) != CPLErr::CE_None
            {
                return Ok(None);
            }

            let target_ratio = 1.0 / suggested_gt[1];
            if target_ratio <= 1.0 {
                return Ok(None);
            }

            let src_x_size = gdal_sys::GDALGetRasterXSize(h_src) as f64;
            let overview_width = |index: c_int| -> f64 {
                let h_overview = gdal_sys::GDALGetOverview(h_band, index);
                gdal_sys::GDALGetRasterBandXSize(h_overview) as f64
            };

            let mut selected: c_int = -1;
            while selected < overview_count - 1 {
                let ratio = if selected < 0 {
                    1.0
                } else {
                    src_x_size / overview_width(selected)
                };
                let next_ratio = src_x_size / overview_width(selected + 1);
                if ratio < target_ratio && next_ratio > target_ratio {
                    break;
                }
                if (ratio - target_ratio).abs() < 1e-1 {
                    break;
                }
                selected += 1;
            }
            if selected < 0 {
                return Ok(None);
            }

            let level = selected as usize;
            if !self.overview_cache.borrow().contains_key(&level) {
                debug!(
                    "selecting overview level {} of {}",
                    level,
                    self.path.display()
                );
                let overview_option = format!("OVERVIEW_LEVEL={}", level);
                let overview_dataset = match Dataset::open_ex(
                    &self.path,
                    DatasetOptions {
                        open_options: Some(&[overview_option.as_str()]),
                        ..DatasetOptions::default()
                    },
                ) {
                    Ok(dataset) => dataset,
                    Err(error) => {
                        // fall back to the full resolution source
                        warn!(
                            "could not open overview level {} of {}: {}",
                            level,
                            self.path.display(),
                            error
                        );
                        return Ok(None);
                    }
                };
                self.overview_cache
                    .borrow_mut()
                    .insert(level, overview_dataset);
            }
            Ok(Some(level))
        }
    }
}
