//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod reader;
mod synth;
mod tiler;

#[cfg(test)]
mod tiler_test;

pub use self::reader::{DatasetReader, ReaderWithOverviews};
pub use self::synth::{create_empty_root_elevation_file, heights_to_raster};
pub use self::tiler::{resample_alg_from_name, GdalTiler, RasterWindow, TilerOptions};

pub fn gdal_version() -> String {
    gdal::version::version_info("RELEASE_NAME")
}
