//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

pub mod errors;
pub mod heightfield;
pub mod heightmap;
pub mod mesh;
pub mod quantized_mesh;
pub mod store;

#[cfg(test)]
mod heightfield_test;
#[cfg(test)]
mod heightmap_test;
#[cfg(test)]
mod quantized_mesh_test;
