//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! The heightmap-1.0 tile format
//!
//! A tile is a regular 65x65 grid of quantized heights followed by a child
//! flag byte and a water mask. The water mask is either a single byte for a
//! uniform tile or a full 256x256 byte grid. The whole payload is stored
//! gzip compressed on disk.

use crate::errors::{TilerError, TilerResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tile_grid::{Extent, TileCoordinate};

/// Edge length of a heightmap tile in samples
pub const TILE_SIZE: usize = 65;
/// Number of height samples in a tile
pub const TILE_CELL_SIZE: usize = TILE_SIZE * TILE_SIZE;
/// Number of bytes in a full resolution water mask
pub const MASK_CELL_SIZE: usize = 256 * 256;
/// The maximum byte size of an uncompressed tile (heights + child flags +
/// water mask)
pub const MAX_TERRAIN_SIZE: usize = TILE_CELL_SIZE * 2 + 1 + MASK_CELL_SIZE;

pub const CHILD_SW: u8 = 1;
pub const CHILD_SE: u8 = 2;
pub const CHILD_NW: u8 = 4;
pub const CHILD_NE: u8 = 8;

/// Quantize a height in metres into the heightmap wire representation
///
/// The wire format stores `(h + 1000) * 5` as an int16. Out of range values
/// saturate instead of aliasing.
pub fn quantize_height(height: f32) -> i16 {
    let scaled = ((height as f64 + 1000.0) * 5.0).round();
    if scaled <= i16::min_value() as f64 {
        i16::min_value()
    } else if scaled >= i16::max_value() as f64 {
        i16::max_value()
    } else {
        scaled as i16
    }
}

/// Child flag byte for a tile of the pyramid
///
/// A bit is set for each sub quadrant of the tile that overlaps the source
/// dataset bounds.
pub fn child_flags_for(source_bounds: &Extent, tile_bounds: &Extent) -> u8 {
    let mut children = 0;
    if !source_bounds.overlaps(tile_bounds) {
        return children;
    }
    if source_bounds.overlaps(&tile_bounds.sw()) {
        children |= CHILD_SW;
    }
    if source_bounds.overlaps(&tile_bounds.se()) {
        children |= CHILD_SE;
    }
    if source_bounds.overlaps(&tile_bounds.nw()) {
        children |= CHILD_NW;
    }
    if source_bounds.overlaps(&tile_bounds.ne()) {
        children |= CHILD_NE;
    }
    children
}

/// Water mask of a heightmap tile
#[derive(Clone, Debug, PartialEq)]
pub enum Mask {
    /// The whole tile is water (1) or land (0)
    Uniform(u8),
    /// Per cell water mask at 256x256 resolution
    Full(Box<[u8]>),
}

/// A single heightmap-1.0 terrain tile
#[derive(Clone, Debug)]
pub struct TerrainTile {
    pub coord: TileCoordinate,
    heights: Vec<i16>,
    children: u8,
    mask: Mask,
}

impl TerrainTile {
    /// Create an empty all-land tile
    pub fn new(coord: TileCoordinate) -> TerrainTile {
        TerrainTile {
            coord,
            heights: vec![0; TILE_CELL_SIZE],
            children: 0,
            mask: Mask::Uniform(0),
        }
    }

    /// Create a tile from raw float heights in row-major order
    pub fn from_raster_heights(coord: TileCoordinate, raster_heights: &[f32]) -> TerrainTile {
        debug_assert_eq!(raster_heights.len(), TILE_CELL_SIZE);
        let mut tile = TerrainTile::new(coord);
        for (cell, height) in tile.heights.iter_mut().zip(raster_heights) {
            *cell = quantize_height(*height);
        }
        tile
    }

    pub fn heights(&self) -> &[i16] {
        &self.heights
    }

    pub fn heights_mut(&mut self) -> &mut [i16] {
        &mut self.heights
    }

    pub fn child_flags(&self) -> u8 {
        self.children
    }

    pub fn set_child_flags(&mut self, children: u8) {
        self.children = children;
    }

    pub fn has_children(&self) -> bool {
        self.children != 0
    }

    pub fn set_all_children(&mut self, on: bool) {
        self.children = if on {
            CHILD_SW | CHILD_SE | CHILD_NW | CHILD_NE
        } else {
            0
        };
    }

    pub fn set_is_water(&mut self) {
        self.mask = Mask::Uniform(1);
    }

    pub fn set_is_land(&mut self) {
        self.mask = Mask::Uniform(0);
    }

    pub fn is_water(&self) -> bool {
        self.mask == Mask::Uniform(1)
    }

    pub fn is_land(&self) -> bool {
        self.mask == Mask::Uniform(0)
    }

    pub fn has_water_mask(&self) -> bool {
        match self.mask {
            Mask::Full(_) => true,
            Mask::Uniform(_) => false,
        }
    }

    pub fn set_water_mask(&mut self, mask: Box<[u8]>) {
        debug_assert_eq!(mask.len(), MASK_CELL_SIZE);
        self.mask = Mask::Full(mask);
    }

    /// Write the raw uncompressed tile data
    pub fn write_to(&self, out: &mut dyn Write) -> TilerResult<()> {
        for height in &self.heights {
            out.write_i16::<LittleEndian>(*height)?;
        }
        out.write_u8(self.children)?;
        match &self.mask {
            Mask::Uniform(value) => out.write_u8(*value)?,
            Mask::Full(mask) => out.write_all(mask)?,
        }
        Ok(())
    }

    /// Write the gzip compressed tile data
    pub fn write_gz_to(&self, out: &mut dyn Write) -> TilerResult<()> {
        let mut gz = GzEncoder::new(out, Compression::default());
        self.write_to(&mut gz)?;
        gz.finish()
            .map_err(|e| TilerError::Compress(format!("gzip finalize failed: {}", e)))?;
        Ok(())
    }

    /// Encode the tile as a gzip compressed byte vector
    pub fn to_gz_bytes(&self) -> TilerResult<Vec<u8>> {
        let mut data = Vec::with_capacity(TILE_CELL_SIZE);
        self.write_gz_to(&mut data)?;
        Ok(data)
    }

    /// Read a gzip compressed tile
    ///
    /// Only the two legal payload sizes are accepted: heights, child byte
    /// and either a single mask byte or a full water mask.
    pub fn read_gz_from(read: &mut dyn Read, coord: TileCoordinate) -> TilerResult<TerrainTile> {
        let mut gz = GzDecoder::new(read);
        let mut data = Vec::with_capacity(MAX_TERRAIN_SIZE);
        gz.read_to_end(&mut data)
            .map_err(|e| TilerError::Compress(format!("gzip inflate failed: {}", e)))?;

        let mask_len = match data.len() {
            len if len == TILE_CELL_SIZE * 2 + 2 => 1,
            len if len == MAX_TERRAIN_SIZE => MASK_CELL_SIZE,
            len => {
                return Err(TilerError::Compress(format!(
                    "wrong payload size {} for a terrain tile",
                    len
                )))
            }
        };

        let mut tile = TerrainTile::new(coord);
        let mut heights = &data[..TILE_CELL_SIZE * 2];
        for cell in tile.heights.iter_mut() {
            *cell = heights.read_i16::<LittleEndian>()?;
        }
        tile.children = data[TILE_CELL_SIZE * 2];
        tile.mask = if mask_len == 1 {
            Mask::Uniform(data[TILE_CELL_SIZE * 2 + 1])
        } else {
            Mask::Full(data[TILE_CELL_SIZE * 2 + 1..].to_vec().into_boxed_slice())
        };
        Ok(tile)
    }
}
