//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

use crate::errors::TilerResult;
use tile_grid::TileCoordinate;

/// Sink for encoded terrain tiles
pub trait TileStore {
    /// Should a tile for this coordinate be produced?
    fn must_serialize(&self, coord: &TileCoordinate) -> bool;
    /// Persist an encoded tile
    fn serialize_tile(&self, coord: &TileCoordinate, data: &[u8]) -> TilerResult<()>;
    /// Flush any pending state
    fn finish(&self) -> TilerResult<()> {
        Ok(())
    }
}
