//! A library for terrain tile grid calculations
//!
//! ## Predefined grids
//!
//! ```rust
//! use tile_grid::{Grid, TileCoordinate};
//!
//! let grid = Grid::geodetic(65);
//! assert_eq!(grid.crs_to_tile(-90.0, 0.0, 1), TileCoordinate::new(1, 1, 1));
//! ```
//!
//! ## Grid iterators
//!
//! ```rust
//! use tile_grid::{Grid, GridIterator};
//!
//! let grid = Grid::mercator(256);
//! let griditer = GridIterator::new(&grid, grid.extent.clone(), 2, 0);
//! for coord in griditer {
//!     println!("Tile {}/{}/{}", coord.zoom, coord.x, coord.y);
//! }
//! ```

mod grid;
mod grid_iterator;

pub use grid::{Extent, Grid, TileCoordinate, TileExtent};
pub use grid_iterator::GridIterator;
