//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//!Tile grids for terrain pyramids

use std::f64::consts;

/// Geographic extent as a closed box in CRS units
#[derive(PartialEq, Clone, Debug)]
pub struct Extent {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl Extent {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Extent {
        debug_assert!(minx <= maxx && miny <= maxy);
        Extent {
            minx,
            miny,
            maxx,
            maxy,
        }
    }
    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }
    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }
    pub fn lower_left(&self) -> (f64, f64) {
        (self.minx, self.miny)
    }
    pub fn upper_right(&self) -> (f64, f64) {
        (self.maxx, self.maxy)
    }
    /// Move the western edge. Fails when the result would be inverted.
    pub fn set_minx(&mut self, value: f64) -> bool {
        if value > self.maxx {
            return false;
        }
        self.minx = value;
        true
    }
    pub fn set_miny(&mut self, value: f64) -> bool {
        if value > self.maxy {
            return false;
        }
        self.miny = value;
        true
    }
    pub fn set_maxx(&mut self, value: f64) -> bool {
        if value < self.minx {
            return false;
        }
        self.maxx = value;
        true
    }
    pub fn set_maxy(&mut self, value: f64) -> bool {
        if value < self.miny {
            return false;
        }
        self.maxy = value;
        true
    }

    /// Quarter of the extent adjoining the west edge and the top row
    pub fn sw(&self) -> Extent {
        Extent::new(
            self.minx,
            self.miny + self.height() / 2.0,
            self.minx + self.width() / 2.0,
            self.maxy,
        )
    }
    /// Quarter of the extent adjoining the east edge and the top row
    pub fn se(&self) -> Extent {
        Extent::new(
            self.minx + self.width() / 2.0,
            self.miny + self.height() / 2.0,
            self.maxx,
            self.maxy,
        )
    }
    /// Quarter of the extent adjoining the west edge and the bottom row
    pub fn nw(&self) -> Extent {
        Extent::new(
            self.minx,
            self.miny,
            self.minx + self.width() / 2.0,
            self.miny + self.height() / 2.0,
        )
    }
    /// Quarter of the extent adjoining the east edge and the bottom row
    pub fn ne(&self) -> Extent {
        Extent::new(
            self.minx + self.width() / 2.0,
            self.miny,
            self.maxx,
            self.miny + self.height() / 2.0,
        )
    }

    /// Do these bounds overlap with another?
    ///
    /// Tiles share their northern and southern edge rows with their
    /// neighbours, so touching along y counts as an overlap while a bare
    /// corner contact does not.
    pub fn overlaps(&self, other: &Extent) -> bool {
        self.minx < other.maxx
            && other.minx < self.maxx
            && self.miny <= other.maxy
            && other.miny <= self.maxy
    }

    /// Grow these bounds to cover `other` as well
    pub fn expand(&mut self, other: &Extent) {
        self.minx = self.minx.min(other.minx);
        self.miny = self.miny.min(other.miny);
        self.maxx = self.maxx.max(other.maxx);
        self.maxy = self.maxy.max(other.maxy);
    }
}

/// Min and max grid cell numbers, inclusive on both ends
#[derive(PartialEq, Clone, Debug)]
pub struct TileExtent {
    pub minx: u32,
    pub miny: u32,
    pub maxx: u32,
    pub maxy: u32,
}

impl TileExtent {
    pub fn width(&self) -> u32 {
        self.maxx - self.minx
    }
    pub fn height(&self) -> u32 {
        self.maxy - self.miny
    }
    /// Number of cells covered by this extent
    pub fn len(&self) -> u64 {
        (self.width() as u64 + 1) * (self.height() as u64 + 1)
    }
}

/// A TMS tile address with its origin at the lower left of the grid
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub struct TileCoordinate {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    pub fn new(zoom: u8, x: u32, y: u32) -> TileCoordinate {
        TileCoordinate { zoom, x, y }
    }
}

/// Tile grid
///
/// Models a tiling profile for cutting an area into zoom levels and tiles.
/// It relates CRS coordinates to pixel and tile coordinates
/// (`crs_to_tile`) and tile addresses back to CRS extents (`tile_bounds`).
/// Resolutions derive from the grid extent: zoom level 0 covers the extent
/// width with `root_tiles` tiles and each level halves the resolution of
/// its parent.
#[derive(Clone, Debug)]
pub struct Grid {
    /// The width and height of an individual tile, in pixels.
    tile_size: u16,
    /// The geographical extent covered by the grid, in ground units.
    /// The (minx,miny) point defines the origin of the grid, i.e. the pixel
    /// at the bottom left of the bottom-left most tile is always placed on
    /// the (minx,miny) geographical point.
    pub extent: Extent,
    /// Spatial reference system (EPSG code).
    pub srid: i32,
    /// Number of tiles across the extent width at zoom level 0.
    root_tiles_x: u32,
    /// Number of tiles across the extent height at zoom level 0.
    root_tiles_y: u32,
    /// Ground units per pixel at zoom level 0
    initial_resolution: f64,
    x_origin_shift: f64,
    y_origin_shift: f64,
}

impl Grid {
    /// Global geodetic profile (EPSG:4326, two root tiles)
    pub fn geodetic(tile_size: u16) -> Grid {
        Grid::new(tile_size, Extent::new(-180.0, -90.0, 180.0, 90.0), 4326, 2)
    }

    /// Global spherical mercator profile (EPSG:3857)
    pub fn mercator(tile_size: u16) -> Grid {
        let origin_shift = consts::PI * 6378137.0;
        Grid::new(
            tile_size,
            Extent::new(-origin_shift, -origin_shift, origin_shift, origin_shift),
            3857,
            1,
        )
    }

    pub fn new(tile_size: u16, extent: Extent, srid: i32, root_tiles: u32) -> Grid {
        let initial_resolution = (extent.width() / root_tiles as f64) / tile_size as f64;
        let root_tiles_y =
            (extent.height() / (initial_resolution * tile_size as f64)).round() as u32;
        let x_origin_shift = extent.width() / 2.0;
        let y_origin_shift = extent.height() / 2.0;
        Grid {
            tile_size,
            extent,
            srid,
            root_tiles_x: root_tiles,
            root_tiles_y,
            initial_resolution,
            x_origin_shift,
            y_origin_shift,
        }
    }

    pub fn tile_size(&self) -> u16 {
        self.tile_size
    }

    /// Resolution in CRS units per pixel for a zoom level
    pub fn resolution(&self, zoom: u8) -> f64 {
        self.initial_resolution / f64::powi(2.0, zoom as i32)
    }

    /// Zoom level whose resolution is at least as fine as `resolution`
    ///
    /// A resolution between two levels is rounded up to the finer one.
    pub fn zoom_for_resolution(&self, resolution: f64) -> u8 {
        let zoom = (self.initial_resolution.log2() - resolution.log2()).ceil();
        if zoom < 0.0 {
            0
        } else {
            zoom as u8
        }
    }

    /// Pixel location of a CRS point at a zoom level
    pub fn crs_to_pixels(&self, x: f64, y: f64, zoom: u8) -> (f64, f64) {
        let res = self.resolution(zoom);
        (
            (self.x_origin_shift + x) / res,
            (self.y_origin_shift + y) / res,
        )
    }

    /// Tile covering a pixel location
    ///
    /// Pixel boxes are half open, so a point on the shared edge between two
    /// tiles belongs to the tile whose lower left corner it is. A small
    /// epsilon absorbs the rounding of non power-of-two tile sizes.
    pub fn pixels_to_tile(&self, px: f64, py: f64) -> (u32, u32) {
        const EPSILON: f64 = 0.0000001;
        let tx = (px / self.tile_size as f64 + EPSILON).floor();
        let ty = (py / self.tile_size as f64 + EPSILON).floor();
        (tx.max(0.0) as u32, ty.max(0.0) as u32)
    }

    /// Tile in which a CRS point falls at a zoom level
    pub fn crs_to_tile(&self, x: f64, y: f64, zoom: u8) -> TileCoordinate {
        let (px, py) = self.crs_to_pixels(x, y, zoom);
        let (tx, ty) = self.pixels_to_tile(px, py);
        TileCoordinate::new(zoom, tx, ty)
    }

    /// CRS coordinates of a pixel location at a zoom level
    pub fn pixels_to_crs(&self, px: f64, py: f64, zoom: u8) -> (f64, f64) {
        let res = self.resolution(zoom);
        (
            px * res - self.x_origin_shift,
            py * res - self.y_origin_shift,
        )
    }

    /// CRS bounds of a tile
    pub fn tile_bounds(&self, coord: &TileCoordinate) -> Extent {
        let ts = self.tile_size as f64;
        let (minx, miny) = self.pixels_to_crs(coord.x as f64 * ts, coord.y as f64 * ts, coord.zoom);
        let (maxx, maxy) = self.pixels_to_crs(
            (coord.x + 1) as f64 * ts,
            (coord.y + 1) as f64 * ts,
            coord.zoom,
        );
        Extent::new(minx, miny, maxx, maxy)
    }

    /// Valid tile index range of the whole grid at a zoom level
    pub fn tile_extent(&self, zoom: u8) -> TileExtent {
        TileExtent {
            minx: 0,
            miny: 0,
            maxx: (self.root_tiles_x << zoom) - 1,
            maxy: (self.root_tiles_y << zoom) - 1,
        }
    }

    /// Tile index range covering a CRS extent, clipped to the grid
    pub fn tile_extent_of(&self, extent: &Extent, zoom: u8) -> TileExtent {
        let limit = self.tile_extent(zoom);
        let ll = self.crs_to_tile(extent.minx, extent.miny, zoom);
        let ur = self.crs_to_tile(extent.maxx, extent.maxy, zoom);
        let minx = ll.x.min(limit.maxx);
        let miny = ll.y.min(limit.maxy);
        TileExtent {
            minx,
            miny,
            maxx: ur.x.min(limit.maxx).max(minx),
            maxy: ur.y.min(limit.maxy).max(miny),
        }
    }
}
