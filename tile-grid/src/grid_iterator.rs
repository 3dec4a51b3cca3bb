//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! Grid iterators

use crate::grid::{Extent, Grid, TileCoordinate, TileExtent};

/// Iterator over the tiles of a pyramid, from a start zoom level down to an
/// end zoom level
///
/// Within each zoom level the columns covering the filter extent are visited
/// from west to east with y as the inner loop, starting at the lower left
/// corner.
pub struct GridIterator<'a> {
    grid: &'a Grid,
    extent: Extent,
    end_zoom: u8,
    current: TileCoordinate,
    bounds: TileExtent,
    start_zoom: u8,
    finished: bool,
}

impl<'a> GridIterator<'a> {
    pub fn new(grid: &'a Grid, extent: Extent, start_zoom: u8, end_zoom: u8) -> GridIterator<'a> {
        if start_zoom >= end_zoom {
            let bounds = grid.tile_extent_of(&extent, start_zoom);
            let current = TileCoordinate::new(start_zoom, bounds.minx, bounds.miny);
            GridIterator {
                grid,
                extent,
                end_zoom,
                current,
                bounds,
                start_zoom,
                finished: false,
            }
        } else {
            // Return "empty" iterator for invalid parameters
            GridIterator {
                grid,
                extent,
                end_zoom,
                current: TileCoordinate::new(0, 0, 0),
                bounds: TileExtent {
                    minx: 0,
                    miny: 0,
                    maxx: 0,
                    maxy: 0,
                },
                start_zoom,
                finished: true,
            }
        }
    }

    /// Total number of tiles this iterator will visit
    pub fn size(&self) -> u64 {
        (self.end_zoom..=self.start_zoom)
            .map(|zoom| self.grid.tile_extent_of(&self.extent, zoom).len())
            .sum()
    }
}

impl<'a> Iterator for GridIterator<'a> {
    type Item = TileCoordinate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let current = self.current;
        if self.current.y < self.bounds.maxy {
            self.current.y += 1;
        } else if self.current.x < self.bounds.maxx {
            self.current.x += 1;
            self.current.y = self.bounds.miny;
        } else if self.current.zoom > self.end_zoom {
            self.current.zoom -= 1;
            self.bounds = self.grid.tile_extent_of(&self.extent, self.current.zoom);
            self.current.x = self.bounds.minx;
            self.current.y = self.bounds.miny;
        } else {
            self.finished = true;
        }
        Some(current)
    }
}

#[test]
fn test_mercator_iter() {
    let grid = Grid::mercator(256);
    let griditer = GridIterator::new(&grid, grid.extent.clone(), 1, 0);
    let cells = griditer
        .map(|c| (c.zoom, c.x, c.y))
        .collect::<Vec<_>>();
    assert_eq!(
        cells,
        vec![(1, 0, 0), (1, 0, 1), (1, 1, 0), (1, 1, 1), (0, 0, 0)]
    );

    let griditer = GridIterator::new(&grid, grid.extent.clone(), 1, 0);
    assert_eq!(griditer.size(), 5);

    let griditer = GridIterator::new(&grid, grid.extent.clone(), 0, 0);
    let cells = griditer.map(|c| (c.zoom, c.x, c.y)).collect::<Vec<_>>();
    assert_eq!(cells, vec![(0, 0, 0)]);
}

#[test]
fn test_geodetic_iter() {
    let grid = Grid::geodetic(65);
    let griditer = GridIterator::new(&grid, grid.extent.clone(), 1, 0);
    let cells = griditer.map(|c| (c.zoom, c.x, c.y)).collect::<Vec<_>>();
    assert_eq!(
        cells,
        vec![
            (1, 0, 0),
            (1, 0, 1),
            (1, 1, 0),
            (1, 1, 1),
            (1, 2, 0),
            (1, 2, 1),
            (1, 3, 0),
            (1, 3, 1),
            (0, 0, 0),
            (0, 1, 0),
        ]
    );
}

#[test]
fn test_extent_filter() {
    // A sub extent in the north east geodetic quadrant
    let grid = Grid::geodetic(65);
    let extent = Extent::new(10.0, 10.0, 50.0, 40.0);
    let griditer = GridIterator::new(&grid, extent.clone(), 2, 1);
    let cells = griditer.map(|c| (c.zoom, c.x, c.y)).collect::<Vec<_>>();
    assert_eq!(
        cells,
        vec![
            (2, 4, 2),
            (2, 5, 2),
            (1, 2, 1),
        ]
    );

    let griditer = GridIterator::new(&grid, extent, 2, 1);
    assert_eq!(griditer.size(), 3);
}

#[test]
fn test_bad_params() {
    // start zoom below end zoom
    let grid = Grid::mercator(256);
    let griditer = GridIterator::new(&grid, grid.extent.clone(), 2, 3);
    let cells = griditer.collect::<Vec<_>>();
    assert_eq!(cells, vec![]);
}
