//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! Chunked LOD reduction of a regular height grid
//!
//! A `HeightField` assigns an activation level to every vertex of a
//! `(2^k)+1` square grid by running a Lindstrom-Koller style binary
//! triangle tree update against a maximum geometric error, then walks the
//! grid as a single triangle strip emitting only the vertices that are
//! active at the requested level. The strategy is the one described by
//! Thatcher Ulrich's chunked LOD article; activation levels of neighbouring
//! tiles can be imported along a border to keep meshes crack free.

use tile_grid::{Grid, TileCoordinate};

/// West, north, east and south tile borders
pub const BORDER_WEST: usize = 0;
pub const BORDER_NORTH: usize = 1;
pub const BORDER_EAST: usize = 2;
pub const BORDER_SOUTH: usize = 3;

/// Receiver for vertices emitted in triangle strip order
pub trait MeshSink {
    /// Drop all collected data
    fn clear(&mut self);
    /// Add the grid vertex at (x, y) to the strip
    fn emit_vertex(&mut self, heightfield: &HeightField, x: i32, y: i32);
}

/// State of the strip walk: the last two emitted vertices plus the
/// recursion parity needed to decide between turning a corner and emitting
/// a degenerate join.
struct GenState {
    buffer: [[i32; 2]; 2],
    activation_level: i32,
    ptr: usize,
    previous_level: i32,
}

impl GenState {
    fn in_buffer(&self, x: i32, y: i32) -> bool {
        (x == self.buffer[0][0] && y == self.buffer[0][1])
            || (x == self.buffer[1][0] && y == self.buffer[1][1])
    }

    fn set_buffer(&mut self, x: i32, y: i32) {
        self.buffer[self.ptr][0] = x;
        self.buffer[self.ptr][1] = y;
    }
}

/// A regular grid of heights with per vertex activation levels
///
/// Activation levels are nibble packed: each cell owns one byte whose low
/// nibble is used for even x columns and whose high nibble is used for odd
/// x columns. The value 0xF marks an unset level.
pub struct HeightField {
    size: i32,
    log_size: i32,
    heights: Vec<f32>,
    levels: Vec<u8>,
}

impl HeightField {
    /// Wrap a square grid of heights. `size` must be a power of two plus
    /// one (e.g. 65).
    pub fn new(heights: Vec<f32>, size: usize) -> HeightField {
        debug_assert_eq!(heights.len(), size * size);
        debug_assert!((size - 1).is_power_of_two());
        let log_size = ((size - 1) as f32).log2().round() as i32;
        HeightField {
            size: size as i32,
            log_size,
            heights,
            levels: vec![0xFF; size * size],
        }
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    /// Array index of a grid coordinate, row major
    pub fn index_of(&self, x: i32, y: i32) -> usize {
        (y * self.size + x) as usize
    }

    /// Height of a grid coordinate
    pub fn height(&self, x: i32, y: i32) -> f32 {
        self.heights[self.index_of(x, y)]
    }

    /// Fill the activation level info of the grid for a maximum geometric
    /// error
    ///
    /// `smooth_small_zooms` additionally activates a coarse regular lattice
    /// so that low zoom tiles keep the curvature of the globe.
    pub fn apply_geometric_error(&mut self, max_error: f64, smooth_small_zooms: bool) {
        for level in self.levels.iter_mut() {
            *level = 0xFF;
        }

        // View independent L-K style BTT update over both halves of the
        // square, assigning an activation level to every base vertex whose
        // error exceeds the budget.
        let size = self.size - 1;
        self.update(max_error, size, 0, size, size, 0, 0);
        self.update(max_error, 0, size, 0, 0, size, size);

        // Corner verts are always active.
        self.activate(size, 0, 0);
        self.activate(0, 0, 0);
        self.activate(0, size, 0);
        self.activate(size, size, 0);

        if smooth_small_zooms {
            let step = (size / 16).max(1);
            let mut x = 0;
            while x <= size {
                let mut y = 0;
                while y <= size {
                    if self.get_level(x, y).is_none() {
                        self.activate(x, y, 0);
                    }
                    y += step;
                }
                x += step;
            }
        }

        self.propagate();
    }

    /// Tile coordinate of the neighbour across the given border, or `None`
    /// at the edge of the grid
    pub fn neighbor_coord(
        grid: &Grid,
        coord: &TileCoordinate,
        border: usize,
    ) -> Option<TileCoordinate> {
        let limit = grid.tile_extent(coord.zoom);
        match border {
            BORDER_WEST if coord.x > 0 => {
                Some(TileCoordinate::new(coord.zoom, coord.x - 1, coord.y))
            }
            BORDER_NORTH if coord.y < limit.maxy => {
                Some(TileCoordinate::new(coord.zoom, coord.x, coord.y + 1))
            }
            BORDER_EAST if coord.x < limit.maxx => {
                Some(TileCoordinate::new(coord.zoom, coord.x + 1, coord.y))
            }
            BORDER_SOUTH if coord.y > 0 => {
                Some(TileCoordinate::new(coord.zoom, coord.x, coord.y - 1))
            }
            _ => None,
        }
    }

    /// Import the activation state of the facing border of a neighbour
    ///
    /// The neighbour's east column feeds this field's west column and so
    /// on. Activation levels are then re-propagated.
    pub fn apply_border_activation(&mut self, neighbor: &HeightField, border: usize) {
        let size = self.size;
        match border {
            BORDER_WEST => {
                for y in 0..size {
                    if let Some(level) = neighbor.get_level(size - 1, y) {
                        self.activate(0, y, level);
                    }
                }
            }
            BORDER_NORTH => {
                for x in 0..size {
                    if let Some(level) = neighbor.get_level(x, size - 1) {
                        self.activate(x, 0, level);
                    }
                }
            }
            BORDER_EAST => {
                for y in 0..size {
                    if let Some(level) = neighbor.get_level(0, y) {
                        self.activate(size - 1, y, level);
                    }
                }
            }
            BORDER_SOUTH => {
                for x in 0..size {
                    if let Some(level) = neighbor.get_level(x, 0) {
                        self.activate(x, size - 1, level);
                    }
                }
            }
            _ => unreachable!("bad neighbor border index"),
        }

        self.propagate();
    }

    /// Generate the mesh using verts which are active at the given level
    pub fn generate_mesh(&mut self, sink: &mut dyn MeshSink, level: i32) {
        let size = 1 << self.log_size;
        let half_size = size >> 1;

        sink.clear();

        // Corner verts must be active on the requested level as well.
        self.activate(size, 0, level);
        self.activate(0, 0, level);
        self.activate(0, size, level);
        self.activate(size, size, level);

        self.generate_block(sink, level, self.log_size, half_size, half_size);
    }

    /// Activation level at (x, y), `None` when unset
    pub fn get_level(&self, x: i32, y: i32) -> Option<i32> {
        let mut level = self.levels[self.index_of(x, y)] as i32;
        if x & 1 == 1 {
            level >>= 4;
        }
        level &= 0x0F;
        if level == 0x0F {
            None
        } else {
            Some(level)
        }
    }

    fn set_level(&mut self, x: i32, y: i32, new_level: i32) {
        let new_level = (new_level & 0x0F) as u8;
        let index = self.index_of(x, y);
        let level = self.levels[index];
        self.levels[index] = if x & 1 == 1 {
            (level & 0x0F) | (new_level << 4)
        } else {
            (level & 0xF0) | new_level
        };
    }

    /// Raise the activation level of (x, y) to `level` if it is higher than
    /// the current one
    fn activate(&mut self, x: i32, y: i32, level: i32) {
        let current = self.get_level(x, y).unwrap_or(-1);
        if level > current {
            self.set_level(x, y, level);
        }
    }

    fn activate_opt(&mut self, x: i32, y: i32, level: Option<i32>) {
        if let Some(level) = level {
            self.activate(x, y, level);
        }
    }

    /// Given the triangle (apex, right, left), computes an error value and
    /// activation level for its base vertex, and recurses to child
    /// triangles.
    fn update(&mut self, base_max_error: f64, ax: i32, ay: i32, rx: i32, ry: i32, lx: i32, ly: i32) {
        let dx = lx - rx;
        let dy = ly - ry;

        if dx.abs() <= 1 && dy.abs() <= 1 {
            // Base level reached, no base vertex to update.
            return;
        }

        // Base vert is midway between left and right verts.
        let bx = rx + (dx >> 1);
        let by = ry + (dy >> 1);

        let height_b = self.height(bx, by) as f64;
        let height_l = self.height(lx, ly) as f64;
        let height_r = self.height(rx, ry) as f64;
        let error_b = (height_b - 0.5 * (height_l + height_r)).abs();

        if error_b >= base_max_error {
            // The mesh level above which this vertex needs to be included
            // in LOD meshes.
            let activation_level = (error_b / base_max_error).log2() + 0.5;
            self.activate(bx, by, activation_level.floor() as i32);
        }

        self.update(base_max_error, bx, by, ax, ay, rx, ry); // base, apex, right
        self.update(base_max_error, bx, by, lx, ly, ax, ay); // base, left, apex
    }

    /// Propagate the activation level values of verts to their parent
    /// verts, quadtree LOD style. Gives the same result as L-K.
    fn propagate(&mut self) {
        for target in 0..self.log_size {
            self.propagate_activation_level(
                self.size >> 1,
                self.size >> 1,
                self.log_size - 1,
                target,
            );
        }
    }

    /// Quadtree descent through the heightfield, propagating this square's
    /// child center verts to the corresponding edge verts, and the edge
    /// verts to the center. Must be called with successively increasing
    /// target levels.
    fn propagate_activation_level(&mut self, cx: i32, cy: i32, level: i32, target_level: i32) {
        let half_size = 1 << level;
        let quarter_size = half_size >> 1;

        if level > target_level {
            for j in 0..2 {
                for i in 0..2 {
                    self.propagate_activation_level(
                        cx - quarter_size + half_size * i,
                        cy - quarter_size + half_size * j,
                        level - 1,
                        target_level,
                    );
                }
            }
            return;
        }

        if level > 0 {
            // Propagate child verts to edge verts.
            let lev = self.get_level(cx + quarter_size, cy - quarter_size); // ne
            self.activate_opt(cx + half_size, cy, lev);
            self.activate_opt(cx, cy - half_size, lev);

            let lev = self.get_level(cx - quarter_size, cy - quarter_size); // nw
            self.activate_opt(cx, cy - half_size, lev);
            self.activate_opt(cx - half_size, cy, lev);

            let lev = self.get_level(cx - quarter_size, cy + quarter_size); // sw
            self.activate_opt(cx - half_size, cy, lev);
            self.activate_opt(cx, cy + half_size, lev);

            let lev = self.get_level(cx + quarter_size, cy + quarter_size); // se
            self.activate_opt(cx, cy + half_size, lev);
            self.activate_opt(cx + half_size, cy, lev);
        }

        // Propagate edge verts to center.
        let lev = self.get_level(cx + half_size, cy);
        self.activate_opt(cx, cy, lev);
        let lev = self.get_level(cx, cy - half_size);
        self.activate_opt(cx, cy, lev);
        let lev = self.get_level(cx, cy + half_size);
        self.activate_opt(cx, cy, lev);
        let lev = self.get_level(cx - half_size, cy);
        self.activate_opt(cx, cy, lev);
    }

    /// Generate a mesh from a triangular quadrant of a square heightfield
    /// block. Paraphrased directly out of Lindstrom et al, SIGGRAPH '96.
    fn generate_quadrant(
        &self,
        sink: &mut dyn MeshSink,
        state: &mut GenState,
        lx: i32,
        ly: i32,
        tx: i32,
        ty: i32,
        rx: i32,
        ry: i32,
        recursion_level: i32,
    ) {
        if recursion_level <= 0 {
            return;
        }

        if self.get_level(tx, ty).unwrap_or(-1) >= state.activation_level {
            // Find base vertex.
            let bx = (lx + rx) >> 1;
            let by = (ly + ry) >> 1;

            // left half of quadrant
            self.generate_quadrant(sink, state, lx, ly, bx, by, tx, ty, recursion_level - 1);

            if !state.in_buffer(tx, ty) {
                if (recursion_level + state.previous_level) & 1 == 1 {
                    state.ptr ^= 1;
                } else {
                    let x = state.buffer[1 - state.ptr][0];
                    let y = state.buffer[1 - state.ptr][1];
                    sink.emit_vertex(self, x, y);
                }
                sink.emit_vertex(self, tx, ty);
                state.set_buffer(tx, ty);
                state.previous_level = recursion_level;
            }

            // right half of quadrant
            self.generate_quadrant(sink, state, tx, ty, bx, by, rx, ry, recursion_level - 1);
        }
    }

    /// Generate the mesh for the whole square block by walking its four
    /// triangular quadrants counterclockwise. The result is a single
    /// continuous triangle strip, with a few corners turned via degenerate
    /// tris where necessary.
    fn generate_block(
        &self,
        sink: &mut dyn MeshSink,
        activation_level: i32,
        log_size: i32,
        cx: i32,
        cy: i32,
    ) {
        let hs = 1 << (log_size - 1);

        // quadrant corner coordinates
        let q: [[i32; 2]; 4] = [
            [cx + hs, cy + hs], // se
            [cx + hs, cy - hs], // ne
            [cx - hs, cy - hs], // nw
            [cx - hs, cy + hs], // sw
        ];

        let mut state = GenState {
            buffer: [[-1, -1], [-1, -1]],
            activation_level,
            ptr: 0,
            previous_level: 0,
        };

        sink.emit_vertex(self, q[0][0], q[0][1]);
        state.set_buffer(q[0][0], q[0][1]);

        for i in 0..4 {
            if state.previous_level & 1 == 0 {
                // turn a corner
                state.ptr ^= 1;
            } else {
                // jump via degenerate
                let x = state.buffer[1 - state.ptr][0];
                let y = state.buffer[1 - state.ptr][1];
                sink.emit_vertex(self, x, y);
            }

            // Initial vertex of quadrant.
            sink.emit_vertex(self, q[i][0], q[i][1]);
            state.set_buffer(q[i][0], q[i][1]);
            state.previous_level = 2 * log_size + 1;

            self.generate_quadrant(
                sink,
                &mut state,
                q[i][0],
                q[i][1],
                cx,
                cy,
                q[(i + 1) & 3][0],
                q[(i + 1) & 3][1],
                2 * log_size,
            );
        }
        if !state.in_buffer(q[0][0], q[0][1]) {
            // finish off the strip
            sink.emit_vertex(self, q[0][0], q[0][1]);
        }
    }
}
