//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

use crate::errors::TilerResult;
use crate::store::store::TileStore;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tile_grid::TileCoordinate;

lazy_static! {
    // Sibling tiles race on creating the same `{zoom}/{x}` directory.
    static ref DIR_MUTEX: Mutex<()> = Mutex::new(());
}

/// Stores tiles as `{basepath}/{zoom}/{x}/{y}.{extension}` files
///
/// Tiles are written to a temporary file first and moved into place with an
/// atomic rename, so readers never observe partially written tiles. In
/// resume mode coordinates whose tile file already exists are skipped.
#[derive(Clone)]
pub struct FileStore {
    pub basepath: PathBuf,
    pub extension: String,
    pub resume: bool,
}

impl FileStore {
    pub fn new(basepath: &Path, extension: &str, resume: bool) -> FileStore {
        FileStore {
            basepath: basepath.to_path_buf(),
            extension: extension.to_string(),
            resume,
        }
    }

    /// Target file of a tile coordinate
    pub fn tile_path(&self, coord: &TileCoordinate) -> PathBuf {
        self.basepath
            .join(coord.zoom.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.{}", coord.y, self.extension))
    }

    /// Target file of a tile coordinate with its `{zoom}/{x}` directories
    /// created
    pub fn prepare_path(&self, coord: &TileCoordinate) -> TilerResult<PathBuf> {
        let path = self.tile_path(coord);
        let _lock = DIR_MUTEX.lock().unwrap();
        fs::create_dir_all(path.parent().unwrap())?;
        Ok(path)
    }

    /// Move a finished temporary file onto its target path
    pub fn commit(&self, temp_path: &Path, path: &Path) -> TilerResult<()> {
        fs::rename(temp_path, path)?;
        Ok(())
    }
}

impl TileStore for FileStore {
    fn must_serialize(&self, coord: &TileCoordinate) -> bool {
        !self.resume || !self.tile_path(coord).exists()
    }

    fn serialize_tile(&self, coord: &TileCoordinate, data: &[u8]) -> TilerResult<()> {
        let path = self.prepare_path(coord)?;
        let temp_path = path.with_extension(format!("{}.tmp", self.extension));
        debug!("FileStore.write {}", path.display());
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        drop(file);
        self.commit(&temp_path, &path)
    }
}
