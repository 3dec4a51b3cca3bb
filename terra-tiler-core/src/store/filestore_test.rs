//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

use crate::store::{FileStore, TileStore};
use std::fs;
use std::path::Path;
use tile_grid::TileCoordinate;

#[test]
fn test_file_store() {
    let mut dir = std::env::temp_dir();
    dir.push("terra_tiler_store_test");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();

    let store = FileStore::new(&dir, "terrain", false);
    let coord = TileCoordinate::new(3, 4, 5);
    assert_eq!(
        store.tile_path(&coord),
        dir.join("3").join("4").join("5.terrain")
    );

    assert!(store.must_serialize(&coord));
    store.serialize_tile(&coord, b"0123456789").unwrap();
    let path = store.tile_path(&coord);
    assert!(path.exists());
    assert_eq!(fs::read(&path).unwrap(), b"0123456789");
    // no temporary file left behind
    assert!(!Path::new(&path.with_extension("terrain.tmp")).exists());

    // without resume existing files are overwritten
    assert!(store.must_serialize(&coord));
    store.serialize_tile(&coord, b"overwritten").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"overwritten");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_resume_skips_existing() {
    let mut dir = std::env::temp_dir();
    dir.push("terra_tiler_resume_test");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();

    let store = FileStore::new(&dir, "terrain", true);
    let coord = TileCoordinate::new(0, 0, 0);
    assert!(store.must_serialize(&coord));
    store.serialize_tile(&coord, b"tile").unwrap();
    assert!(!store.must_serialize(&coord));

    // a dangling temporary file does not block re-processing
    let other = TileCoordinate::new(0, 1, 0);
    let tmp = store.tile_path(&other).with_extension("terrain.tmp");
    fs::create_dir_all(tmp.parent().unwrap()).unwrap();
    fs::write(&tmp, b"partial").unwrap();
    assert!(store.must_serialize(&other));

    let _ = fs::remove_dir_all(&dir);
}
