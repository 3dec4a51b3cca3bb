//
// Copyright (c) Pirmin Kalberer. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.
//

//! Error kinds shared by the whole pipeline

use std::io;
use thiserror::Error;

/// Failure point of a raster window extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowErrorKind {
    NoGeotransform,
    NoSourceSrs,
    SrsValidationFailed,
    TransformSetupFailed,
    WarpSetupFailed,
    ReadFailed,
}

#[derive(Error, Debug)]
pub enum TilerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("source dataset error: {0}")]
    Source(String),
    #[error("coordinate transform error: {0}")]
    Transform(String),
    #[error("raster window error ({kind:?}): {message}")]
    Window {
        kind: WindowErrorKind,
        message: String,
    },
    #[error("encoding invariant violated: {0}")]
    Encode(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("compression error: {0}")]
    Compress(String),
}

impl TilerError {
    pub fn window(kind: WindowErrorKind, message: impl Into<String>) -> TilerError {
        TilerError::Window {
            kind,
            message: message.into(),
        }
    }
}

pub type TilerResult<T> = Result<T, TilerError>;
