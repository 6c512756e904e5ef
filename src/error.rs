use std::path::PathBuf;

use thiserror::Error;

/// Engine errors for the fallible edges: file I/O, parsing, GPU setup.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse mesh {path:?} at line {line}: {reason}")]
    MeshParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("unknown script type: {0}")]
    UnknownScriptType(String),

    #[error("GPU initialization failed: {0}")]
    GpuInit(String),

    #[error("window error: {0}")]
    Window(String),

    #[error("surface lost")]
    SurfaceLost,

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
