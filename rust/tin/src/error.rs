use thiserror::Error;

/// Result type for TIN operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or transforming terrain meshes
#[derive(Error, Debug)]
pub enum Error {
    #[error("Bad geometry: {0}")]
    BadGeometry(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Duplicate points: {0}")]
    DuplicatePoints(String),

    #[error("Numerical issue: {0}")]
    NumericalIssue(String),

    #[error("Invalid raster data: {0}")]
    InvalidRaster(String),

    #[error("Raster read failed: {0}")]
    Io(#[from] std::io::Error),
}
