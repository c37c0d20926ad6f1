use thiserror::Error;

/// Result type for model assembly
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while assembling an IFC entity graph
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}
