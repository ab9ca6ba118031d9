//! Centralized error handling for stack_reader
//!
//! A single error enum covers every reader, the worker pool and the stacking
//! step. The capability probe turns detection failures into "no reader",
//! [`StackReaderError::UnsupportedFileFormat`] being the expected one; the
//! loader itself passes every error through to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for stack_reader operations
#[derive(Debug, Error)]
pub enum StackReaderError {
    /// No registered reader claims the path
    #[error("No reader supports the file format of '{}'", path.display())]
    UnsupportedFileFormat { path: PathBuf },

    /// A path list with no entries was handed to the loader
    #[error("No paths were provided")]
    EmptyPathSet,

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// NPY decoding errors
    #[error("NPY error: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),

    /// Raster image decoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Malformed JSON metadata
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zarr store layout or metadata problems
    #[error("Zarr error: {0}")]
    Zarr(String),

    /// Dimension ordering could not be parsed or does not match the data
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Requested region does not fit inside the array
    #[error("Region {region:?} is out of bounds for shape {shape:?}")]
    RegionOutOfBounds {
        region: Vec<std::ops::Range<usize>>,
        shape: Vec<usize>,
    },

    /// Per-path arrays cannot be stacked
    #[error("Cannot stack image {index}: expected shape {expected:?}, found {found:?}")]
    StackShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// A worker went away before reporting its result
    #[error("Worker lost: gathered {received} of {expected} results")]
    WorkerLost { expected: usize, received: usize },

    /// Catch-all for messages without a dedicated variant
    #[error("{0}")]
    Generic(String),
}

impl From<String> for StackReaderError {
    fn from(error: String) -> Self {
        StackReaderError::Generic(error)
    }
}

impl From<&str> for StackReaderError {
    fn from(error: &str) -> Self {
        StackReaderError::Generic(error.to_string())
    }
}

impl StackReaderError {
    /// True when no registered reader claims the path
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, StackReaderError::UnsupportedFileFormat { .. })
    }
}

/// Result type alias for stack_reader operations
pub type Result<T> = std::result::Result<T, StackReaderError>;
