//! stack_reader: a multi-dimensional image reader plugin for viewers
//!
//! Given one path or a list of paths, stack_reader decides whether it can read
//! them, loads each file (in parallel on a short-lived worker pool), casts the
//! data to half-precision floats, drops axes of length one and stacks every
//! file along a new leading axis. Alongside the array it reports where the
//! channel axis sits and what the channels are called, so a viewer can split
//! channels into separate layers.
//!
//! ## Key Features
//!
//! - **Format Detection**: Zarr v2 stores, NetCDF, NumPy `.npy`, PNG and TIFF
//! - **Parallel Loading**: One task per file on a scoped Rayon pool
//! - **Lazy Access**: Plane-chunked arrays that only read what is requested
//! - **Viewer Metadata**: Channel axis and channel names, shifted for the stack
//!
//! ## Module Organization
//!
//! - [`plugin`]: capability probe, per-path load and load orchestration
//! - [`hooks`]: in-memory and out-of-memory entry points for the host
//! - [`registry`]: ordered format registry and format detection
//! - [`reader`]: reader traits shared by every format
//! - [`formats`]: the built-in formats
//! - [`lazy`]: deferred arrays, casting and stacking
//! - [`cluster`]: transient worker pools with map/gather
//! - [`dimensions`]: dimension letters and orderings
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stack_reader::prelude::*;
//!
//! // Ask whether the first file is readable
//! let reader = hooks::in_memory::get_reader(vec!["t0.zarr", "t1.zarr"])
//!     .expect("no reader for this format");
//!
//! // Load both stores into one array
//! let layers = reader.read(vec!["t0.zarr", "t1.zarr"]).unwrap();
//! let (data, meta) = &layers[0];
//! println!("shape {:?}, channel axis {:?}", data.shape(), meta.channel_axis);
//! ```

pub mod cluster;
pub mod dimensions;
pub mod errors;
pub mod formats;
pub mod hooks;
pub mod lazy;
pub mod plugin;
pub mod reader;
pub mod registry;

pub use errors::{Result, StackReaderError};
pub use plugin::{
    get_reader, get_reader_with, load_image, reader_function, reader_function_with, LayerData,
    LayerMetadata, LoadResult, PathSet, ReaderFunction, ReaderOptions,
};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::dimensions::{Dimension, DimensionOrder};
    pub use crate::errors::{Result, StackReaderError};
    pub use crate::hooks;
    pub use crate::lazy::{LayerArray, LazyImage, LazyStack};
    pub use crate::plugin::{get_reader, LayerData, LayerMetadata, PathSet, ReaderFunction};
    pub use crate::reader::{ImageReader, ReaderFormat};
    pub use crate::registry::ReaderRegistry;
}
