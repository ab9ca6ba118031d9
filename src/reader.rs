//! Reader abstraction shared by every file format
//!
//! A [`ReaderFormat`] is the "reader class": it recognises files and opens
//! them. The [`ImageReader`] it returns describes one image (dimension order,
//! shape, channel names) and serves rectangular regions as `f32` arrays. Lazy
//! access, casting and stacking live in [`crate::lazy`]; readers only read.

use crate::dimensions::{Dimension, DimensionOrder};
use crate::errors::{Result, StackReaderError};
use ndarray::ArrayD;
use std::fmt::Debug;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

/// One opened image
pub trait ImageReader: Send + Sync + Debug {
    /// Axis names, one per entry of [`ImageReader::shape`]
    fn dims(&self) -> &DimensionOrder;

    /// Full array shape
    fn shape(&self) -> &[usize];

    /// Dimensions along which a chunk spans the whole axis; every other axis
    /// is chunked with length one.
    fn chunk_by(&self) -> &[Dimension];

    /// Read `region` (one range per axis) as `f32`
    fn read_region(&self, region: &[Range<usize>]) -> Result<ArrayD<f32>>;

    /// Channel names, in channel-axis order
    ///
    /// The default numbers the channels `"0"`, `"1"`, ...
    fn channel_names(&self) -> Result<Vec<String>> {
        Ok(default_channel_names(self.dims(), self.shape()))
    }

    /// Read the whole array
    fn read_all(&self) -> Result<ArrayD<f32>> {
        self.read_region(&full_region(self.shape()))
    }
}

/// A file format that can recognise and open images
pub trait ReaderFormat: Send + Sync + Debug {
    /// Unique identifier (e.g. "zarr", "npy")
    fn name(&self) -> &'static str;

    /// Priority for format detection (higher = probed first)
    fn priority(&self) -> i32 {
        0
    }

    /// Cheap check whether `path` looks like this format. Must not fail;
    /// unreadable paths are simply not this type.
    fn is_this_type(&self, path: &Path) -> bool;

    /// Open `path`, chunking lazily along `chunk_by`
    fn open(&self, path: &Path, chunk_by: &[Dimension]) -> Result<Arc<dyn ImageReader>>;
}

/// `["0", "1", ...]` for the size of the channel axis, or empty if there is none
pub fn default_channel_names(dims: &DimensionOrder, shape: &[usize]) -> Vec<String> {
    dims.index_of(Dimension::Channel)
        .and_then(|axis| shape.get(axis))
        .map(|&size_c| (0..size_c).map(|i| i.to_string()).collect())
        .unwrap_or_default()
}

/// Region covering the whole of `shape`
pub fn full_region(shape: &[usize]) -> Vec<Range<usize>> {
    shape.iter().map(|&len| 0..len).collect()
}

/// Validate a region against a shape
pub fn check_region(region: &[Range<usize>], shape: &[usize]) -> Result<()> {
    let fits = region.len() == shape.len()
        && region
            .iter()
            .zip(shape)
            .all(|(r, &len)| r.start <= r.end && r.end <= len);
    if fits {
        Ok(())
    } else {
        Err(StackReaderError::RegionOutOfBounds {
            region: region.to_vec(),
            shape: shape.to_vec(),
        })
    }
}

/// Copy `region` out of an in-memory array
pub fn slice_region(data: &ArrayD<f32>, region: &[Range<usize>]) -> Result<ArrayD<f32>> {
    check_region(region, data.shape())?;
    Ok(data
        .slice_each_axis(|ax| region[ax.axis.index()].clone().into())
        .to_owned())
}

/// Chunk shape for a reader: full length on `chunk_by` axes, one elsewhere
pub fn chunk_shape(dims: &DimensionOrder, shape: &[usize], chunk_by: &[Dimension]) -> Vec<usize> {
    dims.as_slice()
        .iter()
        .zip(shape)
        .map(|(d, &len)| if chunk_by.contains(d) { len } else { len.min(1) })
        .collect()
}
