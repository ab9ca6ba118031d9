//! Deferred, chunked array access
//!
//! [`LazyImage`] wraps an opened reader and applies the fixed output policy on
//! every read: values become `f16` and axes of length one disappear. Nothing is
//! read until [`LazyImage::get`] or [`LazyImage::compute`] is called.
//! [`LazyStack`] stacks several lazy images along a new leading axis.

use crate::errors::{Result, StackReaderError};
use crate::reader::{chunk_shape, ImageReader};
use half::f16;
use ndarray::{ArrayD, ArrayView, Axis, IxDyn};
use rayon::prelude::*;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Remove every axis of length one
pub fn squeeze<A>(array: ArrayD<A>) -> ArrayD<A> {
    let unit_axes: Vec<usize> = array
        .shape()
        .iter()
        .enumerate()
        .filter(|&(_, &len)| len == 1)
        .map(|(axis, _)| axis)
        .collect();
    drop_axes(array, &unit_axes)
}

/// Remove the given length-one axes (ascending order)
fn drop_axes<A>(mut array: ArrayD<A>, axes: &[usize]) -> ArrayD<A> {
    for &axis in axes.iter().rev() {
        array = array.index_axis_move(Axis(axis), 0);
    }
    array
}

/// A single image with deferred reads
#[derive(Clone)]
pub struct LazyImage {
    reader: Arc<dyn ImageReader>,
    raw_shape: Vec<usize>,
    chunk: Vec<usize>,
    unit_axes: Vec<usize>,
}

impl LazyImage {
    pub fn new(reader: Arc<dyn ImageReader>) -> Result<Self> {
        let raw_shape = reader.shape().to_vec();
        reader.dims().check_rank(&raw_shape)?;
        let chunk = chunk_shape(reader.dims(), &raw_shape, reader.chunk_by());
        let unit_axes = raw_shape
            .iter()
            .enumerate()
            .filter(|&(_, &len)| len == 1)
            .map(|(axis, _)| axis)
            .collect();

        Ok(Self {
            reader,
            raw_shape,
            chunk,
            unit_axes,
        })
    }

    /// Shape after squeezing
    pub fn shape(&self) -> Vec<usize> {
        self.squeezed(&self.raw_shape)
    }

    pub fn ndim(&self) -> usize {
        self.raw_shape.len() - self.unit_axes.len()
    }

    /// Shape as reported by the reader
    pub fn raw_shape(&self) -> &[usize] {
        &self.raw_shape
    }

    /// Chunk shape after squeezing
    pub fn chunk_shape(&self) -> Vec<usize> {
        self.squeezed(&self.chunk)
    }

    /// Number of chunks per raw axis
    fn chunk_grid(&self) -> Vec<usize> {
        self.raw_shape
            .iter()
            .zip(&self.chunk)
            .map(|(&len, &c)| if c == 0 { 0 } else { len.div_ceil(c) })
            .collect()
    }

    pub fn num_chunks(&self) -> usize {
        self.chunk_grid().iter().product()
    }

    pub fn reader(&self) -> &Arc<dyn ImageReader> {
        &self.reader
    }

    fn squeezed(&self, raw: &[usize]) -> Vec<usize> {
        raw.iter()
            .enumerate()
            .filter(|(axis, _)| !self.unit_axes.contains(axis))
            .map(|(_, &v)| v)
            .collect()
    }

    /// Read a region given in squeezed coordinates
    pub fn get(&self, region: &[Range<usize>]) -> Result<ArrayD<f16>> {
        if region.len() != self.ndim() {
            return Err(StackReaderError::RegionOutOfBounds {
                region: region.to_vec(),
                shape: self.shape(),
            });
        }
        let mut kept = region.iter();
        let raw_region: Vec<Range<usize>> = (0..self.raw_shape.len())
            .map(|axis| {
                if self.unit_axes.contains(&axis) {
                    0..1
                } else {
                    kept.next().cloned().unwrap_or(0..0)
                }
            })
            .collect();

        let block = self.read_block(&raw_region)?;
        Ok(drop_axes(block, &self.unit_axes))
    }

    /// Materialise the whole image, reading chunks in parallel on the current pool
    pub fn compute(&self) -> Result<ArrayD<f16>> {
        let grid = self.chunk_grid();
        let regions: Vec<Vec<Range<usize>>> = ndarray::indices(IxDyn(&grid))
            .into_iter()
            .map(|idx| {
                (0..grid.len())
                    .map(|axis| {
                        let start = idx[axis] * self.chunk[axis];
                        start..(start + self.chunk[axis]).min(self.raw_shape[axis])
                    })
                    .collect()
            })
            .collect();

        log::debug!(
            "Computing {:?} from {} chunk(s) of {:?}",
            self.raw_shape,
            regions.len(),
            self.chunk
        );

        let blocks = regions
            .into_par_iter()
            .map(|region| self.read_block(&region).map(|block| (region, block)))
            .collect::<Result<Vec<_>>>()?;

        let mut out = ArrayD::from_elem(IxDyn(&self.raw_shape), f16::ZERO);
        for (region, block) in blocks {
            out.slice_each_axis_mut(|ax| region[ax.axis.index()].clone().into())
                .assign(&block);
        }
        Ok(drop_axes(out, &self.unit_axes))
    }

    /// Read a raw-coordinate region and cast it
    fn read_block(&self, raw_region: &[Range<usize>]) -> Result<ArrayD<f16>> {
        let block = self.reader.read_region(raw_region)?;
        let expected: Vec<usize> = raw_region.iter().map(|r| r.end - r.start).collect();
        if block.shape() != expected.as_slice() {
            return Err(StackReaderError::InvalidDimensions(format!(
                "reader returned {:?} for a region of {:?}",
                block.shape(),
                expected
            )));
        }
        Ok(block.mapv(f16::from_f32))
    }
}

impl fmt::Debug for LazyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyImage")
            .field("dims", &self.reader.dims().to_string())
            .field("shape", &self.shape())
            .field("chunk_shape", &self.chunk_shape())
            .finish()
    }
}

/// Equally shaped lazy images stacked along a new leading axis
#[derive(Debug, Clone)]
pub struct LazyStack {
    members: Vec<LazyImage>,
    member_shape: Vec<usize>,
}

impl LazyStack {
    pub fn new(members: Vec<LazyImage>) -> Result<Self> {
        let member_shape = members
            .first()
            .map(LazyImage::shape)
            .ok_or(StackReaderError::EmptyPathSet)?;
        for (index, member) in members.iter().enumerate().skip(1) {
            let found = member.shape();
            if found != member_shape {
                return Err(StackReaderError::StackShapeMismatch {
                    index,
                    expected: member_shape,
                    found,
                });
            }
        }
        Ok(Self {
            members,
            member_shape,
        })
    }

    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.member_shape.len() + 1);
        shape.push(self.members.len());
        shape.extend_from_slice(&self.member_shape);
        shape
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, index: usize) -> Option<&LazyImage> {
        self.members.get(index)
    }

    pub fn members(&self) -> &[LazyImage] {
        &self.members
    }

    /// Materialise every member and stack them
    pub fn compute(&self) -> Result<ArrayD<f16>> {
        let computed = self
            .members
            .par_iter()
            .map(LazyImage::compute)
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<ArrayView<'_, f16, IxDyn>> = computed.iter().map(|a| a.view()).collect();
        Ok(ndarray::stack(Axis(0), &views)?)
    }
}

/// Array half of a layer: materialised or deferred
#[derive(Debug, Clone)]
pub enum LayerArray {
    InMemory(ArrayD<f16>),
    Lazy(LazyStack),
}

impl LayerArray {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            LayerArray::InMemory(data) => data.shape().to_vec(),
            LayerArray::Lazy(stack) => stack.shape(),
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, LayerArray::Lazy(_))
    }

    /// Borrow the materialised array, if this layer holds one
    pub fn as_in_memory(&self) -> Option<&ArrayD<f16>> {
        match self {
            LayerArray::InMemory(data) => Some(data),
            LayerArray::Lazy(_) => None,
        }
    }

    /// Materialise, consuming the layer
    pub fn compute(self) -> Result<ArrayD<f16>> {
        match self {
            LayerArray::InMemory(data) => Ok(data),
            LayerArray::Lazy(stack) => stack.compute(),
        }
    }
}
