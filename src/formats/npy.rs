//! NumPy `.npy` files
//!
//! Opening only parses the header for the shape; the payload is decoded on the
//! first read and kept for later regions. Axes are guessed from the rank
//! (`YX`, `ZYX`, `CZYX`, `TCZYX`, ...).

use crate::dimensions::{Dimension, DimensionOrder};
use crate::errors::{Result, StackReaderError};
use crate::reader::{slice_region, ImageReader, ReaderFormat};
use ndarray::ArrayD;
use ndarray_npy::{ReadNpyExt, ReadableElement};
use std::fs::File;
use std::io::{Cursor, Read};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// NumPy magic bytes: \x93NUMPY
const MAGIC: &[u8] = &[0x93, b'N', b'U', b'M', b'P', b'Y'];

/// Pull `shape` out of the header dict, e.g. `{'descr': '<f4', 'fortran_order': False, 'shape': (3, 4), }`
fn parse_shape(header: &str) -> Option<Vec<usize>> {
    let after_key = &header[header.find("'shape'")? + "'shape'".len()..];
    let open = after_key.find('(')?;
    let close = after_key[open..].find(')')? + open;
    after_key[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse().ok())
        .collect()
}

/// Pull the `descr` typestr out of the header dict
fn parse_descr(header: &str) -> Option<&str> {
    let after_key = &header[header.find("'descr'")? + "'descr'".len()..];
    let open = after_key.find('\'')? + 1;
    let close = after_key[open..].find('\'')? + open;
    Some(&after_key[open..close])
}

/// Whether [`decode`] handles this typestr
fn is_supported_descr(descr: &str) -> bool {
    let code = descr.trim_start_matches(['<', '>', '|', '=']);
    matches!(
        code,
        "f4" | "f8" | "u1" | "u2" | "u4" | "u8" | "i1" | "i2" | "i4" | "i8" | "b1"
    )
}

/// Element type and shape from a `.npy` header
#[derive(Debug, Clone, PartialEq, Eq)]
struct NpyHeader {
    descr: String,
    shape: Vec<usize>,
}

/// Read the header without touching the payload
fn read_header(path: &Path) -> Result<NpyHeader> {
    let mut file = File::open(path)?;
    let mut preamble = [0u8; 8];
    file.read_exact(&mut preamble)?;
    if !preamble.starts_with(MAGIC) {
        return Err(StackReaderError::Generic(format!(
            "{} is not a NumPy file",
            path.display()
        )));
    }

    let header_len = match preamble[6] {
        1 => {
            let mut len = [0u8; 2];
            file.read_exact(&mut len)?;
            usize::from(u16::from_le_bytes(len))
        }
        _ => {
            let mut len = [0u8; 4];
            file.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
    };
    let mut header = vec![0u8; header_len];
    file.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);

    let malformed = || {
        StackReaderError::Generic(format!("malformed NumPy header in {}", path.display()))
    };
    Ok(NpyHeader {
        descr: parse_descr(&header).ok_or_else(malformed)?.to_string(),
        shape: parse_shape(&header).ok_or_else(malformed)?,
    })
}

fn read_as<T: ReadableElement + Clone>(bytes: &[u8], cast: fn(T) -> f32) -> Option<ArrayD<f32>> {
    ArrayD::<T>::read_npy(Cursor::new(bytes))
        .ok()
        .map(|array| array.mapv(cast))
}

/// Decode any supported element type to `f32`
fn decode(bytes: &[u8]) -> Result<ArrayD<f32>> {
    // f32 is most common for image data
    let first_error = match ArrayD::<f32>::read_npy(Cursor::new(bytes)) {
        Ok(array) => return Ok(array),
        Err(e) => e,
    };

    read_as::<f64>(bytes, |v| v as f32)
        .or_else(|| read_as::<u8>(bytes, f32::from))
        .or_else(|| read_as::<u16>(bytes, f32::from))
        .or_else(|| read_as::<i16>(bytes, f32::from))
        .or_else(|| read_as::<i8>(bytes, f32::from))
        .or_else(|| read_as::<u32>(bytes, |v| v as f32))
        .or_else(|| read_as::<i32>(bytes, |v| v as f32))
        .or_else(|| read_as::<u64>(bytes, |v| v as f32))
        .or_else(|| read_as::<i64>(bytes, |v| v as f32))
        .or_else(|| read_as::<bool>(bytes, |v| if v { 1.0 } else { 0.0 }))
        .ok_or_else(|| first_error.into())
}

/// NPY format entry for the registry
#[derive(Debug, Clone, Copy, Default)]
pub struct NpyFormat;

impl ReaderFormat for NpyFormat {
    fn name(&self) -> &'static str {
        "npy"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_this_type(&self, path: &Path) -> bool {
        path.is_file()
            && read_header(path)
                .map(|header| is_supported_descr(&header.descr))
                .unwrap_or(false)
    }

    fn open(&self, path: &Path, chunk_by: &[Dimension]) -> Result<Arc<dyn ImageReader>> {
        Ok(Arc::new(NpyReader::open(path, chunk_by)?))
    }
}

/// Reader for one `.npy` file
#[derive(Debug)]
pub struct NpyReader {
    path: PathBuf,
    shape: Vec<usize>,
    dims: DimensionOrder,
    chunk_by: Vec<Dimension>,
    data: OnceLock<ArrayD<f32>>,
}

impl NpyReader {
    pub fn open(path: &Path, chunk_by: &[Dimension]) -> Result<Self> {
        let NpyHeader { descr, shape } = read_header(path)?;
        if !is_supported_descr(&descr) {
            return Err(StackReaderError::Generic(format!(
                "unsupported NumPy dtype '{}' in {}",
                descr,
                path.display()
            )));
        }
        let dims = DimensionOrder::guess(shape.len())?;
        log::debug!("Opened NPY {} ({}, shape {:?})", path.display(), dims, shape);

        Ok(Self {
            path: path.to_path_buf(),
            shape,
            dims,
            chunk_by: chunk_by.to_vec(),
            data: OnceLock::new(),
        })
    }

    fn data(&self) -> Result<&ArrayD<f32>> {
        if let Some(data) = self.data.get() {
            return Ok(data);
        }
        let bytes = std::fs::read(&self.path)?;
        let decoded = decode(&bytes)?;
        if decoded.shape() != self.shape.as_slice() {
            return Err(StackReaderError::InvalidDimensions(format!(
                "{} decoded to {:?}, header says {:?}",
                self.path.display(),
                decoded.shape(),
                self.shape
            )));
        }
        Ok(self.data.get_or_init(|| decoded))
    }
}

impl ImageReader for NpyReader {
    fn dims(&self) -> &DimensionOrder {
        &self.dims
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn chunk_by(&self) -> &[Dimension] {
        &self.chunk_by
    }

    fn read_region(&self, region: &[Range<usize>]) -> Result<ArrayD<f32>> {
        slice_region(self.data()?, region)
    }
}
