//! Zarr v2 directory stores
//!
//! Reads uncompressed Zarr v2 arrays chunk by chunk, so a lazy plane read only
//! touches the chunk files that intersect the plane. A store may be a bare
//! array (a directory with `.zarray`) or an OME-style group whose
//! full-resolution array lives at `0/`.
//!
//! Axis names come from the group's `multiscales[0].axes`, the array's
//! `_ARRAY_DIMENSIONS`, or are guessed from the rank. Channel names come from
//! `channel_names` or `omero.channels[].label`.

use crate::dimensions::{Dimension, DimensionOrder};
use crate::errors::{Result, StackReaderError};
use crate::reader::{check_region, default_channel_names, ImageReader, ReaderFormat};
use chrono::Utc;
use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ARRAY_META: &str = ".zarray";
const GROUP_META: &str = ".zgroup";
const ATTRS: &str = ".zattrs";

/// Contents of a `.zarray` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZarrArrayMetadata {
    pub zarr_format: u8,
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    pub dtype: String,
    #[serde(default)]
    pub compressor: Option<JsonValue>,
    #[serde(default)]
    pub fill_value: Option<JsonValue>,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default)]
    pub filters: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_separator: Option<String>,
}

fn default_order() -> String {
    "C".to_string()
}

impl ZarrArrayMetadata {
    fn read(array_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(array_path.join(ARRAY_META))?;
        let meta: Self = serde_json::from_str(&content)?;
        if meta.zarr_format != 2 {
            return Err(StackReaderError::Zarr(format!(
                "unsupported zarr_format {} (only 2 is readable)",
                meta.zarr_format
            )));
        }
        if meta.shape.len() != meta.chunks.len() {
            return Err(StackReaderError::Zarr(format!(
                "shape {:?} and chunks {:?} differ in rank",
                meta.shape, meta.chunks
            )));
        }
        if meta.chunks.iter().any(|&c| c == 0) {
            return Err(StackReaderError::Zarr(format!(
                "chunk shape {:?} has a zero-length axis",
                meta.chunks
            )));
        }
        if meta.compressor.as_ref().is_some_and(|c| !c.is_null()) {
            return Err(StackReaderError::Zarr(
                "compressed chunks are not supported".to_string(),
            ));
        }
        if meta
            .filters
            .as_ref()
            .is_some_and(|f| !f.is_null() && f.as_array().map_or(true, |a| !a.is_empty()))
        {
            return Err(StackReaderError::Zarr("filters are not supported".to_string()));
        }
        if meta.order != "C" {
            return Err(StackReaderError::Zarr(format!(
                "memory order '{}' is not supported",
                meta.order
            )));
        }
        Ok(meta)
    }

    fn separator(&self) -> &str {
        self.dimension_separator.as_deref().unwrap_or(".")
    }

    fn fill(&self) -> f32 {
        match &self.fill_value {
            Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(0.0) as f32,
            Some(JsonValue::String(s)) => match s.as_str() {
                "NaN" => f32::NAN,
                "Infinity" => f32::INFINITY,
                "-Infinity" => f32::NEG_INFINITY,
                _ => 0.0,
            },
            _ => 0.0,
        }
    }
}

/// Element encoding of a chunk, parsed from a NumPy-style typestr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ElementType {
    kind: char,
    size: usize,
    big_endian: bool,
}

impl ElementType {
    fn parse(dtype: &str) -> Result<Self> {
        let mut chars = dtype.chars();
        let (order, kind) = match (chars.next(), chars.next()) {
            (Some(o), Some(k)) => (o, k),
            _ => return Err(StackReaderError::Zarr(format!("invalid dtype '{}'", dtype))),
        };
        let size: usize = chars
            .as_str()
            .parse()
            .map_err(|_| StackReaderError::Zarr(format!("invalid dtype '{}'", dtype)))?;

        let supported = matches!(
            (kind, size),
            ('f', 2) | ('f', 4) | ('f', 8) | ('u', 1 | 2 | 4 | 8) | ('i', 1 | 2 | 4 | 8) | ('b', 1)
        );
        if !supported || !matches!(order, '<' | '>' | '|') {
            return Err(StackReaderError::Zarr(format!("unsupported dtype '{}'", dtype)));
        }

        Ok(Self {
            kind,
            size,
            big_endian: order == '>',
        })
    }

    fn decode(&self, bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(self.size)
            .map(|raw| {
                let mut buf = [0u8; 8];
                buf[..self.size].copy_from_slice(raw);
                if self.big_endian {
                    buf[..self.size].reverse();
                }
                self.value(buf)
            })
            .collect()
    }

    fn value(&self, le: [u8; 8]) -> f32 {
        match (self.kind, self.size) {
            ('f', 2) => half::f16::from_le_bytes([le[0], le[1]]).to_f32(),
            ('f', 4) => f32::from_le_bytes([le[0], le[1], le[2], le[3]]),
            ('f', 8) => f64::from_le_bytes(le) as f32,
            ('u', 1) | ('b', 1) => f32::from(le[0]),
            ('u', 2) => f32::from(u16::from_le_bytes([le[0], le[1]])),
            ('u', 4) => u32::from_le_bytes([le[0], le[1], le[2], le[3]]) as f32,
            ('u', 8) => u64::from_le_bytes(le) as f32,
            ('i', 1) => f32::from(le[0] as i8),
            ('i', 2) => f32::from(i16::from_le_bytes([le[0], le[1]])),
            ('i', 4) => i32::from_le_bytes([le[0], le[1], le[2], le[3]]) as f32,
            ('i', 8) => i64::from_le_bytes(le) as f32,
            _ => f32::NAN,
        }
    }
}

/// Locate the array inside a store: the store itself, or `0/` of a group
fn resolve_array_path(path: &Path) -> Option<PathBuf> {
    if path.join(ARRAY_META).is_file() {
        return Some(path.to_path_buf());
    }
    let first_level = path.join("0");
    if path.join(GROUP_META).is_file() && first_level.join(ARRAY_META).is_file() {
        return Some(first_level);
    }
    None
}

fn read_attrs(dir: &Path) -> Result<Option<JsonValue>> {
    let attrs_path = dir.join(ATTRS);
    if !attrs_path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(attrs_path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn string_list(value: &JsonValue) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| {
            v.as_str()
                .or_else(|| v.get("name").and_then(JsonValue::as_str))
                .or_else(|| v.get("label").and_then(JsonValue::as_str))
                .map(str::to_string)
        })
        .collect()
}

fn axis_names(group: Option<&JsonValue>, array: Option<&JsonValue>) -> Option<Vec<String>> {
    group
        .and_then(|g| g.pointer("/multiscales/0/axes"))
        .and_then(string_list)
        .or_else(|| array.and_then(|a| a.get("_ARRAY_DIMENSIONS")).and_then(string_list))
}

fn channel_labels(attrs: &[Option<&JsonValue>]) -> Option<Vec<String>> {
    attrs.iter().flatten().find_map(|a| {
        a.get("channel_names")
            .and_then(string_list)
            .or_else(|| a.pointer("/omero/channels").and_then(string_list))
    })
}

/// Zarr format entry for the registry
#[derive(Debug, Clone, Copy, Default)]
pub struct ZarrFormat;

impl ReaderFormat for ZarrFormat {
    fn name(&self) -> &'static str {
        "zarr"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn is_this_type(&self, path: &Path) -> bool {
        path.is_dir()
            && resolve_array_path(path)
                .and_then(|array| ZarrArrayMetadata::read(&array).ok())
                .map(|meta| ElementType::parse(&meta.dtype).is_ok())
                .unwrap_or(false)
    }

    fn open(&self, path: &Path, chunk_by: &[Dimension]) -> Result<Arc<dyn ImageReader>> {
        Ok(Arc::new(ZarrReader::open(path, chunk_by)?))
    }
}

/// Reader for one Zarr array
#[derive(Debug, Clone)]
pub struct ZarrReader {
    array_path: PathBuf,
    meta: ZarrArrayMetadata,
    element: ElementType,
    dims: DimensionOrder,
    channel_names: Option<Vec<String>>,
    chunk_by: Vec<Dimension>,
}

impl ZarrReader {
    pub fn open(path: &Path, chunk_by: &[Dimension]) -> Result<Self> {
        let array_path = resolve_array_path(path).ok_or_else(|| {
            StackReaderError::Zarr(format!("no Zarr array found at {}", path.display()))
        })?;
        let meta = ZarrArrayMetadata::read(&array_path)?;
        let element = ElementType::parse(&meta.dtype)?;

        let group_attrs = if array_path != path { read_attrs(path)? } else { None };
        let array_attrs = read_attrs(&array_path)?;

        let dims = match axis_names(group_attrs.as_ref(), array_attrs.as_ref()) {
            Some(names) if names.len() == meta.shape.len() => DimensionOrder::from_names(&names)?,
            _ => DimensionOrder::guess(meta.shape.len())?,
        };
        let channel_names = channel_labels(&[array_attrs.as_ref(), group_attrs.as_ref()]);

        log::debug!(
            "Opened Zarr array {} ({}, shape {:?}, chunks {:?})",
            array_path.display(),
            dims,
            meta.shape,
            meta.chunks
        );

        Ok(Self {
            array_path,
            meta,
            element,
            dims,
            channel_names,
            chunk_by: chunk_by.to_vec(),
        })
    }

    pub fn metadata(&self) -> &ZarrArrayMetadata {
        &self.meta
    }

    fn chunk_key(&self, coords: &[usize]) -> String {
        if coords.is_empty() {
            return "0".to_string();
        }
        coords
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(self.meta.separator())
    }

    /// Load one stored chunk; absent chunks are `None`
    fn load_chunk(&self, coords: &[usize]) -> Result<Option<ArrayD<f32>>> {
        let chunk_path = self.array_path.join(self.chunk_key(coords));
        if !chunk_path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&chunk_path)?;
        let elements: usize = self.meta.chunks.iter().product();
        if bytes.len() != elements * self.element.size {
            return Err(StackReaderError::Zarr(format!(
                "chunk {} holds {} bytes, expected {}",
                chunk_path.display(),
                bytes.len(),
                elements * self.element.size
            )));
        }
        let values = self.element.decode(&bytes);
        Ok(Some(ArrayD::from_shape_vec(
            IxDyn(&self.meta.chunks),
            values,
        )?))
    }
}

impl ImageReader for ZarrReader {
    fn dims(&self) -> &DimensionOrder {
        &self.dims
    }

    fn shape(&self) -> &[usize] {
        &self.meta.shape
    }

    fn chunk_by(&self) -> &[Dimension] {
        &self.chunk_by
    }

    fn read_region(&self, region: &[Range<usize>]) -> Result<ArrayD<f32>> {
        check_region(region, &self.meta.shape)?;
        let out_shape: Vec<usize> = region.iter().map(|r| r.end - r.start).collect();
        let fill = self.meta.fill();
        let mut out = ArrayD::from_elem(IxDyn(&out_shape), fill);
        if out.is_empty() {
            return Ok(out);
        }

        let chunks = &self.meta.chunks;
        let first: Vec<usize> = region.iter().zip(chunks).map(|(r, &c)| r.start / c).collect();
        let counts: Vec<usize> = region
            .iter()
            .zip(chunks)
            .zip(&first)
            .map(|((r, &c), &lo)| (r.end - 1) / c - lo + 1)
            .collect();

        for offset in ndarray::indices(IxDyn(&counts)) {
            let coords: Vec<usize> = (0..counts.len()).map(|a| first[a] + offset[a]).collect();

            // Overlap of this chunk with the region, in chunk and output coordinates
            let mut src = Vec::with_capacity(coords.len());
            let mut dst = Vec::with_capacity(coords.len());
            for (axis, &k) in coords.iter().enumerate() {
                let chunk_start = k * chunks[axis];
                let lo = region[axis].start.max(chunk_start);
                let hi = region[axis].end.min(chunk_start + chunks[axis]);
                src.push(lo - chunk_start..hi - chunk_start);
                dst.push(lo - region[axis].start..hi - region[axis].start);
            }

            let mut target = out.slice_each_axis_mut(|ax| dst[ax.axis.index()].clone().into());
            if let Some(chunk) = self.load_chunk(&coords)? {
                target.assign(&chunk.slice_each_axis(|ax| src[ax.axis.index()].clone().into()));
            }
        }

        Ok(out)
    }

    fn channel_names(&self) -> Result<Vec<String>> {
        match &self.channel_names {
            Some(names) => Ok(names.clone()),
            None => Ok(default_channel_names(&self.dims, &self.meta.shape)),
        }
    }
}

/// Options for [`ZarrWriter::write_array`]
#[derive(Debug, Clone, Default)]
pub struct ZarrWriteOptions {
    /// Chunk shape; defaults to one chunk covering the array
    pub chunks: Option<Vec<usize>>,
    /// Stored as `_ARRAY_DIMENSIONS`
    pub dims: Option<DimensionOrder>,
    /// Stored as `channel_names`
    pub channel_names: Option<Vec<String>>,
}

/// Writes `f32` arrays as uncompressed Zarr v2 stores
#[derive(Debug, Clone)]
pub struct ZarrWriter {
    path: PathBuf,
}

impl ZarrWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `data` and its attributes, chunk files in parallel
    pub fn write_array(&self, data: &ArrayD<f32>, options: &ZarrWriteOptions) -> Result<()> {
        let shape = data.shape().to_vec();
        let chunks = options
            .chunks
            .clone()
            .unwrap_or_else(|| shape.iter().map(|&len| len.max(1)).collect());
        if chunks.len() != shape.len() || chunks.iter().any(|&c| c == 0) {
            return Err(StackReaderError::Zarr(format!(
                "chunk shape {:?} does not fit array shape {:?}",
                chunks, shape
            )));
        }
        if let Some(dims) = &options.dims {
            dims.check_rank(&shape)?;
        }

        fs::create_dir_all(&self.path)?;

        let meta = ZarrArrayMetadata {
            zarr_format: 2,
            shape: shape.clone(),
            chunks: chunks.clone(),
            dtype: "<f4".to_string(),
            compressor: None,
            fill_value: Some(serde_json::json!(0.0)),
            order: default_order(),
            filters: None,
            dimension_separator: Some(".".to_string()),
        };
        fs::write(self.path.join(ARRAY_META), serde_json::to_string_pretty(&meta)?)?;

        let mut attrs = serde_json::Map::new();
        if let Some(dims) = &options.dims {
            let names: Vec<String> = dims.as_slice().iter().map(|d| d.to_string()).collect();
            attrs.insert("_ARRAY_DIMENSIONS".to_string(), serde_json::json!(names));
        }
        if let Some(names) = &options.channel_names {
            attrs.insert("channel_names".to_string(), serde_json::json!(names));
        }
        attrs.insert(
            "history".to_string(),
            JsonValue::String(format!("Created by stack_reader on {}", Utc::now().to_rfc3339())),
        );
        fs::write(
            self.path.join(ATTRS),
            serde_json::to_string_pretty(&JsonValue::Object(attrs))?,
        )?;

        let grid: Vec<usize> = shape.iter().zip(&chunks).map(|(&len, &c)| len.div_ceil(c)).collect();
        let coords: Vec<Vec<usize>> = ndarray::indices(IxDyn(&grid))
            .into_iter()
            .map(|idx| (0..grid.len()).map(|a| idx[a]).collect())
            .collect();

        log::debug!(
            "Writing {} chunk(s) of {:?} to {} across {} threads",
            coords.len(),
            chunks,
            self.path.display(),
            rayon::current_num_threads()
        );

        coords.par_iter().try_for_each(|coord| -> Result<()> {
            let region: Vec<Range<usize>> = coord
                .iter()
                .zip(&chunks)
                .zip(&shape)
                .map(|((&k, &c), &len)| k * c..((k + 1) * c).min(len))
                .collect();

            // Edge chunks are padded with the fill value to the full chunk shape
            let mut block = ArrayD::<f32>::zeros(IxDyn(&chunks));
            block
                .slice_each_axis_mut(|ax| (0..region[ax.axis.index()].len()).into())
                .assign(&data.slice_each_axis(|ax| region[ax.axis.index()].clone().into()));

            let bytes: Vec<u8> = block.iter().flat_map(|v| v.to_le_bytes()).collect();
            let key = if coord.is_empty() {
                "0".to_string()
            } else {
                coord.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(".")
            };
            fs::write(self.path.join(key), bytes)?;
            Ok(())
        })?;

        log::info!("Wrote Zarr array {:?} to {}", shape, self.path.display());
        Ok(())
    }
}
