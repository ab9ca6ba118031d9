//! NetCDF variables as images
//!
//! One variable of the file is the image: the named one, or else the variable
//! with the most dimensions. NetCDF dimension names map onto image axes
//! (`time`, `channel`, `z`, `y`/`lat`, `x`/`lon`, ...). Channel names come from
//! a `channel_names` attribute on the variable.

use crate::dimensions::{Dimension, DimensionOrder};
use crate::errors::{Result, StackReaderError};
use crate::reader::{check_region, default_channel_names, slice_region, ImageReader, ReaderFormat};
use ndarray::{ArrayD, IxDyn};
use netcdf::AttributeValue;
use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CLASSIC_MAGIC: &[u8] = b"CDF";
const HDF5_MAGIC: &[u8] = &[0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];
const NETCDF_EXTENSIONS: &[&str] = &["nc", "nc4", "cdf", "netcdf"];

/// Choose the image variable: `preferred` if given, else the highest-rank one
fn select_variable<'f>(
    file: &'f netcdf::File,
    preferred: Option<&str>,
) -> Option<netcdf::Variable<'f>> {
    match preferred {
        Some(name) => file.variable(name),
        None => file
            .variables()
            .filter(|v| v.dimensions().len() >= 2)
            .fold(None, |best: Option<netcdf::Variable<'f>>, v| match best {
                Some(b) if b.dimensions().len() >= v.dimensions().len() => Some(b),
                _ => Some(v),
            }),
    }
}

/// NetCDF format entry for the registry
#[derive(Debug, Clone, Default)]
pub struct NetcdfFormat {
    /// Variable to read; the highest-rank variable when unset
    pub variable: Option<String>,
}

impl NetcdfFormat {
    pub fn with_variable(variable: impl Into<String>) -> Self {
        Self {
            variable: Some(variable.into()),
        }
    }

    fn has_netcdf_magic(path: &Path) -> bool {
        let mut magic = [0u8; 8];
        if File::open(path).and_then(|mut f| f.read_exact(&mut magic)).is_err() {
            return false;
        }
        if magic.starts_with(CLASSIC_MAGIC) {
            return true;
        }
        let netcdf_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| NETCDF_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        magic == HDF5_MAGIC && netcdf_extension
    }
}

impl ReaderFormat for NetcdfFormat {
    fn name(&self) -> &'static str {
        "netcdf"
    }

    fn priority(&self) -> i32 {
        15
    }

    fn is_this_type(&self, path: &Path) -> bool {
        path.is_file()
            && Self::has_netcdf_magic(path)
            && netcdf::open(path)
                .map(|file| select_variable(&file, self.variable.as_deref()).is_some())
                .unwrap_or(false)
    }

    fn open(&self, path: &Path, chunk_by: &[Dimension]) -> Result<Arc<dyn ImageReader>> {
        Ok(Arc::new(NetcdfReader::open(
            path,
            self.variable.as_deref(),
            chunk_by,
        )?))
    }
}

/// Reader for one NetCDF variable
///
/// The file is reopened on every read so the reader can move between workers.
#[derive(Debug, Clone)]
pub struct NetcdfReader {
    path: PathBuf,
    variable: String,
    shape: Vec<usize>,
    dims: DimensionOrder,
    channel_names: Option<Vec<String>>,
    chunk_by: Vec<Dimension>,
}

impl NetcdfReader {
    pub fn open(path: &Path, variable: Option<&str>, chunk_by: &[Dimension]) -> Result<Self> {
        let file = netcdf::open(path)?;
        let var = select_variable(&file, variable).ok_or_else(|| {
            StackReaderError::Generic(format!(
                "no image variable{} in {}",
                variable.map(|v| format!(" '{}'", v)).unwrap_or_default(),
                path.display()
            ))
        })?;

        let dim_names: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let dims = DimensionOrder::from_names(&dim_names)?;

        let channel_names = match var.attribute("channel_names") {
            Some(attr) => match attr.value()? {
                AttributeValue::Strs(names) => Some(names),
                AttributeValue::Str(joined) => {
                    Some(joined.split(',').map(|s| s.trim().to_string()).collect())
                }
                _ => None,
            },
            None => None,
        };

        log::debug!(
            "Opened NetCDF variable '{}' in {} ({} from {:?}, shape {:?})",
            var.name(),
            path.display(),
            dims,
            dim_names,
            shape
        );

        Ok(Self {
            path: path.to_path_buf(),
            variable: var.name().to_string(),
            shape,
            dims,
            channel_names,
            chunk_by: chunk_by.to_vec(),
        })
    }

    pub fn variable_name(&self) -> &str {
        &self.variable
    }
}

impl ImageReader for NetcdfReader {
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
        check_region(region, &self.shape)?;
        let file = netcdf::open(&self.path)?;
        let var = file
            .variable(&self.variable)
            .ok_or_else(|| StackReaderError::Generic(format!("variable '{}' vanished", self.variable)))?;

        let values: Vec<f32> = match region {
            [a] => var.get_values::<f32, _>(a.clone())?,
            [a, b] => var.get_values::<f32, _>((a.clone(), b.clone()))?,
            [a, b, c] => var.get_values::<f32, _>((a.clone(), b.clone(), c.clone()))?,
            [a, b, c, d] => {
                var.get_values::<f32, _>((a.clone(), b.clone(), c.clone(), d.clone()))?
            }
            _ => {
                // Ranks without a hyperslab form read everything and cut in memory
                let all = var.get_values::<f32, _>(..)?;
                let full = ArrayD::from_shape_vec(IxDyn(&self.shape), all)?;
                return slice_region(&full, region);
            }
        };

        let region_shape: Vec<usize> = region.iter().map(|r| r.end - r.start).collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&region_shape), values)?)
    }

    fn channel_names(&self) -> Result<Vec<String>> {
        match &self.channel_names {
            Some(names) => Ok(names.clone()),
            None => Ok(default_channel_names(&self.dims, &self.shape)),
        }
    }
}
