//! Dimension letters and dimension orderings
//!
//! Every reader describes its array axes with a [`DimensionOrder`] such as
//! `"TCZYX"`. The loader only cares about two things: where the channel axis
//! sits, and which axes are the spatial plane used for lazy chunking.

use crate::errors::{Result, StackReaderError};
use std::fmt;
use std::str::FromStr;

/// A named image axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Scene,
    Time,
    Channel,
    SpatialZ,
    SpatialY,
    SpatialX,
}

impl Dimension {
    /// Single-letter code used in dimension order strings
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Scene => 'S',
            Self::Time => 'T',
            Self::Channel => 'C',
            Self::SpatialZ => 'Z',
            Self::SpatialY => 'Y',
            Self::SpatialX => 'X',
        }
    }

    /// Parse a single dimension letter (case-insensitive)
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'S' => Some(Self::Scene),
            'T' => Some(Self::Time),
            'C' => Some(Self::Channel),
            'Z' => Some(Self::SpatialZ),
            'Y' => Some(Self::SpatialY),
            'X' => Some(Self::SpatialX),
            _ => None,
        }
    }

    /// Map a descriptive axis name (as stored in NetCDF or Zarr attributes) to a dimension
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "s" | "scene" | "scenes" => Some(Self::Scene),
            "t" | "time" | "timepoint" | "frame" => Some(Self::Time),
            "c" | "channel" | "channels" | "band" | "wavelength" => Some(Self::Channel),
            "z" | "depth" | "plane" | "level" => Some(Self::SpatialZ),
            "y" | "lat" | "latitude" | "row" | "height" => Some(Self::SpatialY),
            "x" | "lon" | "longitude" | "column" | "col" | "width" => Some(Self::SpatialX),
            _ => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// The full canonical ordering, outermost first
pub const DEFAULT_ORDER: [Dimension; 6] = [
    Dimension::Scene,
    Dimension::Time,
    Dimension::Channel,
    Dimension::SpatialZ,
    Dimension::SpatialY,
    Dimension::SpatialX,
];

/// Chunking used when a reader materialises its data
pub const DEFAULT_CHUNK_DIMS: [Dimension; 3] =
    [Dimension::SpatialZ, Dimension::SpatialY, Dimension::SpatialX];

/// Chunking used for lazy loading; a viewer only ever pulls single YX planes
pub const PLANE_CHUNK_DIMS: [Dimension; 2] = [Dimension::SpatialY, Dimension::SpatialX];

/// Ordered, duplicate-free sequence of dimensions describing an array's axes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionOrder(Vec<Dimension>);

impl DimensionOrder {
    /// Build an order, rejecting repeated dimensions
    pub fn new(dims: Vec<Dimension>) -> Result<Self> {
        for (i, d) in dims.iter().enumerate() {
            if dims[..i].contains(d) {
                return Err(StackReaderError::InvalidDimensions(format!(
                    "dimension '{}' appears more than once",
                    d
                )));
            }
        }
        Ok(Self(dims))
    }

    /// Guess an ordering for an array of `ndim` axes: the innermost `ndim`
    /// letters of `STCZYX`.
    pub fn guess(ndim: usize) -> Result<Self> {
        if ndim > DEFAULT_ORDER.len() {
            return Err(StackReaderError::InvalidDimensions(format!(
                "cannot guess dimensions for a {}-d array",
                ndim
            )));
        }
        Ok(Self(DEFAULT_ORDER[DEFAULT_ORDER.len() - ndim..].to_vec()))
    }

    /// Resolve descriptive axis names, falling back to [`DimensionOrder::guess`]
    /// if any name is unknown or the mapping repeats a dimension.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mapped: Option<Vec<Dimension>> =
            names.iter().map(|n| Dimension::from_name(n.as_ref())).collect();
        match mapped.map(Self::new) {
            Some(Ok(order)) => Ok(order),
            _ => {
                log::debug!(
                    "Unrecognised axis names {:?}, guessing dimension order",
                    names.iter().map(AsRef::as_ref).collect::<Vec<_>>()
                );
                Self::guess(names.len())
            }
        }
    }

    /// Position of `dim`, if present
    pub fn index_of(&self, dim: Dimension) -> Option<usize> {
        self.0.iter().position(|&d| d == dim)
    }

    pub fn contains(&self, dim: Dimension) -> bool {
        self.0.contains(&dim)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Dimension] {
        &self.0
    }

    /// Check that the ordering describes an array of the given rank
    pub fn check_rank(&self, shape: &[usize]) -> Result<()> {
        if self.0.len() != shape.len() {
            return Err(StackReaderError::InvalidDimensions(format!(
                "dimension order '{}' does not match a {}-d array of shape {:?}",
                self,
                shape.len(),
                shape
            )));
        }
        Ok(())
    }
}

impl FromStr for DimensionOrder {
    type Err = StackReaderError;

    fn from_str(s: &str) -> Result<Self> {
        let dims = s
            .chars()
            .map(|c| {
                Dimension::from_char(c).ok_or_else(|| {
                    StackReaderError::InvalidDimensions(format!(
                        "unknown dimension '{}' in '{}'",
                        c, s
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(dims)
    }
}

impl fmt::Display for DimensionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.0 {
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}
