//! Built-in file formats
//!
//! - [`zarr`]: uncompressed Zarr v2 stores, read chunk by chunk, plus a writer
//! - [`netcdf`]: one NetCDF variable per file
//! - [`npy`]: NumPy `.npy` arrays
//! - [`image`]: PNG and TIFF rasters

pub mod image;
pub mod netcdf;
pub mod npy;
pub mod zarr;

pub use self::image::{RasterFormat, RasterReader};
pub use self::netcdf::{NetcdfFormat, NetcdfReader};
pub use self::npy::{NpyFormat, NpyReader};
pub use self::zarr::{ZarrArrayMetadata, ZarrFormat, ZarrReader, ZarrWriteOptions, ZarrWriter};
