//! Single-plane raster images (PNG, TIFF)
//!
//! Grayscale images are `YX`; colour images are `YXC` with channels named
//! after their components. Pixel values keep their stored range.

use crate::dimensions::{Dimension, DimensionOrder};
use crate::errors::Result;
use crate::reader::{slice_region, ImageReader, ReaderFormat};
use image::{ColorType, DynamicImage, ImageFormat};
use ndarray::{ArrayD, IxDyn};
use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

const SUPPORTED: &[ImageFormat] = &[ImageFormat::Png, ImageFormat::Tiff];

fn to_f32<T: Into<f32>>(raw: Vec<T>) -> Vec<f32> {
    raw.into_iter().map(Into::into).collect()
}

/// Raw pixel values and channel count, keeping 8/16-bit ranges intact
fn pixels(img: &DynamicImage) -> (usize, Vec<f32>) {
    match img.color() {
        ColorType::L8 | ColorType::La8 => (1, to_f32(img.to_luma8().into_raw())),
        ColorType::L16 | ColorType::La16 => (1, to_f32(img.to_luma16().into_raw())),
        ColorType::Rgb8 => (3, to_f32(img.to_rgb8().into_raw())),
        ColorType::Rgba8 => (4, to_f32(img.to_rgba8().into_raw())),
        ColorType::Rgb16 => (3, to_f32(img.to_rgb16().into_raw())),
        ColorType::Rgba16 => (4, to_f32(img.to_rgba16().into_raw())),
        ColorType::Rgba32F => (4, img.to_rgba32f().into_raw()),
        _ => (3, img.to_rgb32f().into_raw()),
    }
}

/// PNG/TIFF format entry for the registry
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterFormat;

impl ReaderFormat for RasterFormat {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn is_this_type(&self, path: &Path) -> bool {
        let mut header = [0u8; 16];
        let read = File::open(path).and_then(|mut f| f.read(&mut header));
        match read {
            Ok(n) => image::guess_format(&header[..n])
                .map(|format| SUPPORTED.contains(&format))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn open(&self, path: &Path, chunk_by: &[Dimension]) -> Result<Arc<dyn ImageReader>> {
        Ok(Arc::new(RasterReader::open(path, chunk_by)?))
    }
}

/// Reader for one decoded raster image
#[derive(Debug)]
pub struct RasterReader {
    data: ArrayD<f32>,
    dims: DimensionOrder,
    channel_names: Vec<String>,
    chunk_by: Vec<Dimension>,
}

impl RasterReader {
    pub fn open(path: &Path, chunk_by: &[Dimension]) -> Result<Self> {
        let img = image::open(path)?;
        let (height, width) = (img.height() as usize, img.width() as usize);
        let (channels, values) = pixels(&img);

        let (shape, dims, channel_names): (Vec<usize>, DimensionOrder, Vec<String>) = if channels == 1 {
            (vec![height, width], "YX".parse()?, Vec::new())
        } else {
            let names = ["R", "G", "B", "A"][..channels]
                .iter()
                .map(|s| s.to_string())
                .collect();
            (vec![height, width, channels], "YXC".parse()?, names)
        };
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;

        log::debug!("Decoded {} ({}, shape {:?})", path.display(), dims, shape);

        Ok(Self {
            data,
            dims,
            channel_names,
            chunk_by: chunk_by.to_vec(),
        })
    }
}

impl ImageReader for RasterReader {
    fn dims(&self) -> &DimensionOrder {
        &self.dims
    }

    fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    fn chunk_by(&self) -> &[Dimension] {
        &self.chunk_by
    }

    fn read_region(&self, region: &[Range<usize>]) -> Result<ArrayD<f32>> {
        slice_region(&self.data, region)
    }

    fn channel_names(&self) -> Result<Vec<String>> {
        Ok(self.channel_names.clone())
    }
}
