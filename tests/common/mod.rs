//! Shared fixtures: an in-memory reader format whose tasks can be made to
//! finish in reverse order.

#![allow(dead_code)]

use ndarray::{ArrayD, IxDyn};
use stack_reader::dimensions::{Dimension, DimensionOrder};
use stack_reader::errors::{Result, StackReaderError};
use stack_reader::reader::{check_region, ImageReader, ReaderFormat};
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Recognises `img<N>.fake`; every pixel of image N has the value N
#[derive(Debug, Clone)]
pub struct FakeFormat {
    pub dims: String,
    pub shape: Vec<usize>,
    pub channel_names: Option<Vec<String>>,
    /// Sleep `(max_index - N) * step` on open so later images finish first
    pub reverse_delay: Option<(usize, Duration)>,
    /// Image number whose open fails
    pub fail_on: Option<usize>,
    /// Image numbers in the order their open completed
    pub completed: Arc<Mutex<Vec<usize>>>,
}

impl FakeFormat {
    pub fn new(dims: &str, shape: &[usize]) -> Self {
        Self {
            dims: dims.to_string(),
            shape: shape.to_vec(),
            channel_names: None,
            reverse_delay: None,
            fail_on: None,
            completed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_channel_names(mut self, names: &[&str]) -> Self {
        self.channel_names = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_reverse_delay(mut self, max_index: usize, step: Duration) -> Self {
        self.reverse_delay = Some((max_index, step));
        self
    }

    pub fn with_failure(mut self, number: usize) -> Self {
        self.fail_on = Some(number);
        self
    }

    pub fn completion_order(&self) -> Vec<usize> {
        self.completed.lock().unwrap().clone()
    }
}

pub fn image_number(path: &Path) -> Option<usize> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("img")?
        .parse()
        .ok()
}

impl ReaderFormat for FakeFormat {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn is_this_type(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("fake") && image_number(path).is_some()
    }

    fn open(&self, path: &Path, chunk_by: &[Dimension]) -> Result<Arc<dyn ImageReader>> {
        let number = image_number(path)
            .ok_or_else(|| StackReaderError::Generic(format!("bad fake path {}", path.display())))?;
        if let Some((max_index, step)) = self.reverse_delay {
            thread::sleep(step * max_index.saturating_sub(number) as u32);
        }
        if self.fail_on == Some(number) {
            return Err(StackReaderError::Generic(format!("cannot open img{}", number)));
        }
        self.completed.lock().unwrap().push(number);

        Ok(Arc::new(FakeReader {
            value: number as f32,
            dims: self.dims.parse()?,
            shape: self.shape.clone(),
            channel_names: self.channel_names.clone(),
            chunk_by: chunk_by.to_vec(),
            regions_read: Mutex::new(Vec::new()),
        }))
    }
}

#[derive(Debug)]
pub struct FakeReader {
    pub value: f32,
    pub dims: DimensionOrder,
    pub shape: Vec<usize>,
    pub channel_names: Option<Vec<String>>,
    pub chunk_by: Vec<Dimension>,
    pub regions_read: Mutex<Vec<Vec<Range<usize>>>>,
}

impl FakeReader {
    pub fn new(value: f32, dims: &str, shape: &[usize], chunk_by: &[Dimension]) -> Self {
        Self {
            value,
            dims: dims.parse().unwrap(),
            shape: shape.to_vec(),
            channel_names: None,
            chunk_by: chunk_by.to_vec(),
            regions_read: Mutex::new(Vec::new()),
        }
    }
}

impl ImageReader for FakeReader {
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
        self.regions_read.lock().unwrap().push(region.to_vec());
        let shape: Vec<usize> = region.iter().map(|r| r.end - r.start).collect();
        Ok(ArrayD::from_elem(IxDyn(&shape), self.value))
    }

    fn channel_names(&self) -> Result<Vec<String>> {
        match &self.channel_names {
            Some(names) => Ok(names.clone()),
            None => Ok(stack_reader::reader::default_channel_names(
                &self.dims,
                &self.shape,
            )),
        }
    }
}

/// Reader whose value at each position is its flat index
#[derive(Debug)]
pub struct RampReader {
    pub dims: DimensionOrder,
    pub shape: Vec<usize>,
    pub chunk_by: Vec<Dimension>,
}

impl RampReader {
    pub fn new(dims: &str, shape: &[usize], chunk_by: &[Dimension]) -> Self {
        Self {
            dims: dims.parse().unwrap(),
            shape: shape.to_vec(),
            chunk_by: chunk_by.to_vec(),
        }
    }

    pub fn full(&self) -> ArrayD<f32> {
        let n: usize = self.shape.iter().product();
        ArrayD::from_shape_vec(IxDyn(&self.shape), (0..n).map(|v| v as f32).collect()).unwrap()
    }
}

impl ImageReader for RampReader {
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
        stack_reader::reader::slice_region(&self.full(), region)
    }
}
