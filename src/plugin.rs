//! Viewer-facing reader plugin: capability probe, per-path load, orchestration
//!
//! The host viewer calls [`get_reader`] with whatever the user opened. If the
//! first path is readable it gets back a [`ReaderFunction`]; calling that loads
//! every path on a transient cluster, stacks the images along a new leading
//! axis and returns a single layer with its display metadata.

use crate::cluster::{cluster_and_client, ClusterConfig};
use crate::dimensions::{Dimension, DEFAULT_CHUNK_DIMS, PLANE_CHUNK_DIMS};
use crate::errors::{Result, StackReaderError};
use crate::lazy::{LayerArray, LazyImage, LazyStack};
use crate::reader::ReaderFormat;
use crate::registry::ReaderRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One path or an ordered list of paths, assumed to be stackable
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathSet(Vec<PathBuf>);

impl PathSet {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self(paths)
    }

    /// The path used for format detection
    pub fn first(&self) -> Option<&Path> {
        self.0.first().map(PathBuf::as_path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<PathBuf> for PathSet {
    fn from(path: PathBuf) -> Self {
        Self(vec![path])
    }
}

impl From<&Path> for PathSet {
    fn from(path: &Path) -> Self {
        Self(vec![path.to_path_buf()])
    }
}

impl From<&str> for PathSet {
    fn from(path: &str) -> Self {
        Self(vec![PathBuf::from(path)])
    }
}

impl From<String> for PathSet {
    fn from(path: String) -> Self {
        Self(vec![PathBuf::from(path)])
    }
}

impl From<Vec<PathBuf>> for PathSet {
    fn from(paths: Vec<PathBuf>) -> Self {
        Self(paths)
    }
}

impl From<&[PathBuf]> for PathSet {
    fn from(paths: &[PathBuf]) -> Self {
        Self(paths.to_vec())
    }
}

impl From<Vec<&str>> for PathSet {
    fn from(paths: Vec<&str>) -> Self {
        Self(paths.into_iter().map(PathBuf::from).collect())
    }
}

impl From<Vec<String>> for PathSet {
    fn from(paths: Vec<String>) -> Self {
        Self(paths.into_iter().map(PathBuf::from).collect())
    }
}

/// Per-path load output, tagged with its position in the input
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub data: LazyImage,
    pub index: usize,
    pub channel_axis: Option<usize>,
    pub channel_names: Option<Vec<String>>,
}

/// Display metadata handed to the viewer alongside the array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMetadata {
    pub name: Option<Vec<String>>,
    pub channel_axis: Option<usize>,
    pub is_pyramid: bool,
    pub visible: bool,
}

/// An array with its metadata
pub type LayerData = (LayerArray, LayerMetadata);

/// Flags chosen by the hook that created the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Materialise the stacked array before returning
    pub compute: bool,
    /// Process-style worker layout for the load cluster
    pub processes: bool,
    /// Explicit worker count for the load cluster
    pub num_workers: Option<usize>,
}

impl ReaderOptions {
    pub fn new(compute: bool, processes: bool) -> Self {
        Self {
            compute,
            processes,
            num_workers: None,
        }
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = Some(num_workers);
        self
    }

    fn cluster_config(&self) -> ClusterConfig {
        let config = ClusterConfig::new(self.processes);
        match self.num_workers {
            Some(n) => config.with_workers(n),
            None => config,
        }
    }
}

/// Load one path with an already determined format
///
/// In-memory loads keep the reader's default chunking; lazy loads chunk by
/// single YX planes, since the viewer only ever displays planes.
pub fn load_image(
    path: &Path,
    format: &dyn ReaderFormat,
    index: usize,
    compute: bool,
) -> Result<LoadResult> {
    let chunk_by: &[Dimension] = if compute {
        &DEFAULT_CHUNK_DIMS
    } else {
        &PLANE_CHUNK_DIMS
    };
    let reader = format.open(path, chunk_by)?;

    let channel_axis = reader.dims().index_of(Dimension::Channel);
    let channel_names = match channel_axis {
        Some(_) => Some(reader.channel_names()?),
        None => None,
    };

    Ok(LoadResult {
        data: LazyImage::new(reader)?,
        index,
        channel_axis,
        channel_names,
    })
}

/// Load every path and stack them into a single layer
pub fn reader_function(
    paths: impl Into<PathSet>,
    compute: bool,
    processes: bool,
) -> Result<Vec<LayerData>> {
    reader_function_with(
        &ReaderRegistry::new(),
        paths,
        ReaderOptions::new(compute, processes),
    )
}

/// [`reader_function`] against an explicit registry
pub fn reader_function_with(
    registry: &ReaderRegistry,
    paths: impl Into<PathSet>,
    options: ReaderOptions,
) -> Result<Vec<LayerData>> {
    log::info!("Reader will load image in-memory: {}", options.compute);

    let paths = paths.into();
    let first = paths.first().ok_or(StackReaderError::EmptyPathSet)?;

    // Paths are assumed stackable, hence of one format
    let format = registry.determine_reader(first)?;
    let compute = options.compute;
    let inputs: Vec<(usize, PathBuf)> = paths.paths().iter().cloned().enumerate().collect();

    cluster_and_client(options.cluster_config(), |_cluster, client| {
        let task_format = Arc::clone(&format);
        let futures = client.map(
            move |(index, path): (usize, PathBuf)| {
                load_image(&path, task_format.as_ref(), index, compute)
            },
            inputs,
        );

        let mut results = client.gather(futures)?;
        results.sort_by_key(|result| result.index);

        // Metadata of the first image stands in for all of them
        let first = results.first().ok_or(StackReaderError::EmptyPathSet)?;
        let meta = LayerMetadata {
            name: first.channel_names.clone(),
            // The stack adds a leading axis
            channel_axis: first.channel_axis.map(|axis| axis + 1),
            is_pyramid: false,
            visible: false,
        };

        let stack = LazyStack::new(results.into_iter().map(|result| result.data).collect())?;
        let data = if compute {
            LayerArray::InMemory(client.compute(|| stack.compute())?)
        } else {
            LayerArray::Lazy(stack)
        };

        log::info!(
            "Loaded {} image(s) as {:?} (channel_axis={:?})",
            paths.len(),
            data.shape(),
            meta.channel_axis
        );
        Ok(vec![(data, meta)])
    })
}

/// A ready-to-call loader bound to the flags of the hook that produced it
#[derive(Debug, Clone)]
pub struct ReaderFunction {
    registry: Arc<ReaderRegistry>,
    options: ReaderOptions,
}

impl ReaderFunction {
    pub fn options(&self) -> ReaderOptions {
        self.options
    }

    /// Load `paths` into a single stacked layer
    pub fn read(&self, paths: impl Into<PathSet>) -> Result<Vec<LayerData>> {
        reader_function_with(&self.registry, paths, self.options)
    }
}

/// Capability probe against the built-in formats
///
/// Returns `None` when no reader claims the first path.
pub fn get_reader(
    paths: impl Into<PathSet>,
    compute: bool,
    processes: bool,
) -> Option<ReaderFunction> {
    get_reader_with(
        Arc::new(ReaderRegistry::new()),
        paths,
        ReaderOptions::new(compute, processes),
    )
}

/// Capability probe against an explicit registry
pub fn get_reader_with(
    registry: Arc<ReaderRegistry>,
    paths: impl Into<PathSet>,
    options: ReaderOptions,
) -> Option<ReaderFunction> {
    let paths = paths.into();
    let first = paths.first()?;

    // Only the first path is probed; the rest are assumed to match
    match registry.determine_reader(first) {
        Ok(_) => Some(ReaderFunction { registry, options }),
        Err(e) if e.is_unsupported_format() => {
            log::debug!("{}", e);
            None
        }
        Err(e) => {
            log::warn!("Format detection failed for {}: {}", first.display(), e);
            None
        }
    }
}
