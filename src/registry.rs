//! Ordered set of reader formats and format detection

use crate::errors::{Result, StackReaderError};
use crate::formats::{NetcdfFormat, NpyFormat, RasterFormat, ZarrFormat};
use crate::reader::ReaderFormat;
use std::path::Path;
use std::sync::Arc;

/// Registry of available reader formats
///
/// Formats are probed highest priority first; ties keep registration order.
#[derive(Debug, Clone)]
pub struct ReaderRegistry {
    formats: Vec<Arc<dyn ReaderFormat>>,
}

impl ReaderRegistry {
    /// Registry with no formats
    pub fn empty() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Registry with every built-in format
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ZarrFormat));
        registry.register(Arc::new(NetcdfFormat::default()));
        registry.register(Arc::new(NpyFormat));
        registry.register(Arc::new(RasterFormat));
        registry
    }

    /// Register a new format
    pub fn register(&mut self, format: Arc<dyn ReaderFormat>) {
        self.formats.push(format);
        // Stable sort keeps registration order among equal priorities
        self.formats.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn formats(&self) -> &[Arc<dyn ReaderFormat>] {
        &self.formats
    }

    /// Names of registered formats, in probe order
    pub fn format_names(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.name()).collect()
    }

    /// Find the format that claims `path`
    ///
    /// # Errors
    ///
    /// Returns [`StackReaderError::UnsupportedFileFormat`] when no format does.
    pub fn determine_reader(&self, path: &Path) -> Result<Arc<dyn ReaderFormat>> {
        self.formats
            .iter()
            .find(|f| f.is_this_type(path))
            .map(|f| {
                log::debug!("{} is handled by the {} reader", path.display(), f.name());
                Arc::clone(f)
            })
            .ok_or_else(|| StackReaderError::UnsupportedFileFormat {
                path: path.to_path_buf(),
            })
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
