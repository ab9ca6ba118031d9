//! Host hook entry points
//!
//! The plugin registers twice with the viewer: once loading everything into
//! memory, once handing back lazy plane-chunked arrays. Both spread the
//! per-file reads over a process-style cluster.

/// Reads the whole stack into memory before returning
pub mod in_memory {
    use crate::plugin::{get_reader as probe, PathSet, ReaderFunction};

    pub fn get_reader(path: impl Into<PathSet>) -> Option<ReaderFunction> {
        probe(path, true, true)
    }
}

/// Returns a lazy stack; planes are read when the viewer asks for them
pub mod out_of_memory {
    use crate::plugin::{get_reader as probe, PathSet, ReaderFunction};

    pub fn get_reader(path: impl Into<PathSet>) -> Option<ReaderFunction> {
        probe(path, false, true)
    }
}
