//! Defines command-line interface options using `clap` for the stackread tool.

use clap::Parser;
use std::path::PathBuf;

/// Probe, load and stack multi-dimensional images the way a viewer would
#[derive(Parser, Debug)]
#[command(
    version,
    name = "stackread",
    about = "Load one or more image files into a single stacked array"
)]
pub struct Args {
    /// Image files or Zarr stores, stacked in the given order
    #[arg(required_unless_present = "list_formats")]
    pub paths: Vec<PathBuf>,

    /// Read the whole stack into memory instead of returning a lazy stack
    #[arg(long, default_value_t = false)]
    pub in_memory: bool,

    /// Use a threaded cluster layout instead of the process-style one
    #[arg(long, default_value_t = false)]
    pub threads_only: bool,

    /// Number of workers for the load cluster. Defaults to the number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Write the computed stack to this Zarr store
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the layer metadata as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// List the registered formats and exit
    #[arg(long, default_value_t = false)]
    pub list_formats: bool,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}
