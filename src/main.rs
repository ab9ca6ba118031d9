//! Entry point for the stackread tool.
//! Probes the given paths, loads them as the viewer plugin would and reports the resulting layer.

use clap::Parser;
use stack_reader::cluster::get_parallel_info;
use stack_reader::formats::{ZarrWriteOptions, ZarrWriter};
use stack_reader::lazy::LayerArray;
use stack_reader::plugin::{get_reader_with, ReaderOptions};
use stack_reader::registry::ReaderRegistry;
use std::process::ExitCode;
use std::sync::Arc;

mod cli;

use cli::Args;

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let registry = Arc::new(ReaderRegistry::new());

    if args.list_formats {
        for format in registry.formats() {
            println!("{} (priority {})", format.name(), format.priority());
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.verbose {
        let info = get_parallel_info();
        println!(
            "Cores: {} logical, {} physical, {} available",
            info.logical_cores, info.physical_cores, info.available_parallelism
        );
    }

    let mut options = ReaderOptions::new(args.in_memory || args.output.is_some(), !args.threads_only);
    if let Some(threads) = args.threads {
        options = options.with_workers(threads);
    }

    let Some(reader) = get_reader_with(Arc::clone(&registry), args.paths.clone(), options) else {
        eprintln!(
            "No registered reader supports {}",
            args.paths[0].display()
        );
        return Ok(ExitCode::from(2));
    };

    let layers = reader.read(args.paths.clone())?;

    for (data, meta) in layers {
        println!("Loaded {} path(s)", args.paths.len());
        println!("   Shape: {:?}", data.shape());
        println!("   Data type: f16");
        println!("   In memory: {}", !data.is_lazy());
        println!("   Channel axis: {:?}", meta.channel_axis);
        println!("   Channel names: {:?}", meta.name);

        if args.json {
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }

        if let Some(output) = &args.output {
            let array = match data {
                LayerArray::InMemory(array) => array,
                lazy => lazy.compute()?,
            };
            let writer = ZarrWriter::new(output);
            writer.write_array(
                &array.mapv(f32::from),
                &ZarrWriteOptions {
                    channel_names: meta.name.clone(),
                    ..Default::default()
                },
            )?;
            println!("Saved stack to {}", output.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
