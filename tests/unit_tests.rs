//! Unit tests for the building blocks: errors, dimensions, the cluster,
//! lazy arrays and the format registry.

mod common;

use common::{FakeFormat, FakeReader, RampReader};
use half::f16;
use ndarray::{ArrayD, IxDyn};
use stack_reader::{
    cluster::{cluster_and_client, get_parallel_info, ClusterConfig, LocalCluster},
    dimensions::{Dimension, DimensionOrder, DEFAULT_CHUNK_DIMS, PLANE_CHUNK_DIMS},
    errors::{Result, StackReaderError},
    lazy::{squeeze, LayerArray, LazyImage, LazyStack},
    plugin::PathSet,
    reader::{chunk_shape, default_channel_names, ImageReader},
    registry::ReaderRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_error_types() {
    let unsupported = StackReaderError::UnsupportedFileFormat {
        path: PathBuf::from("notes.txt"),
    };
    assert!(unsupported.is_unsupported_format());
    assert!(format!("{}", unsupported).contains("notes.txt"));

    let generic = StackReaderError::Generic("Test error".to_string());
    assert_eq!(format!("{}", generic), "Test error");
    assert!(!generic.is_unsupported_format());

    let mismatch = StackReaderError::StackShapeMismatch {
        index: 2,
        expected: vec![3, 4],
        found: vec![4, 4],
    };
    assert!(format!("{}", mismatch).contains("Cannot stack image 2"));

    let lost = StackReaderError::WorkerLost {
        expected: 3,
        received: 1,
    };
    assert_eq!(format!("{}", lost), "Worker lost: gathered 1 of 3 results");
}

#[test]
fn test_dimension_order_parsing() -> Result<()> {
    let order: DimensionOrder = "TCZYX".parse()?;
    assert_eq!(order.len(), 5);
    assert_eq!(order.index_of(Dimension::Channel), Some(1));
    assert_eq!(order.index_of(Dimension::Scene), None);
    assert_eq!(order.to_string(), "TCZYX");

    // Lowercase letters are accepted
    let lower: DimensionOrder = "zyx".parse()?;
    assert_eq!(lower.to_string(), "ZYX");

    assert!("TCQ".parse::<DimensionOrder>().is_err());
    assert!("YXY".parse::<DimensionOrder>().is_err());
    Ok(())
}

#[test]
fn test_dimension_guess_and_names() -> Result<()> {
    assert_eq!(DimensionOrder::guess(2)?.to_string(), "YX");
    assert_eq!(DimensionOrder::guess(4)?.to_string(), "CZYX");
    assert_eq!(DimensionOrder::guess(6)?.to_string(), "STCZYX");
    assert!(DimensionOrder::guess(7).is_err());

    let named = DimensionOrder::from_names(&["time", "channel", "lat", "lon"])?;
    assert_eq!(named.to_string(), "TCYX");

    // Unknown names fall back to the guess
    let fallback = DimensionOrder::from_names(&["a", "b", "c"])?;
    assert_eq!(fallback.to_string(), "ZYX");

    // Names that collapse onto the same dimension also fall back
    let repeated = DimensionOrder::from_names(&["y", "lat"])?;
    assert_eq!(repeated.to_string(), "YX");

    let order: DimensionOrder = "CYX".parse()?;
    assert!(order.check_rank(&[2, 3, 4]).is_ok());
    assert!(order.check_rank(&[3, 4]).is_err());
    Ok(())
}

#[test]
fn test_chunk_shape_and_channel_names() -> Result<()> {
    let order: DimensionOrder = "TCZYX".parse()?;
    let shape = [2, 3, 4, 5, 6];
    assert_eq!(chunk_shape(&order, &shape, &PLANE_CHUNK_DIMS), vec![1, 1, 1, 5, 6]);
    assert_eq!(chunk_shape(&order, &shape, &DEFAULT_CHUNK_DIMS), vec![1, 1, 4, 5, 6]);

    assert_eq!(default_channel_names(&order, &shape), vec!["0", "1", "2"]);
    let no_channel: DimensionOrder = "ZYX".parse()?;
    assert!(default_channel_names(&no_channel, &[4, 5, 6]).is_empty());
    Ok(())
}

#[test]
fn test_cluster_config() {
    let threaded = ClusterConfig::new(false);
    assert!(!threaded.processes);
    assert!(threaded.worker_count() > 0);

    let processes = ClusterConfig::default();
    assert!(processes.processes);
    assert!(processes.worker_count() > 0);

    let fixed = ClusterConfig::new(true).with_workers(3);
    assert_eq!(fixed.worker_count(), 3);
    assert_eq!(ClusterConfig::new(true).with_workers(0).worker_count(), 1);

    let info = get_parallel_info();
    assert!(info.logical_cores > 0);
    assert!(info.physical_cores > 0);
    assert!(info.available_parallelism > 0);
}

#[test]
fn test_cluster_gathers_in_completion_order() -> Result<()> {
    let cluster = LocalCluster::new(ClusterConfig::new(false).with_workers(4))?;
    assert_eq!(cluster.num_workers(), 4);
    let client = cluster.client();

    let futures = client.map(
        |i: u64| {
            thread::sleep(Duration::from_millis((3 - i) * 60));
            Ok(i)
        },
        vec![0, 1, 2, 3],
    );
    assert_eq!(futures.len(), 4);

    let results = client.gather(futures)?;
    assert_eq!(results.len(), 4);
    assert_eq!(results[0], 3);
    assert_eq!(results[3], 0);
    Ok(())
}

#[test]
fn test_cluster_propagates_task_errors() {
    let result = cluster_and_client(ClusterConfig::new(false).with_workers(2), |_, client| {
        let futures = client.map(
            |i: usize| {
                if i == 1 {
                    Err(StackReaderError::Generic("bad file".to_string()))
                } else {
                    Ok(i)
                }
            },
            vec![0, 1, 2],
        );
        client.gather(futures)
    });

    match result {
        Err(StackReaderError::Generic(msg)) => assert_eq!(msg, "bad file"),
        other => panic!("Expected the task error, got {:?}", other),
    }
}

#[test]
fn test_cluster_waits_for_tasks_after_an_error() {
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finished);

    let result = cluster_and_client(ClusterConfig::new(false).with_workers(2), |_, client| {
        let futures = client.map(
            move |i: usize| {
                if i == 0 {
                    return Err(StackReaderError::Generic("first file unreadable".to_string()));
                }
                thread::sleep(Duration::from_millis(300));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(i)
            },
            vec![0, 1],
        );
        client.gather(futures)
    });

    match result {
        Err(StackReaderError::Generic(msg)) => assert_eq!(msg, "first file unreadable"),
        other => panic!("Expected the task error, got {:?}", other),
    }
    // The slow task finished before the cluster scope returned
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cluster_drop_waits_for_ungathered_tasks() -> Result<()> {
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finished);

    let submitted = cluster_and_client(ClusterConfig::new(false).with_workers(2), |cluster, client| {
        let futures = client.map(
            move |i: usize| {
                thread::sleep(Duration::from_millis(100 * (i as u64 + 1)));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(i)
            },
            vec![0, 1, 2],
        );
        assert!(cluster.pending_tasks() > 0);
        Ok(futures.len())
    })?;

    assert_eq!(submitted, 3);
    assert_eq!(finished.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn test_cluster_reports_panicked_worker() {
    let result = cluster_and_client(ClusterConfig::new(false).with_workers(2), |_, client| {
        let futures = client.map(
            |i: usize| {
                if i == 0 {
                    panic!("reader crashed");
                }
                Ok(i)
            },
            vec![0, 1],
        );
        client.gather(futures)
    });

    match result {
        Err(StackReaderError::WorkerLost { expected, received }) => {
            assert_eq!(expected, 2);
            assert_eq!(received, 1);
        }
        other => panic!("Expected WorkerLost, got {:?}", other),
    }
}

#[test]
fn test_cluster_compute_runs_on_workers() -> Result<()> {
    let workers = cluster_and_client(ClusterConfig::new(false).with_workers(3), |_, client| {
        Ok(client.compute(rayon::current_num_threads))
    })?;
    assert_eq!(workers, 3);
    Ok(())
}

#[test]
fn test_squeeze() {
    let array = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 1, 4, 1]));
    assert_eq!(squeeze(array).shape(), &[3, 4]);

    let scalar = squeeze(ArrayD::<f32>::zeros(IxDyn(&[1, 1])));
    assert_eq!(scalar.ndim(), 0);
}

#[test]
fn test_lazy_image_squeezes_and_casts() -> Result<()> {
    let reader = Arc::new(RampReader::new("TCZYX", &[1, 2, 1, 3, 4], &PLANE_CHUNK_DIMS));
    let expected = squeeze(reader.full()).mapv(f16::from_f32);
    let lazy = LazyImage::new(reader.clone())?;

    assert_eq!(lazy.shape(), vec![2, 3, 4]);
    assert_eq!(lazy.raw_shape(), &[1, 2, 1, 3, 4]);
    assert_eq!(lazy.ndim(), 3);
    assert_eq!(lazy.chunk_shape(), vec![1, 3, 4]);
    assert_eq!(lazy.num_chunks(), 2);

    let computed: ArrayD<f16> = lazy.compute()?;
    assert_eq!(computed, expected);

    // Second channel, one row, squeezed coordinates
    let row = lazy.get(&[1..2, 2..3, 0..4])?;
    assert_eq!(row.shape(), &[1, 1, 4]);
    assert_eq!(row[[0, 0, 0]], f16::from_f32(20.0));
    assert_eq!(row[[0, 0, 3]], f16::from_f32(23.0));

    assert!(lazy.get(&[0..1, 0..1]).is_err());
    assert!(lazy.get(&[0..3, 0..3, 0..4]).is_err());
    Ok(())
}

#[test]
fn test_lazy_image_reads_only_requested_planes() -> Result<()> {
    let reader = Arc::new(FakeReader::new(7.0, "ZYX", &[5, 8, 8], &PLANE_CHUNK_DIMS));
    let lazy = LazyImage::new(reader.clone())?;
    assert!(reader.regions_read.lock().unwrap().is_empty());

    let plane = lazy.get(&[2..3, 0..8, 0..8])?;
    assert_eq!(plane.shape(), &[1, 8, 8]);
    assert!(plane.iter().all(|&v| v == f16::from_f32(7.0)));
    assert_eq!(reader.regions_read.lock().unwrap().len(), 1);

    // Computing walks one chunk per Z plane
    lazy.compute()?;
    assert_eq!(reader.regions_read.lock().unwrap().len(), 1 + 5);
    Ok(())
}

#[test]
fn test_lazy_stack() -> Result<()> {
    let members: Vec<LazyImage> = (0..3)
        .map(|i| {
            let reader: Arc<dyn ImageReader> =
                Arc::new(FakeReader::new(i as f32, "ZYX", &[2, 3, 4], &PLANE_CHUNK_DIMS));
            LazyImage::new(reader)
        })
        .collect::<Result<_>>()?;
    let stack = LazyStack::new(members)?;

    assert_eq!(stack.len(), 3);
    assert_eq!(stack.shape(), vec![3, 2, 3, 4]);
    assert_eq!(stack.member(1).map(LazyImage::shape), Some(vec![2, 3, 4]));
    assert!(stack.member(3).is_none());

    let layer = LayerArray::Lazy(stack);
    assert!(layer.is_lazy());
    assert!(layer.as_in_memory().is_none());

    let data = layer.compute()?;
    assert_eq!(data.shape(), &[3, 2, 3, 4]);
    for i in 0..3 {
        assert_eq!(data[[i, 1, 2, 3]], f16::from_f32(i as f32));
    }
    Ok(())
}

#[test]
fn test_lazy_stack_rejects_mismatched_shapes() -> Result<()> {
    let a = LazyImage::new(Arc::new(FakeReader::new(0.0, "YX", &[3, 4], &PLANE_CHUNK_DIMS)))?;
    let b = LazyImage::new(Arc::new(FakeReader::new(1.0, "YX", &[4, 4], &PLANE_CHUNK_DIMS)))?;

    match LazyStack::new(vec![a, b]) {
        Err(StackReaderError::StackShapeMismatch {
            index,
            expected,
            found,
        }) => {
            assert_eq!(index, 1);
            assert_eq!(expected, vec![3, 4]);
            assert_eq!(found, vec![4, 4]);
        }
        other => panic!("Expected StackShapeMismatch, got {:?}", other),
    }

    assert!(matches!(
        LazyStack::new(Vec::new()),
        Err(StackReaderError::EmptyPathSet)
    ));
    Ok(())
}

#[test]
fn test_registry_detection() {
    let mut registry = ReaderRegistry::new();
    assert_eq!(registry.format_names(), vec!["zarr", "netcdf", "npy", "raster"]);

    let missing = registry.determine_reader(Path::new("/no/such/file.npy"));
    assert!(matches!(
        missing,
        Err(StackReaderError::UnsupportedFileFormat { .. })
    ));

    registry.register(Arc::new(FakeFormat::new("YX", &[2, 2])));
    assert_eq!(registry.format_names()[0], "fake");

    let found = registry
        .determine_reader(Path::new("img4.fake"))
        .expect("fake format should claim img4.fake");
    assert_eq!(found.name(), "fake");

    assert!(ReaderRegistry::empty()
        .determine_reader(Path::new("img4.fake"))
        .is_err());
}

#[test]
fn test_path_set_conversions() {
    let single = PathSet::from("a.zarr");
    assert_eq!(single.len(), 1);
    assert_eq!(single.first(), Some(Path::new("a.zarr")));

    let many = PathSet::from(vec!["a.npy", "b.npy", "c.npy"]);
    assert_eq!(many.len(), 3);
    assert_eq!(many.paths()[2], PathBuf::from("c.npy"));

    let empty = PathSet::from(Vec::<PathBuf>::new());
    assert!(empty.is_empty());
    assert!(empty.first().is_none());
}
