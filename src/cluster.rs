//! Transient worker pools for parallel reads
//!
//! Every load builds a fresh [`LocalCluster`] (a dedicated Rayon thread pool),
//! hands a [`Client`] to the caller, and drops the pool when the scope exits.
//! Work goes out with [`Client::map`] and comes back with [`Client::gather`],
//! which yields results in completion order. Dropping a cluster blocks until
//! every task it accepted has finished, so no task outlives its scope.

use crate::errors::{Result, StackReaderError};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Configuration for a local cluster
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Process-style layout: one isolated worker per physical core
    pub processes: bool,
    /// Explicit worker count, overriding the core-based sizing
    pub num_workers: Option<usize>,
}

impl ClusterConfig {
    pub fn new(processes: bool) -> Self {
        Self {
            processes,
            num_workers: None,
        }
    }

    /// Use a specific number of workers
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = Some(num_workers);
        self
    }

    /// Number of workers the pool will be built with
    pub fn worker_count(&self) -> usize {
        let count = match (self.num_workers, self.processes) {
            (Some(n), _) => n,
            (None, true) => num_cpus::get_physical(),
            (None, false) => num_cpus::get(),
        };
        count.max(1)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Count of submitted tasks that have not finished yet
#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, usize> {
        // A panicking task never holds this lock, the count stays valid
        self.count.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start(self: &Arc<Self>) -> TaskGuard {
        *self.lock() += 1;
        TaskGuard(Arc::clone(self))
    }

    fn wait_idle(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self.idle.wait(count).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Marks one task as finished when dropped, including on panic
struct TaskGuard(Arc<InFlight>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let mut count = self.0.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// A dedicated worker pool that lives for one load
pub struct LocalCluster {
    pool: ThreadPool,
    config: ClusterConfig,
    in_flight: Arc<InFlight>,
}

impl LocalCluster {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        let workers = config.worker_count();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("stack-reader-worker-{}", i))
            .panic_handler(|_| log::error!("A worker task panicked"))
            .build()
            .map_err(|e| {
                StackReaderError::ThreadPool(format!(
                    "Failed to start a cluster with {} workers: {}",
                    workers, e
                ))
            })?;

        log::debug!(
            "Started local cluster with {} workers (processes={})",
            workers,
            config.processes
        );
        Ok(Self {
            pool,
            config,
            in_flight: Arc::default(),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn client(&self) -> Client<'_> {
        Client {
            pool: &self.pool,
            in_flight: &self.in_flight,
        }
    }

    /// Number of submitted tasks still queued or running
    pub fn pending_tasks(&self) -> usize {
        *self.in_flight.lock()
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        let pending = self.pending_tasks();
        if pending > 0 {
            log::debug!("Waiting for {} task(s) before shutting down", pending);
        }
        self.in_flight.wait_idle();
        log::debug!("Shutting down local cluster");
    }
}

/// Submits work to a [`LocalCluster`]
pub struct Client<'a> {
    pool: &'a ThreadPool,
    in_flight: &'a Arc<InFlight>,
}

/// Results of a [`Client::map`] call that have not been gathered yet
pub struct Futures<R> {
    receiver: Receiver<Result<R>>,
    pending: usize,
}

impl<R> Futures<R> {
    pub fn len(&self) -> usize {
        self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }
}

impl<'a> Client<'a> {
    /// Submit `func` once per input; tasks start immediately
    pub fn map<T, R, F>(&self, func: F, inputs: Vec<T>) -> Futures<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Result<R> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        let (sender, receiver) = channel();
        let pending = inputs.len();

        for input in inputs {
            let func = Arc::clone(&func);
            let sender = sender.clone();
            let task = self.in_flight.start();
            self.pool.spawn(move || {
                let _task = task;
                // The receiver is gone if the futures were dropped ungathered
                let _ = sender.send(func(input));
            });
        }

        Futures { receiver, pending }
    }

    /// Block until every task has reported, in completion order
    ///
    /// The first task error is returned as-is, but only after the remaining
    /// tasks have reported too. A task that panicked never reports, which
    /// surfaces as [`StackReaderError::WorkerLost`].
    pub fn gather<R>(&self, futures: Futures<R>) -> Result<Vec<R>> {
        let mut results = Vec::with_capacity(futures.pending);
        let mut first_error = None;
        let mut received = 0;

        while received < futures.pending {
            let Ok(result) = futures.receiver.recv() else {
                break;
            };
            received += 1;
            match result {
                Ok(value) => results.push(value),
                Err(e) => {
                    if first_error.is_none() {
                        log::debug!("Task failed, draining {} more", futures.pending - received);
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if received < futures.pending {
            return Err(StackReaderError::WorkerLost {
                expected: futures.pending,
                received,
            });
        }
        Ok(results)
    }

    /// Run `op` inside the cluster so nested parallel work uses its workers
    pub fn compute<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }
}

/// Start a cluster, run `body` with it, and shut it down again
///
/// The pool is released when this function returns, whether `body`
/// succeeded or not. Tasks `body` submitted but never gathered are waited
/// for before returning.
pub fn cluster_and_client<T, F>(config: ClusterConfig, body: F) -> Result<T>
where
    F: FnOnce(&LocalCluster, &Client<'_>) -> Result<T>,
{
    let cluster = LocalCluster::new(config)?;
    let client = cluster.client();
    body(&cluster, &client)
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub logical_cores: usize,
    pub physical_cores: usize,
    pub available_parallelism: usize,
}

/// Get information about the host's parallel capacity
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        logical_cores: num_cpus::get(),
        physical_cores: num_cpus::get_physical(),
        available_parallelism: std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
    }
}
