//! Thread pool backing the shared and pinned dispatchers.
//!
//! Workers pull mailbox runs from a shared channel. A panicking run is caught
//! and counted so one bad run cannot take a worker down with it.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, trace};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cadre_core::DispatchError;
use parking_lot::Mutex;
use thiserror::Error;

use super::dispatcher::{ExecutorService, Runnable};

/// Error when submitting a task to the thread pool
#[derive(Error, Debug)]
pub enum ThreadPoolError {
    /// The thread pool is shutting down
    #[error("thread pool is shutting down")]
    ShuttingDown,

    /// The task queue is full
    #[error("thread pool queue is full")]
    QueueFull,

    /// A worker thread could not be spawned
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl ThreadPoolError {
    /// Convert into the dispatcher-level error for the pool called `name`.
    pub fn into_dispatch_error(self, name: &str) -> DispatchError {
        match self {
            Self::ShuttingDown => DispatchError::ShuttingDown(name.to_string()),
            Self::QueueFull => DispatchError::Rejected {
                dispatcher: name.to_string(),
                reason: "queue is full".to_string(),
            },
            Self::Spawn(e) => DispatchError::ResourceExhausted(e.to_string()),
        }
    }
}

/// Statistics about the thread pool
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ThreadPoolStats {
    /// Number of tasks queued
    pub tasks_queued: usize,

    /// Number of tasks completed
    pub tasks_completed: usize,

    /// Number of tasks that panicked
    pub tasks_panicked: usize,

    /// Maximum task execution time (microseconds)
    pub max_execution_time_us: u64,
}

/// Configuration for the thread pool
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Maximum size of the task queue, or `None` for no limit
    pub queue_size: Option<usize>,

    /// Number of worker threads
    pub threads: usize,

    /// Name prefix for worker threads
    pub thread_name_prefix: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            queue_size: None,
            threads: num_cpus::get(),
            thread_name_prefix: "cadre-worker".to_string(),
        }
    }
}

/// Task with metadata for tracking
struct Task {
    func: Runnable,
    enqueued_at: Instant,
}

#[derive(Default)]
struct Counters {
    tasks_queued: AtomicUsize,
    tasks_completed: AtomicUsize,
    tasks_panicked: AtomicUsize,
    max_execution_time_us: AtomicUsize,
}

impl Counters {
    fn record_execution(&self, exec_time: Duration) {
        let exec_time_us = exec_time.as_micros() as usize;
        let mut current_max = self.max_execution_time_us.load(Ordering::Relaxed);
        while exec_time_us > current_max {
            match self.max_execution_time_us.compare_exchange(
                current_max,
                exec_time_us,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current_max = actual,
            }
        }
    }
}

/// A fixed-size pool of worker threads
pub struct ThreadPool {
    name: String,
    task_sender: Sender<Task>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    is_shutting_down: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl ThreadPool {
    /// Create a pool with `threads` workers and an unbounded queue
    pub fn new(threads: usize) -> Result<Self, ThreadPoolError> {
        Self::with_config(ThreadPoolConfig {
            threads,
            ..Default::default()
        })
    }

    /// Create a pool with the specified configuration
    pub fn with_config(config: ThreadPoolConfig) -> Result<Self, ThreadPoolError> {
        let (task_sender, task_receiver) = match config.queue_size {
            Some(size) => bounded(size),
            None => unbounded(),
        };
        let is_shutting_down = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());
        let threads = config.threads.max(1);

        info!(
            "Creating thread pool {} with {} workers",
            config.thread_name_prefix, threads
        );

        let pool = Self {
            name: config.thread_name_prefix.clone(),
            task_sender,
            workers: Mutex::new(Vec::with_capacity(threads)),
            is_shutting_down,
            counters,
        };

        for id in 0..threads {
            let receiver = task_receiver.clone();
            let shutdown_flag = Arc::clone(&pool.is_shutting_down);
            let counters = Arc::clone(&pool.counters);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, id))
                .spawn(move || Self::worker_loop(id, receiver, shutdown_flag, counters));

            match spawned {
                Ok(handle) => pool.workers.lock().push(handle),
                Err(e) => {
                    error!("Failed to spawn worker {} for {}: {}", id, pool.name, e);
                    pool.shutdown();
                    return Err(ThreadPoolError::Spawn(e));
                }
            }
        }

        Ok(pool)
    }

    /// Worker thread main loop
    fn worker_loop(
        id: usize,
        receiver: Receiver<Task>,
        shutdown_flag: Arc<AtomicBool>,
        counters: Arc<Counters>,
    ) {
        debug!("Worker {}: Starting", id);

        while !shutdown_flag.load(Ordering::Relaxed) {
            // Wait for a task or check shutdown flag every 100ms
            let task = match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(task) => task,
                Err(_) => continue,
            };

            trace!(
                "Worker {}: Executing task (queue time: {:.2}ms)",
                id,
                task.enqueued_at.elapsed().as_micros() as f64 / 1000.0
            );

            let exec_start = Instant::now();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task.func));
            let exec_time = exec_start.elapsed();
            counters.record_execution(exec_time);

            match result {
                Ok(()) => {
                    trace!(
                        "Worker {}: Task completed in {:.2}ms",
                        id,
                        exec_time.as_micros() as f64 / 1000.0
                    );
                    counters.tasks_completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!(
                        "Worker {}: Task panicked: {:?}",
                        id,
                        e.downcast_ref::<&str>().unwrap_or(&"<unknown panic>")
                    );
                    counters.tasks_panicked.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        debug!("Worker {}: Shutting down", id);
    }

    /// Submit a task to be executed by the thread pool
    pub fn execute<F>(&self, f: F) -> Result<(), ThreadPoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(f))
    }

    fn submit(&self, func: Runnable) -> Result<(), ThreadPoolError> {
        if self.is_shutting_down.load(Ordering::Relaxed) {
            return Err(ThreadPoolError::ShuttingDown);
        }

        let task = Task {
            func,
            enqueued_at: Instant::now(),
        };

        match self.task_sender.try_send(task) {
            Ok(_) => {
                self.counters.tasks_queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(ThreadPoolError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(ThreadPoolError::ShuttingDown),
        }
    }

    /// Get current statistics for the thread pool
    pub fn stats(&self) -> ThreadPoolStats {
        ThreadPoolStats {
            tasks_queued: self.counters.tasks_queued.load(Ordering::Relaxed),
            tasks_completed: self.counters.tasks_completed.load(Ordering::Relaxed),
            tasks_panicked: self.counters.tasks_panicked.load(Ordering::Relaxed),
            max_execution_time_us: self.counters.max_execution_time_us.load(Ordering::Relaxed)
                as u64,
        }
    }

    /// Stop accepting tasks. Workers exit after their current task.
    pub fn shutdown(&self) {
        if !self.is_shutting_down.swap(true, Ordering::Relaxed) {
            info!("Shutting down thread pool {}", self.name);
        }
    }

    /// Shut down and wait for the workers to exit.
    ///
    /// Must not be called from one of this pool's own workers.
    pub fn shutdown_and_join(&self) {
        self.shutdown();

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            worker.join().unwrap_or_else(|e| {
                error!("Worker thread panicked during shutdown: {:?}", e);
            });
        }

        info!("Thread pool {} shutdown complete", self.name);
    }

    /// Get the number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Check if the thread pool is shutting down
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::Relaxed)
    }
}

impl ExecutorService for ThreadPool {
    fn execute(&self, runnable: Runnable) -> Result<(), DispatchError> {
        self.submit(runnable)
            .map_err(|e| e.into_dispatch_error(&self.name))
    }

    fn shutdown(&self) {
        ThreadPool::shutdown(self);
    }

    fn is_shutdown(&self) -> bool {
        self.is_shutting_down()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
        // Workers notice the flag on their next poll
        debug!("Thread pool {} dropped", self.name);
    }
}
