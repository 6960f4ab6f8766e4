//! A synchronization context: runs marshalled onto one captured thread.
//!
//! The owning thread pumps queued runs explicitly, the way a UI event loop
//! drains its message queue. Tests use it for deterministic scheduling.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use cadre_core::DispatchError;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error};

use super::dispatcher::{ExecutorService, Runnable};

struct Inner {
    name: String,
    owner: ThreadId,
    sender: Sender<Runnable>,
    receiver: Receiver<Runnable>,
    shut_down: AtomicBool,
}

/// Handle to a captured synchronization context. Clones share the queue.
#[derive(Clone)]
pub struct SyncContext {
    inner: Arc<Inner>,
}

impl SyncContext {
    /// Capture the calling thread.
    pub fn capture(name: impl Into<String>) -> Self {
        let (sender, receiver) = unbounded();
        let name = name.into();
        debug!("Captured synchronization context {}", name);
        Self {
            inner: Arc::new(Inner {
                name,
                owner: thread::current().id(),
                sender,
                receiver,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Context name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of queued runs.
    pub fn pending(&self) -> usize {
        self.inner.receiver.len()
    }

    /// Run the next queued run, if any.
    pub fn run_one(&self) -> Result<bool, DispatchError> {
        self.check_thread()?;
        match self.inner.receiver.try_recv() {
            Ok(runnable) => {
                self.execute_here(runnable);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Run queued runs until the queue is empty, including runs queued by
    /// the runs themselves. Returns how many ran.
    pub fn run_pending(&self) -> Result<usize, DispatchError> {
        let mut count = 0;
        while self.run_one()? {
            count += 1;
        }
        Ok(count)
    }

    /// Run queued runs as they arrive until `duration` has passed.
    pub fn run_for(&self, duration: Duration) -> Result<usize, DispatchError> {
        self.check_thread()?;
        let deadline = Instant::now().checked_add(duration);
        let mut count = 0;
        loop {
            let received = match deadline {
                Some(deadline) => self.inner.receiver.recv_deadline(deadline),
                None => self
                    .inner
                    .receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(runnable) => {
                    self.execute_here(runnable);
                    count += 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Ok(count)
                }
            }
        }
    }

    /// Pump until `done` returns true or `timeout` passes. Returns whether
    /// the condition was met.
    pub fn run_until<F>(&self, timeout: Duration, mut done: F) -> Result<bool, DispatchError>
    where
        F: FnMut() -> bool,
    {
        self.check_thread()?;
        let deadline = Instant::now().checked_add(timeout);
        let poll = Duration::from_millis(10);
        loop {
            self.run_pending()?;
            if done() {
                return Ok(true);
            }
            let now = Instant::now();
            let wait = match deadline {
                Some(deadline) if now >= deadline => return Ok(false),
                Some(deadline) => (deadline - now).min(poll),
                None => poll,
            };
            if let Ok(runnable) = self.inner.receiver.recv_timeout(wait) {
                self.execute_here(runnable);
            }
        }
    }

    fn check_thread(&self) -> Result<(), DispatchError> {
        if thread::current().id() == self.inner.owner {
            Ok(())
        } else {
            Err(DispatchError::WrongThread)
        }
    }

    fn execute_here(&self, runnable: Runnable) {
        if let Err(e) = panic::catch_unwind(AssertUnwindSafe(runnable)) {
            error!(
                "{}: run panicked: {:?}",
                self.inner.name,
                e.downcast_ref::<&str>().unwrap_or(&"<unknown panic>")
            );
        }
    }
}

impl ExecutorService for SyncContext {
    fn execute(&self, runnable: Runnable) -> Result<(), DispatchError> {
        if self.is_shutdown() {
            return Err(DispatchError::ShuttingDown(self.inner.name.clone()));
        }
        self.inner
            .sender
            .send(runnable)
            .map_err(|_| DispatchError::ShuttingDown(self.inner.name.clone()))
    }

    fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
    }

    fn is_shutdown(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("name", &self.inner.name)
            .field("owner", &self.inner.owner)
            .field("pending", &self.pending())
            .finish()
    }
}
