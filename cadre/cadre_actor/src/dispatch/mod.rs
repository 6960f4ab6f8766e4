//! Dispatchers map mailboxes onto execution resources.
//!
//! Three resources are provided:
//! - a shared thread pool (`Dispatcher` tag)
//! - a dedicated single thread per actor (`PinnedDispatcher` tag)
//! - a captured synchronization context (`SynchronizedDispatcher` tag)

mod dispatcher;
mod registry;
mod sync_context;
mod thread_pool;

pub use dispatcher::{
    Dispatcher, DispatcherSettings, ExecutorService, Runnable, DEFAULT_DISPATCHER_ID,
};
pub use registry::{
    DispatcherConfigurator, DispatcherFactory, DispatcherRegistry, Dispatchers,
    PinnedConfigurator, SharedPoolConfigurator, SynchronizedConfigurator,
};
pub use sync_context::SyncContext;
pub use thread_pool::{ThreadPool, ThreadPoolConfig, ThreadPoolError, ThreadPoolStats};
