//! # Subtask
//!
//! Lazy, memoized asynchronous tasks for ad-hoc pipelines: fetch, transform,
//! pick a field, feed it into the next fetch.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: the [`Task`] handle and its state machine, the composition
//!   operators (`pipe`, `transform`, `pick`, `error`, `quiet`, `track`) and
//!   task-creator wrappers
//! - **[`pool`]**: the keyed memoization pool with optional expiry
//! - **[`fault`]**: deferred reporting of errors a task settled with
//! - **[`path`]**: dotted-path projection used by `pick`
//! - **[`config`]**, **[`logging`]**, **[`env`]**: configuration discovery and
//!   tracing setup
//!
//! ## Features
//!
//! - **At-most-once execution**: work runs on the first subscription only;
//!   every subscriber, early or late, receives the same result
//! - **Fan-in**: a mapping of named values and sub-tasks settles once every
//!   sub-task has, with each sub-task's errors collected into the parent
//! - **Deferred errors**: failures accumulate in a shared error log and are
//!   reported once, after settlement, unless the task is quiet
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use subtask::Task;
//!
//! #[tokio::main]
//! async fn main() {
//!     let search = Task::new(|_, resolver| {
//!         resolver.resolve(json!({"list": [1, 3, 0], "keyword": "test"}));
//!         Ok(())
//!     });
//!
//!     let product = search
//!         .pick("list.0")
//!         .pipe(|id| Task::literal(json!({"id": id, "title": "mocked product"})));
//!
//!     let result = product.await;
//!     println!("{}", result);
//! }
//! ```
//!
//! All deferred work is scheduled with `tokio::spawn`, so tasks must be
//! subscribed to from within a Tokio runtime.

pub mod config;
pub mod env;
pub mod fault;
pub mod logging;
pub mod path;
pub mod pool;
pub mod task;

// Re-export main task types
pub use task::creator::{after, before};
pub use task::{
    Entry, ErrorLog, InputShape, Resolver, Task, TaskError, TaskId, TaskInput, TaskState,
    is_task_like,
};

// Re-export fault reporting types
pub use fault::{ChannelSink, Fault, FaultSink, TracingSink};

// Re-export pool types
pub use pool::{BoundedCache, BoundedStore, ScopedPool, TaskCache};

// Re-export configuration types
pub use config::{LoggingConfig, PoolConfig, SubtaskConfig};
