//!
//! # Database Interface
//!
//! Scheduling of every call the navigator makes into a live database connection: metadata loads,
//! statement executions, explain plans, debugger round-trips.
//!
//! Calls are submitted as tasks to an [`InterfaceQueue`], which:
//! - Caps how many of them talk to the database at the same time;
//! - Always lets higher priority work through first once a slot frees up;
//! - Runs titled tasks under a progress indicator when the UI can afford one, silently otherwise;
//! - Supports waiting for the result or firing and forgetting, with failures of the latter ending
//!   up in the logs;
//! - Gives up waiting after a dead-man timeout, without ever interrupting the database call itself.
//!
//! Work runs on [`WorkerPools`], a registry of independent OS thread pools, one per category of
//! work, so a stuck category never starves another. Workers carry an explicit [`ThreadInfo`]
//! telling downstream code whether it runs in the background, under progress, inside a modal
//! dialog or under a timeout.
//!
//! Nested statements that must not disturb an outer transaction run inside [`with_savepoint`].
//!
//! ## Basic example
//!
//! ```
//! use std::sync::Arc;
//!
//! use dbnav_db_interface::{
//! 	check_cancellation, ExecStatus, Headless, InterfaceQueue, Priority, QueueConfig,
//! 	WorkerPools,
//! };
//!
//! let pools = Arc::new(WorkerPools::with_defaults());
//! let queue = InterfaceQueue::new(QueueConfig::default(), Arc::clone(&pools), Arc::new(Headless))
//! 	.expect("failed to start the interface queue");
//!
//! let columns = queue
//! 	.schedule_and_wait(Priority::High, "Loading columns", "EMPLOYEES", |ctx| {
//! 		check_cancellation!(ctx);
//! 		Ok(ExecStatus::Done(vec!["ID", "NAME", "SALARY"]))
//! 	})
//! 	.expect("task failed");
//!
//! assert_eq!(columns.len(), 3);
//!
//! queue.shutdown();
//! pools.shutdown();
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![deny(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod call;
mod config;
mod context;
mod dispatcher;
mod error;
mod pool;
mod queue;
mod savepoint;
mod task;
mod ui;

pub use call::{run_cancellable, run_with_timeout};
pub use config::{InterfaceConfig, PoolConfig, QueueConfig};
pub use context::{ActivityFlags, ActivityProperty, ThreadInfo, ThreadMonitor};
pub use error::{DatabaseError, InterfaceError};
pub use pool::{Job, PoolKind, WorkerPool, WorkerPools};
pub use queue::{InterfaceQueue, QueueMetrics};
pub use savepoint::{with_savepoint, Connection, ConnectionHandle};
pub use task::{
	Callable, ExecStatus, Priority, TaskContext, TaskDefinition, TaskHandle, TaskId, TaskStatus,
};
pub use ui::{DispatchPath, Headless, HostUi, ProgressInfo};
