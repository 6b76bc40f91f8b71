//! Named worker pools.
//!
//! Every category of work gets its own set of OS threads, so a saturated category never blocks
//! submissions to another one. Pools hand jobs over through a zero-capacity channel: a job either
//! meets a worker already waiting for one, or gets a fresh thread up to the pool's max size, or
//! makes the submitter wait until a worker frees up.

use std::{
	fmt,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	thread::{self, JoinHandle},
};

use crossbeam_channel::{self as chan, RecvTimeoutError, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace};

use super::{
	config::{InterfaceConfig, PoolConfig},
	context::{ThreadInfo, ThreadMonitor},
	error::InterfaceError,
	task::panic_message,
};

/// A unit of work for a pool worker, receiving the worker's own [`ThreadInfo`].
pub type Job = Box<dyn FnOnce(&ThreadInfo) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
	DatabaseInterface,
	CancellableCalls,
	Background,
	Debugger,
	Timeout,
	TimeoutDaemon,
	CodeCompletion,
	ObjectLookup,
}

impl PoolKind {
	pub const ALL: [Self; 8] = [
		Self::DatabaseInterface,
		Self::CancellableCalls,
		Self::Background,
		Self::Debugger,
		Self::Timeout,
		Self::TimeoutDaemon,
		Self::CodeCompletion,
		Self::ObjectLookup,
	];

	/// Prefix of the names given to this pool's threads.
	#[must_use]
	pub const fn thread_name(self) -> &'static str {
		match self {
			Self::DatabaseInterface => "DBN - Database Interface Thread",
			Self::CancellableCalls => "DBN - Cancellable Calls Thread",
			Self::Background => "DBN - Background Thread",
			Self::Debugger => "DBN - Database Debugger Thread",
			Self::Timeout => "DBN - Timeout Execution Thread",
			Self::TimeoutDaemon => "DBN - Timeout Execution Daemon Thread",
			Self::CodeCompletion => "DBN - Code Completion Thread",
			Self::ObjectLookup => "DBN - Object Lookup Thread",
		}
	}

	#[must_use]
	pub const fn default_config(self) -> PoolConfig {
		match self {
			Self::Background | Self::TimeoutDaemon => PoolConfig::new(5, 200, true),
			Self::Debugger => PoolConfig::new(3, 20, true),
			Self::Timeout => PoolConfig::new(5, 100, false),
			Self::DatabaseInterface
			| Self::CancellableCalls
			| Self::CodeCompletion
			| Self::ObjectLookup => PoolConfig::new(5, 100, true),
		}
	}

	const fn index(self) -> usize {
		self as usize
	}
}

impl fmt::Display for PoolKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::DatabaseInterface => "database_interface",
			Self::CancellableCalls => "cancellable_calls",
			Self::Background => "background",
			Self::Debugger => "debugger",
			Self::Timeout => "timeout",
			Self::TimeoutDaemon => "timeout_daemon",
			Self::CodeCompletion => "code_completion",
			Self::ObjectLookup => "object_lookup",
		};
		f.write_str(name)
	}
}

/// A bounded set of worker threads dedicated to one [`PoolKind`].
pub struct WorkerPool {
	inner: Arc<PoolInner>,
}

struct PoolInner {
	kind: PoolKind,
	config: PoolConfig,
	jobs_tx: RwLock<Option<chan::Sender<Job>>>,
	jobs_rx: chan::Receiver<Job>,
	thread_count: AtomicUsize,
	next_thread_id: AtomicUsize,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for WorkerPool {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WorkerPool")
			.field("kind", &self.inner.kind)
			.field("config", &self.inner.config)
			.field("thread_count", &self.thread_count())
			.finish()
	}
}

impl WorkerPool {
	#[must_use]
	pub fn new(kind: PoolKind, config: PoolConfig) -> Self {
		let (jobs_tx, jobs_rx) = chan::bounded(0);

		Self {
			inner: Arc::new(PoolInner {
				kind,
				config,
				jobs_tx: RwLock::new(Some(jobs_tx)),
				jobs_rx,
				thread_count: AtomicUsize::new(0),
				next_thread_id: AtomicUsize::new(0),
				handles: Mutex::new(Vec::new()),
			}),
		}
	}

	#[must_use]
	pub fn kind(&self) -> PoolKind {
		self.inner.kind
	}

	#[must_use]
	pub fn config(&self) -> PoolConfig {
		self.inner.config
	}

	/// Live worker threads, busy or idle.
	#[must_use]
	pub fn thread_count(&self) -> usize {
		self.inner.thread_count.load(Ordering::Acquire)
	}

	/// Hands `job` to a worker, blocking while every one of the pool's `max_size` threads is busy.
	pub fn execute(&self, job: Job) -> Result<(), InterfaceError> {
		let kind = self.inner.kind;
		let jobs_tx = self
			.inner
			.jobs_tx
			.read()
			.clone()
			.ok_or(InterfaceError::PoolShutdown(kind))?;

		if self.inner.reserve_thread(self.inner.config.core_size) {
			return PoolInner::spawn_worker(&self.inner, job);
		}

		let job = match jobs_tx.try_send(job) {
			Ok(()) => return Ok(()),
			Err(TrySendError::Full(job)) => job,
			Err(TrySendError::Disconnected(_)) => return Err(InterfaceError::PoolShutdown(kind)),
		};

		if self.inner.reserve_thread(self.inner.config.max_size) {
			return PoolInner::spawn_worker(&self.inner, job);
		}

		trace!(pool = %kind, "Every worker is busy, waiting for one to free up;");

		jobs_tx
			.send(job)
			.map_err(|_| InterfaceError::PoolShutdown(kind))
	}

	/// Stops accepting jobs. Workers finish what they hold and exit; the ones of non-daemon pools
	/// are joined before this returns.
	#[instrument(skip(self), fields(pool = %self.inner.kind))]
	pub fn shutdown(&self) {
		self.inner.close();

		if self.inner.config.daemon {
			return;
		}

		let current = thread::current().id();
		let handles = std::mem::take(&mut *self.inner.handles.lock());

		for handle in handles {
			if handle.thread().id() == current {
				continue;
			}

			if let Err(payload) = handle.join() {
				error!(
					message = %panic_message(payload.as_ref()),
					"Worker thread exited with a panic;"
				);
			}
		}

		debug!("Worker pool shut down;");
	}
}

impl Drop for WorkerPool {
	fn drop(&mut self) {
		self.inner.close();
	}
}

impl PoolInner {
	#[allow(deprecated_in_future)] // `try_update` needs Rust 1.95; MSRV is 1.80
	fn reserve_thread(&self, limit: usize) -> bool {
		self.thread_count
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
				(count < limit).then_some(count + 1)
			})
			.is_ok()
	}

	/// Gives up an idle thread slot, as long as the pool keeps its core threads.
	#[allow(deprecated_in_future)]
	fn retire_thread(&self) -> bool {
		self.thread_count
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
				(count > self.config.core_size).then(|| count - 1)
			})
			.is_ok()
	}

	fn spawn_worker(this: &Arc<Self>, first_job: Job) -> Result<(), InterfaceError> {
		let thread_id = this.next_thread_id.fetch_add(1, Ordering::Relaxed) + 1;
		let name = format!("{} {thread_id}", this.kind.thread_name());

		let spawned = thread::Builder::new().name(name.clone()).spawn({
			let inner = Arc::clone(this);
			move || inner.work(first_job)
		});

		match spawned {
			Ok(handle) => {
				info!(pool = %this.kind, thread = %name, "Created thread;");

				if !this.config.daemon {
					let mut handles = this.handles.lock();
					handles.retain(|handle| !handle.is_finished());
					handles.push(handle);
				}

				Ok(())
			}
			Err(source) => {
				this.thread_count.fetch_sub(1, Ordering::AcqRel);
				Err(InterfaceError::Spawn {
					kind: this.kind,
					source,
				})
			}
		}
	}

	fn work(&self, first_job: Job) {
		let info = ThreadInfo::new();

		self.run_job(first_job, &info);

		loop {
			let next = if self.thread_count.load(Ordering::Acquire) > self.config.core_size {
				self.jobs_rx.recv_timeout(self.config.keep_alive())
			} else {
				self.jobs_rx
					.recv()
					.map_err(|chan::RecvError| RecvTimeoutError::Disconnected)
			};

			match next {
				Ok(job) => self.run_job(job, &info),
				Err(RecvTimeoutError::Timeout) => {
					if self.retire_thread() {
						debug!(pool = %self.kind, "Idle worker thread retired;");
						return;
					}
				}
				Err(RecvTimeoutError::Disconnected) => break,
			}
		}

		self.thread_count.fetch_sub(1, Ordering::AcqRel);
		trace!(pool = %self.kind, "Worker thread exiting;");
	}

	fn run_job(&self, job: Job, info: &ThreadInfo) {
		if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job(info))) {
			error!(
				pool = %self.kind,
				message = %panic_message(payload.as_ref()),
				"Job panicked on worker thread;"
			);
		}
	}

	fn close(&self) {
		self.jobs_tx.write().take();
	}
}

/// The process-wide set of worker pools, one per [`PoolKind`], plus the [`ThreadMonitor`]
/// counting activities across all of them.
///
/// Built once by the host and shared with every component needing a pool.
#[derive(Debug)]
pub struct WorkerPools {
	pools: [WorkerPool; PoolKind::ALL.len()],
	monitor: Arc<ThreadMonitor>,
}

impl WorkerPools {
	#[must_use]
	pub fn new(config: &InterfaceConfig) -> Self {
		Self {
			pools: PoolKind::ALL.map(|kind| WorkerPool::new(kind, config.pool(kind))),
			monitor: Arc::new(ThreadMonitor::new()),
		}
	}

	#[must_use]
	pub fn with_defaults() -> Self {
		Self::new(&InterfaceConfig::default())
	}

	#[must_use]
	pub fn pool(&self, kind: PoolKind) -> &WorkerPool {
		&self.pools[kind.index()]
	}

	#[must_use]
	pub fn timeout_pool(&self, daemon: bool) -> &WorkerPool {
		self.pool(if daemon {
			PoolKind::TimeoutDaemon
		} else {
			PoolKind::Timeout
		})
	}

	#[must_use]
	pub const fn monitor(&self) -> &Arc<ThreadMonitor> {
		&self.monitor
	}

	/// Closes every pool, waiting for the workers of non-daemon ones.
	pub fn shutdown(&self) {
		for pool in &self.pools {
			pool.shutdown();
		}
	}
}
