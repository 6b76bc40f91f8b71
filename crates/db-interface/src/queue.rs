use std::{
	cmp::Ordering as CmpOrdering,
	collections::BinaryHeap,
	fmt,
	sync::{
		atomic::{AtomicU64, AtomicUsize, Ordering},
		Arc,
	},
	thread,
	time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, error, instrument, trace};

use super::{
	config::QueueConfig,
	dispatcher::Dispatcher,
	error::{DatabaseError, InterfaceError},
	pool::WorkerPools,
	task::{
		ExecStatus, InterfaceTask, OutcomeKind, Priority, QueuedTask, TaskContext,
		TaskDefinition, TaskHandle, TaskId,
	},
	ui::HostUi,
};

const DISPATCHER_THREAD_NAME: &str = "DBN - Interface Queue Dispatcher";

/// A point-in-time view of the queue's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueMetrics {
	pub queue_size: usize,
	pub active_tasks: usize,
	pub max_active_tasks: usize,
	pub finished_tasks: usize,
	pub failed_tasks: usize,
	pub progress_dispatches: usize,
	pub background_dispatches: usize,
}

/// Admission-controlled priority queue of database interface tasks.
///
/// At most [`QueueConfig::max_active_tasks`] tasks are running at any time. Whenever a slot
/// frees up, the waiting task with the highest priority is handed to the dispatcher, ties going
/// to the one submitted first.
pub struct InterfaceQueue {
	shared: Arc<QueueShared>,
}

struct QueueShared {
	config: QueueConfig,
	ui: Arc<dyn HostUi>,
	dispatcher: Arc<Dispatcher>,
	state: Mutex<QueueState>,
	changed: Condvar,
	active: AtomicUsize,
	finished: AtomicUsize,
	failed: AtomicUsize,
	sequence: AtomicU64,
}

#[derive(Default)]
struct QueueState {
	pending: BinaryHeap<Queued>,
	shutdown: bool,
}

struct Queued {
	priority: Priority,
	sequence: u64,
	task: Box<dyn QueuedTask>,
}

impl PartialEq for Queued {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == CmpOrdering::Equal
	}
}

impl Eq for Queued {}

impl PartialOrd for Queued {
	fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
		Some(self.cmp(other))
	}
}

impl Ord for Queued {
	fn cmp(&self, other: &Self) -> CmpOrdering {
		self.priority
			.cmp(&other.priority)
			.then_with(|| other.sequence.cmp(&self.sequence))
	}
}

impl fmt::Debug for InterfaceQueue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InterfaceQueue")
			.field("config", &self.shared.config)
			.field("metrics", &self.metrics())
			.finish_non_exhaustive()
	}
}

impl InterfaceQueue {
	/// Creates the queue and starts its dispatcher thread. Tasks run on the pool named by
	/// `config.pool`.
	pub fn new(
		config: QueueConfig,
		pools: Arc<WorkerPools>,
		ui: Arc<dyn HostUi>,
	) -> Result<Self, InterfaceError> {
		let config = config.validated(&pools.pool(config.pool).config());

		let shared = Arc::new(QueueShared {
			config,
			ui: Arc::clone(&ui),
			dispatcher: Arc::new(Dispatcher::new(
				ui,
				pools,
				config.pool,
				config.progress_threshold,
			)),
			state: Mutex::new(QueueState::default()),
			changed: Condvar::new(),
			active: AtomicUsize::new(0),
			finished: AtomicUsize::new(0),
			failed: AtomicUsize::new(0),
			sequence: AtomicU64::new(0),
		});

		thread::Builder::new()
			.name(DISPATCHER_THREAD_NAME.to_string())
			.spawn({
				let shared = Arc::clone(&shared);
				move || shared.dispatch_loop()
			})
			.map_err(|source| InterfaceError::Spawn {
				kind: config.pool,
				source,
			})?;

		debug!(
			max_active_tasks = config.max_active_tasks,
			pool = %config.pool,
			"Interface queue started;"
		);

		Ok(Self { shared })
	}

	/// Enqueues a task. Synchronous tasks are waited for with [`TaskHandle::wait`], asynchronous
	/// ones are released right away and their failures only end up in the logs.
	#[instrument(
		skip_all,
		fields(
			task_id = %definition.id(),
			priority = %definition.priority(),
			synchronous = synchronous,
		),
	)]
	pub fn submit<R, F>(
		&self,
		definition: TaskDefinition,
		synchronous: bool,
		callable: F,
	) -> TaskHandle<R>
	where
		R: Send + 'static,
		F: FnOnce(&TaskContext<'_>) -> Result<ExecStatus<R>, DatabaseError> + Send + 'static,
	{
		let priority = definition.priority();

		let (task, handle) = InterfaceTask::new(
			definition,
			synchronous,
			Box::new(callable),
			Arc::clone(&self.shared.ui),
			self.shared.config,
		);

		let mut state = self.shared.state.lock();
		if state.shutdown {
			drop(state);
			debug!("Queue is shut down, discarding task;");
			// Dropping an unrun task resolves it as shut down
			drop(task);
			return handle;
		}

		state.pending.push(Queued {
			priority,
			sequence: self.shared.sequence.fetch_add(1, Ordering::Relaxed),
			task,
		});
		trace!(queue_size = state.pending.len(), "Task enqueued;");
		self.shared.changed.notify_all();

		handle
	}

	/// Runs `callable` on a worker and blocks until it finishes or the dead-man timeout expires.
	pub fn schedule_and_wait<R, F>(
		&self,
		priority: Priority,
		title: impl Into<String>,
		text: impl Into<String>,
		callable: F,
	) -> Result<R, InterfaceError>
	where
		R: Send + 'static,
		F: FnOnce(&TaskContext<'_>) -> Result<ExecStatus<R>, DatabaseError> + Send + 'static,
	{
		self.schedule_definition_and_wait(TaskDefinition::new(priority, title, text), callable)
	}

	/// Runs `callable` on a worker without waiting for it.
	pub fn schedule_and_forget<F>(
		&self,
		priority: Priority,
		title: impl Into<String>,
		text: impl Into<String>,
		callable: F,
	) -> TaskId
	where
		F: FnOnce(&TaskContext<'_>) -> Result<ExecStatus<()>, DatabaseError> + Send + 'static,
	{
		self.schedule_definition_and_forget(TaskDefinition::new(priority, title, text), callable)
	}

	pub fn schedule_definition_and_wait<R, F>(
		&self,
		definition: TaskDefinition,
		callable: F,
	) -> Result<R, InterfaceError>
	where
		R: Send + 'static,
		F: FnOnce(&TaskContext<'_>) -> Result<ExecStatus<R>, DatabaseError> + Send + 'static,
	{
		self.submit(definition, true, callable).wait()
	}

	pub fn schedule_definition_and_forget<F>(
		&self,
		definition: TaskDefinition,
		callable: F,
	) -> TaskId
	where
		F: FnOnce(&TaskContext<'_>) -> Result<ExecStatus<()>, DatabaseError> + Send + 'static,
	{
		self.submit(definition, false, callable).task_id()
	}

	/// Tasks waiting for an admission slot.
	#[must_use]
	pub fn size(&self) -> usize {
		self.shared.state.lock().pending.len()
	}

	#[must_use]
	pub fn active_tasks(&self) -> usize {
		self.shared.active.load(Ordering::Acquire)
	}

	#[must_use]
	pub fn max_active_tasks(&self) -> usize {
		self.shared.config.max_active_tasks
	}

	/// Tasks that ran to an end, failures and cancellations included.
	#[must_use]
	pub fn finished_tasks(&self) -> usize {
		self.shared.finished.load(Ordering::Acquire)
	}

	#[must_use]
	pub fn metrics(&self) -> QueueMetrics {
		QueueMetrics {
			queue_size: self.size(),
			active_tasks: self.active_tasks(),
			max_active_tasks: self.max_active_tasks(),
			finished_tasks: self.finished_tasks(),
			failed_tasks: self.shared.failed.load(Ordering::Acquire),
			progress_dispatches: self.shared.dispatcher.progress_dispatches(),
			background_dispatches: self.shared.dispatcher.background_dispatches(),
		}
	}

	/// Blocks until no task is waiting or running, returning `false` if `timeout` ran out first.
	pub fn wait_idle(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		let mut state = self.shared.state.lock();

		while !state.pending.is_empty() || self.shared.active.load(Ordering::Acquire) > 0 {
			if self
				.shared
				.changed
				.wait_until(&mut state, deadline)
				.timed_out()
			{
				return state.pending.is_empty() && self.shared.active.load(Ordering::Acquire) == 0;
			}
		}

		true
	}

	/// Stops dispatching. Tasks still waiting for a slot complete with
	/// [`InterfaceError::Shutdown`]; running ones are left to finish.
	pub fn shutdown(&self) {
		let pending = {
			let mut state = self.shared.state.lock();
			if state.shutdown {
				return;
			}
			state.shutdown = true;
			self.shared.changed.notify_all();
			std::mem::take(&mut state.pending)
		};

		if !pending.is_empty() {
			debug!(discarded = pending.len(), "Interface queue shut down with pending tasks;");
		}
	}
}

impl Drop for InterfaceQueue {
	fn drop(&mut self) {
		self.shutdown();
	}
}

impl QueueShared {
	fn dispatch_loop(self: Arc<Self>) {
		trace!("Interface queue dispatcher starting...");

		while let Some(task) = self.next_task() {
			let on_complete = {
				let shared = Arc::clone(&self);
				Box::new(move |outcome| shared.complete(outcome))
			};

			if let Err(e) = self.dispatcher.dispatch(task, on_complete) {
				error!(?e, "Failed to hand task over to its worker pool;");
			}
		}

		trace!("Interface queue dispatcher exiting...");
	}

	/// Waits for a free slot and a pending task, taking the slot on the way out.
	fn next_task(&self) -> Option<Box<dyn QueuedTask>> {
		let mut state = self.state.lock();

		loop {
			if state.shutdown {
				return None;
			}

			if self.active.load(Ordering::Acquire) < self.config.max_active_tasks {
				if let Some(Queued { task, .. }) = state.pending.pop() {
					self.active.fetch_add(1, Ordering::AcqRel);
					return Some(task);
				}
			}

			self.changed.wait(&mut state);
		}
	}

	fn complete(&self, outcome: OutcomeKind) {
		self.finished.fetch_add(1, Ordering::AcqRel);
		if outcome == OutcomeKind::Failed {
			self.failed.fetch_add(1, Ordering::AcqRel);
		}

		let _state = self.state.lock();
		self.active.fetch_sub(1, Ordering::AcqRel);
		self.changed.notify_all();
	}
}
