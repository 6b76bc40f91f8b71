use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc,
};

use parking_lot::Mutex;
use tracing::{instrument, trace, warn};

use super::{
	context::{ActivityProperty, ThreadInfo},
	error::InterfaceError,
	pool::{PoolKind, WorkerPools},
	task::{OutcomeKind, QueuedTask, TaskDefinition},
	ui::{DispatchPath, HostUi, ProgressInfo},
};

pub(crate) type OnComplete = Box<dyn FnOnce(OutcomeKind) + Send + 'static>;

/// Picks the execution path of each admitted task and hands it to its worker pool.
pub(crate) struct Dispatcher {
	ui: Arc<dyn HostUi>,
	pools: Arc<WorkerPools>,
	pool: PoolKind,
	progress_threshold: usize,
	running_progress: Mutex<usize>,
	progress_dispatches: AtomicUsize,
	background_dispatches: AtomicUsize,
}

impl Dispatcher {
	pub(crate) fn new(
		ui: Arc<dyn HostUi>,
		pools: Arc<WorkerPools>,
		pool: PoolKind,
		progress_threshold: usize,
	) -> Self {
		Self {
			ui,
			pools,
			pool,
			progress_threshold,
			running_progress: Mutex::new(0),
			progress_dispatches: AtomicUsize::new(0),
			background_dispatches: AtomicUsize::new(0),
		}
	}

	pub(crate) fn progress_dispatches(&self) -> usize {
		self.progress_dispatches.load(Ordering::Relaxed)
	}

	pub(crate) fn background_dispatches(&self) -> usize {
		self.background_dispatches.load(Ordering::Relaxed)
	}

	/// Decides the path and, for the progress path, takes one of the progress slots in the same
	/// critical section. The caller must give the slot back through a [`ProgressSlot`].
	fn choose_path(&self, definition: &TaskDefinition) -> DispatchPath {
		if !definition.is_progress_eligible() {
			return DispatchPath::Background;
		}

		let mut running = self.running_progress.lock();

		if self.ui.is_modal_dialog_open()
			|| self.ui.has_modal_progress()
			|| *running >= self.progress_threshold
		{
			return DispatchPath::Background;
		}

		*running += 1;
		DispatchPath::Progress
	}

	#[instrument(
		skip_all,
		fields(
			task_id = %task.definition().id(),
			priority = %task.definition().priority(),
			pool = %self.pool,
		),
	)]
	pub(crate) fn dispatch(
		self: &Arc<Self>,
		task: Box<dyn QueuedTask>,
		on_complete: OnComplete,
	) -> Result<DispatchPath, InterfaceError> {
		let path = self.choose_path(task.definition());
		match path {
			DispatchPath::Progress => self.progress_dispatches.fetch_add(1, Ordering::Relaxed),
			DispatchPath::Background => self.background_dispatches.fetch_add(1, Ordering::Relaxed),
		};

		trace!(%path, "Dispatching task;");

		let slot = (path == DispatchPath::Progress).then(|| ProgressSlot(Arc::clone(self)));
		let completion = Completion(Some(on_complete));
		let dispatcher = Arc::clone(self);

		task.mark_started();

		self.pools.pool(self.pool).execute(Box::new(move |info| {
			let monitor = dispatcher.pools.monitor();
			let invoker = task.definition().invoker();

			let outcome = monitor.surround_invoked(
				info,
				invoker,
				ActivityProperty::DatabaseInterface,
				|| match path {
					DispatchPath::Progress => monitor.surround(info, ActivityProperty::Progress, || {
						dispatcher.run_with_progress(task, info)
					}),
					DispatchPath::Background => {
						monitor.surround(info, ActivityProperty::Background, || task.run(info))
					}
				},
			);

			// The slot must be free again by the time the queue hears about the completion
			drop(slot);
			completion.complete(outcome);
		}))?;

		Ok(path)
	}

	fn run_with_progress(&self, task: Box<dyn QueuedTask>, info: &ThreadInfo) -> OutcomeKind {
		let definition = task.definition().clone();
		let mut task = Some(task);
		let mut outcome = None;

		self.ui.run_with_progress(
			ProgressInfo {
				task_id: definition.id(),
				title: definition.title(),
				text: definition.text(),
				cancel_token: definition.cancel_token(),
			},
			&mut || {
				if let Some(task) = task.take() {
					outcome = Some(task.run(info));
				}
			},
		);

		if let Some(task) = task {
			warn!(
				task_id = %definition.id(),
				"Host UI returned without running the task, running it without progress;"
			);
			return task.run(info);
		}

		outcome.unwrap_or(OutcomeKind::Canceled)
	}
}

/// One of the progress-path slots, given back on drop.
struct ProgressSlot(Arc<Dispatcher>);

impl Drop for ProgressSlot {
	fn drop(&mut self) {
		let mut running = self.0.running_progress.lock();
		*running = running.saturating_sub(1);
	}
}

/// Reports completion to the queue exactly once, also when the job is dropped without running.
struct Completion(Option<OnComplete>);

impl Completion {
	fn complete(mut self, outcome: OutcomeKind) {
		if let Some(on_complete) = self.0.take() {
			on_complete(outcome);
		}
	}
}

impl Drop for Completion {
	fn drop(&mut self) {
		if let Some(on_complete) = self.0.take() {
			on_complete(OutcomeKind::Canceled);
		}
	}
}
