use std::{
	any::Any,
	fmt,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{
		atomic::{AtomicU8, Ordering},
		Arc,
	},
	thread::{self, Thread},
	time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn, Span};
use uuid::Uuid;

use super::{
	config::QueueConfig,
	context::{ActivityFlags, ThreadInfo},
	error::{DatabaseError, InterfaceError},
	ui::HostUi,
};

/// A unique identifier for a task using the [`uuid`](https://docs.rs/uuid) crate.
pub type TaskId = Uuid;

/// The unit of work carried by a task. It receives the [`TaskContext`] of the worker running it.
pub type Callable<R> =
	Box<dyn FnOnce(&TaskContext<'_>) -> Result<ExecStatus<R>, DatabaseError> + Send + 'static>;

/// Higher priorities are always dispatched before lower ones waiting in the same queue.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
	Lowest,
	Low,
	#[default]
	Neutral,
	High,
	Highest,
}

impl fmt::Display for Priority {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Lowest => "lowest",
			Self::Low => "low",
			Self::Neutral => "neutral",
			Self::High => "high",
			Self::Highest => "highest",
		};
		f.write_str(name)
	}
}

/// Everything the scheduler needs to know about a task besides its callable.
///
/// The title decides whether the task may be shown with a progress indicator: an empty title
/// always means a silent background run.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
	id: TaskId,
	priority: Priority,
	title: String,
	text: String,
	cancel_token: CancellationToken,
	invoker: ActivityFlags,
}

impl TaskDefinition {
	pub fn new(priority: Priority, title: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			id: TaskId::new_v4(),
			priority,
			title: title.into(),
			text: text.into(),
			cancel_token: CancellationToken::new(),
			invoker: ActivityFlags::empty(),
		}
	}

	/// Shares the collaborator's cancellation token with the task, usually the one backing an
	/// indicator the user can cancel.
	#[must_use]
	pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
		self.cancel_token = cancel_token;
		self
	}

	/// Activity properties of the submitting code, merged into the worker while the task runs.
	#[must_use]
	pub const fn invoked_from(mut self, invoker: ActivityFlags) -> Self {
		self.invoker = invoker;
		self
	}

	#[must_use]
	pub const fn id(&self) -> TaskId {
		self.id
	}

	#[must_use]
	pub const fn priority(&self) -> Priority {
		self.priority
	}

	#[must_use]
	pub fn title(&self) -> &str {
		&self.title
	}

	#[must_use]
	pub fn text(&self) -> &str {
		&self.text
	}

	#[must_use]
	pub const fn cancel_token(&self) -> &CancellationToken {
		&self.cancel_token
	}

	#[must_use]
	pub const fn invoker(&self) -> ActivityFlags {
		self.invoker
	}

	#[must_use]
	pub fn is_progress_eligible(&self) -> bool {
		!self.title.is_empty()
	}
}

/// Lifecycle of a task. Transitions only ever move forward and `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskStatus {
	/// Queued, waiting for an admission slot
	New,
	/// Handed to a worker pool
	Started,
	/// The callable returned, raised or panicked
	Finished,
	/// The result was handed back or discarded
	Released,
}

impl TaskStatus {
	const fn from_u8(value: u8) -> Self {
		match value {
			0 => Self::New,
			1 => Self::Started,
			2 => Self::Finished,
			_ => Self::Released,
		}
	}
}

#[derive(Debug)]
struct StatusHolder(AtomicU8);

impl StatusHolder {
	const fn new() -> Self {
		Self(AtomicU8::new(TaskStatus::New as u8))
	}

	fn get(&self) -> TaskStatus {
		TaskStatus::from_u8(self.0.load(Ordering::Acquire))
	}

	/// Moves to `status` if that is a step forward, returning whether the change happened.
	#[allow(deprecated_in_future)] // `try_update` needs Rust 1.95; MSRV is 1.80
	fn change(&self, status: TaskStatus) -> bool {
		self.0
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
				(current < status as u8).then_some(status as u8)
			})
			.is_ok()
	}

	/// Moves to [`TaskStatus::Released`], returning the status it had before.
	fn release(&self) -> TaskStatus {
		TaskStatus::from_u8(self.0.swap(TaskStatus::Released as u8, Ordering::AcqRel))
	}
}

/// Represents whether a callable ran to completion or stopped because it saw its cancellation
/// token fire.
#[derive(Debug)]
pub enum ExecStatus<R> {
	Done(R),
	Canceled,
}

/// What a callable can see about the task it is running for.
pub struct TaskContext<'a> {
	task_id: TaskId,
	cancel_token: &'a CancellationToken,
	info: &'a ThreadInfo,
}

impl<'a> TaskContext<'a> {
	pub(crate) const fn new(
		task_id: TaskId,
		cancel_token: &'a CancellationToken,
		info: &'a ThreadInfo,
	) -> Self {
		Self {
			task_id,
			cancel_token,
			info,
		}
	}

	#[must_use]
	pub const fn task_id(&self) -> TaskId {
		self.task_id
	}

	#[must_use]
	pub fn is_canceled(&self) -> bool {
		self.cancel_token.is_cancelled()
	}

	#[must_use]
	pub const fn cancel_token(&self) -> &CancellationToken {
		self.cancel_token
	}

	/// Activity properties of the worker, including the ones merged from the submitter.
	/// Pass `ctx.activity().snapshot()` to [`TaskDefinition::invoked_from`] for nested tasks.
	#[must_use]
	pub const fn activity(&self) -> &ThreadInfo {
		self.info
	}
}

impl fmt::Debug for TaskContext<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaskContext")
			.field("task_id", &self.task_id)
			.field("canceled", &self.is_canceled())
			.field("activity", &self.info.snapshot())
			.finish()
	}
}

/// Returns `Ok(ExecStatus::Canceled)` from the enclosing callable when its token has fired.
#[macro_export]
macro_rules! check_cancellation {
	($ctx:ident) => {
		let ctx: &$crate::TaskContext<'_> = $ctx;

		if ctx.is_canceled() {
			::tracing::trace!(task_id = %ctx.task_id(), "Task was canceled by the user");
			return Ok($crate::ExecStatus::Canceled);
		}
	};
}

#[derive(Debug)]
enum TaskOutcome<R> {
	Done(R),
	Canceled,
	Failed(DatabaseError),
	Panicked(String),
	Shutdown,
}

impl<R> TaskOutcome<R> {
	const fn kind(&self) -> OutcomeKind {
		match self {
			Self::Done(_) => OutcomeKind::Done,
			Self::Canceled | Self::Shutdown => OutcomeKind::Canceled,
			Self::Failed(_) | Self::Panicked(_) => OutcomeKind::Failed,
		}
	}

	fn into_result(self, task_id: TaskId) -> Result<R, InterfaceError> {
		match self {
			Self::Done(out) => Ok(out),
			Self::Canceled => Err(InterfaceError::Canceled(task_id)),
			Self::Failed(e) => Err(e.into()),
			Self::Panicked(message) => Err(InterfaceError::Panicked { task_id, message }),
			Self::Shutdown => Err(InterfaceError::Shutdown(task_id)),
		}
	}

	/// Nobody is waiting for this outcome anymore, so this is where it ends.
	fn log_detached(&self, task_id: TaskId) {
		match self {
			Self::Done(_) => {}
			Self::Canceled => trace!(%task_id, "Task was canceled;"),
			Self::Failed(e) => error!(%task_id, ?e, "Database interface task failed;"),
			Self::Panicked(message) => {
				error!(%task_id, %message, "Database interface task panicked;");
			}
			Self::Shutdown => debug!(%task_id, "Task discarded on queue shutdown;"),
		}
	}
}

/// Coarse outcome of a run, used by the queue's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutcomeKind {
	Done,
	Canceled,
	Failed,
}

#[derive(Debug)]
struct TaskShared<R> {
	id: TaskId,
	submitted_at: Instant,
	status: StatusHolder,
	outcome: Mutex<Option<TaskOutcome<R>>>,
	waiter: Mutex<Option<Thread>>,
}

impl<R> TaskShared<R> {
	/// Stores the outcome for the waiter, or logs it when the handle was already released.
	fn resolve(&self, outcome: TaskOutcome<R>) {
		let mut slot = self.outcome.lock();
		*slot = Some(outcome);

		if self.status.change(TaskStatus::Finished) {
			drop(slot);
			if let Some(waiter) = &*self.waiter.lock() {
				waiter.unpark();
			}
		} else if let Some(outcome) = slot.take() {
			outcome.log_detached(self.id);
		}
	}

	/// Gives up on the outcome. One that is already stored is logged, a later one is logged by
	/// [`resolve`](Self::resolve).
	fn release(&self) {
		if self.status.release() == TaskStatus::Finished {
			if let Some(outcome) = self.outcome.lock().take() {
				outcome.log_detached(self.id);
			}
		}
	}
}

/// A task as the admission queue sees it, with its result type erased.
pub(crate) trait QueuedTask: Send + 'static {
	fn definition(&self) -> &TaskDefinition;

	fn mark_started(&self);

	/// Runs the callable on the current worker and records its outcome.
	fn run(self: Box<Self>, info: &ThreadInfo) -> OutcomeKind;
}

pub(crate) struct InterfaceTask<R> {
	definition: TaskDefinition,
	callable: Option<Callable<R>>,
	shared: Arc<TaskShared<R>>,
	span: Span,
}

impl<R: Send + 'static> InterfaceTask<R> {
	pub(crate) fn new(
		definition: TaskDefinition,
		synchronous: bool,
		callable: Callable<R>,
		ui: Arc<dyn HostUi>,
		config: QueueConfig,
	) -> (Box<dyn QueuedTask>, TaskHandle<R>) {
		let shared = Arc::new(TaskShared {
			id: definition.id(),
			submitted_at: Instant::now(),
			status: StatusHolder::new(),
			outcome: Mutex::new(None),
			waiter: Mutex::new(None),
		});

		if !synchronous {
			shared.status.change(TaskStatus::Released);
		}

		let handle = TaskHandle {
			shared: Arc::clone(&shared),
			cancel_token: definition.cancel_token().clone(),
			synchronous,
			ui,
			config,
		};

		let task = Box::new(Self {
			definition,
			callable: Some(callable),
			shared,
			span: Span::current(),
		});

		(task, handle)
	}
}

impl<R: Send + 'static> QueuedTask for InterfaceTask<R> {
	fn definition(&self) -> &TaskDefinition {
		&self.definition
	}

	fn mark_started(&self) {
		self.shared.status.change(TaskStatus::Started);
	}

	fn run(mut self: Box<Self>, info: &ThreadInfo) -> OutcomeKind {
		let Some(callable) = self.callable.take() else {
			return OutcomeKind::Canceled;
		};

		let task_id = self.definition.id();
		let span = self.span.clone();
		let _entered = span.enter();

		let outcome = if self.definition.cancel_token().is_cancelled() {
			trace!(%task_id, "Task was canceled before a worker picked it up, skipping;");
			TaskOutcome::Canceled
		} else {
			let ctx = TaskContext::new(task_id, self.definition.cancel_token(), info);

			match catch_unwind(AssertUnwindSafe(|| callable(&ctx))) {
				Ok(Ok(ExecStatus::Done(out))) => TaskOutcome::Done(out),
				Ok(Ok(ExecStatus::Canceled)) => TaskOutcome::Canceled,
				Ok(Err(e)) => TaskOutcome::Failed(e),
				Err(payload) => TaskOutcome::Panicked(panic_message(payload.as_ref())),
			}
		};

		let kind = outcome.kind();
		self.shared.resolve(outcome);

		kind
	}
}

impl<R> Drop for InterfaceTask<R> {
	fn drop(&mut self) {
		if self.callable.take().is_some() {
			self.shared.resolve(TaskOutcome::Shutdown);
		}
	}
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(ToString::to_string)
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "<non-string panic payload>".to_string())
}

/// The caller's side of a submitted task.
pub struct TaskHandle<R> {
	shared: Arc<TaskShared<R>>,
	cancel_token: CancellationToken,
	synchronous: bool,
	ui: Arc<dyn HostUi>,
	config: QueueConfig,
}

impl<R> fmt::Debug for TaskHandle<R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaskHandle")
			.field("task_id", &self.shared.id)
			.field("status", &self.shared.status.get())
			.field("synchronous", &self.synchronous)
			.finish_non_exhaustive()
	}
}

impl<R> TaskHandle<R> {
	#[must_use]
	pub fn task_id(&self) -> TaskId {
		self.shared.id
	}

	#[must_use]
	pub fn status(&self) -> TaskStatus {
		self.shared.status.get()
	}

	#[must_use]
	pub const fn is_synchronous(&self) -> bool {
		self.synchronous
	}

	/// Signals the task's cancellation token. Cooperative only: a callable that never checks
	/// it keeps running.
	pub fn cancel(&self) {
		self.cancel_token.cancel();
	}

	/// Parks the calling thread until the task finishes, then hands back its result.
	///
	/// The wait is abandoned with [`InterfaceError::Timeout`] once the dead-man window, counted
	/// from submission, runs out. The worker is left alone in that case and keeps its pool slot
	/// until the callable returns on its own.
	///
	/// Handles of asynchronous tasks are released at submission and yield
	/// [`InterfaceError::Released`] straight away.
	pub fn wait(self) -> Result<R, InterfaceError> {
		let task_id = self.shared.id;

		if !self.synchronous {
			return Err(InterfaceError::Released(task_id));
		}

		let dispatch_thread = self.ui.is_dispatch_thread();
		if dispatch_thread {
			error!(
				%task_id,
				"Synchronous database interface call issued from the UI thread, \
				this blocks the UI until the database answers;"
			);
		}

		let interval = self.config.wake_interval(dispatch_thread);
		let dead_man_timeout = self.config.dead_man_timeout();

		*self.shared.waiter.lock() = Some(thread::current());

		loop {
			if self.shared.status.get() >= TaskStatus::Finished {
				break;
			}

			let elapsed = self.shared.submitted_at.elapsed();
			if elapsed >= dead_man_timeout {
				break;
			}

			thread::park_timeout(interval.min(dead_man_timeout - elapsed));
		}

		self.shared.waiter.lock().take();

		// A task finishing right after the deadline still counts, its outcome is already stored
		if self.shared.status.release() < TaskStatus::Finished {
			let waited = self.shared.submitted_at.elapsed();
			warn!(
				%task_id,
				?waited,
				"Gave up waiting for database interface task, leaving the worker running;"
			);
			return Err(InterfaceError::Timeout { waited });
		}

		self.shared
			.outcome
			.lock()
			.take()
			.map_or(Err(InterfaceError::Shutdown(task_id)), |outcome| {
				outcome.into_result(task_id)
			})
	}

	/// Same as [`wait`](Self::wait) with a caller supplied dead-man window.
	pub fn wait_timeout(mut self, dead_man_timeout: Duration) -> Result<R, InterfaceError> {
		#[allow(clippy::cast_possible_truncation)]
		{
			self.config.dead_man_timeout_ms = dead_man_timeout.as_millis() as u64;
		}
		self.wait()
	}
}

impl<R> Drop for TaskHandle<R> {
	fn drop(&mut self) {
		self.shared.release();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicBool;

	use tracing_test::traced_test;

	use crate::{ui::Headless, ActivityProperty};

	use super::*;

	fn queue_config(dead_man_timeout_ms: u64) -> QueueConfig {
		QueueConfig {
			dead_man_timeout_ms,
			wake_interval_ms: 5,
			..Default::default()
		}
	}

	fn new_task<R: Send + 'static>(
		definition: TaskDefinition,
		synchronous: bool,
		callable: impl FnOnce(&TaskContext<'_>) -> Result<ExecStatus<R>, DatabaseError>
			+ Send
			+ 'static,
	) -> (Box<dyn QueuedTask>, TaskHandle<R>) {
		InterfaceTask::new(
			definition,
			synchronous,
			Box::new(callable),
			Arc::new(Headless),
			queue_config(2_000),
		)
	}

	#[test]
	fn status_only_moves_forward() {
		let status = StatusHolder::new();

		assert!(status.change(TaskStatus::Started));
		assert!(status.change(TaskStatus::Finished));
		assert!(!status.change(TaskStatus::Started));
		assert!(status.change(TaskStatus::Released));
		assert!(!status.change(TaskStatus::Finished));
		assert_eq!(status.get(), TaskStatus::Released);
	}

	#[test]
	fn priorities_are_ordered() {
		assert!(Priority::Highest > Priority::High);
		assert!(Priority::High > Priority::Neutral);
		assert!(Priority::Low > Priority::Lowest);
		assert_eq!(Priority::default(), Priority::Neutral);
	}

	#[test]
	fn empty_title_is_not_progress_eligible() {
		assert!(!TaskDefinition::new(Priority::High, "", "loading").is_progress_eligible());
		assert!(TaskDefinition::new(Priority::Low, "Loading columns", "").is_progress_eligible());
	}

	#[test]
	fn synchronous_task_hands_back_result() {
		let (task, handle) = new_task(
			TaskDefinition::new(Priority::Neutral, "Loading schemas", ""),
			true,
			|ctx| {
				assert!(ctx.activity().is(ActivityProperty::Background));
				Ok(ExecStatus::Done(42))
			},
		);

		let info = ThreadInfo::new();
		info.set(ActivityProperty::Background, true);
		task.mark_started();
		assert_eq!(handle.status(), TaskStatus::Started);
		assert_eq!(task.run(&info), OutcomeKind::Done);
		assert_eq!(handle.status(), TaskStatus::Finished);

		assert_eq!(handle.wait().ok(), Some(42));
	}

	#[test]
	fn database_error_reaches_the_caller_verbatim() {
		let (task, handle) = new_task::<()>(
			TaskDefinition::new(Priority::High, "", ""),
			true,
			|_| Err(DatabaseError::new("ORA-01017: invalid username/password").with_vendor_code(1017)),
		);

		let waiter = thread::spawn(move || handle.wait());
		thread::sleep(Duration::from_millis(20));
		assert_eq!(task.run(&ThreadInfo::new()), OutcomeKind::Failed);

		let e = waiter.join().unwrap().unwrap_err();
		assert_eq!(e.database_error().and_then(DatabaseError::vendor_code), Some(1017));
	}

	#[test]
	fn panic_is_captured() {
		let (task, handle) = new_task::<()>(TaskDefinition::new(Priority::Low, "", ""), true, |_| {
			panic!("driver crashed")
		});

		assert_eq!(task.run(&ThreadInfo::new()), OutcomeKind::Failed);

		match handle.wait() {
			Err(InterfaceError::Panicked { message, .. }) => assert_eq!(message, "driver crashed"),
			other => panic!("unexpected result: {other:?}"),
		}
	}

	#[test]
	fn cancellation_is_not_a_failure() {
		let (task, handle) = new_task::<()>(TaskDefinition::new(Priority::Low, "", ""), true, |ctx| {
			ctx.cancel_token().cancel();
			check_cancellation!(ctx);
			Ok(ExecStatus::Done(()))
		});

		assert_eq!(task.run(&ThreadInfo::new()), OutcomeKind::Canceled);
		assert!(handle.wait().unwrap_err().is_canceled());
	}

	#[test]
	fn canceled_before_start_skips_callable() {
		let ran = Arc::new(AtomicBool::new(false));
		let token = CancellationToken::new();

		let (task, handle) = new_task(
			TaskDefinition::new(Priority::Low, "", "").with_cancel_token(token.clone()),
			true,
			{
				let ran = Arc::clone(&ran);
				move |_| {
					ran.store(true, Ordering::Relaxed);
					Ok(ExecStatus::Done(()))
				}
			},
		);

		token.cancel();
		task.run(&ThreadInfo::new());

		assert!(!ran.load(Ordering::Relaxed));
		assert!(handle.wait().unwrap_err().is_canceled());
	}

	#[test]
	fn dead_man_timeout_returns_to_the_caller() {
		let (task, handle) = InterfaceTask::new(
			TaskDefinition::new(Priority::Neutral, "", ""),
			true,
			Box::new(|_| Ok(ExecStatus::Done("late"))),
			Arc::new(Headless),
			queue_config(50),
		);

		let started = Instant::now();
		let res = handle.wait();

		assert!(res.unwrap_err().is_timeout());
		assert!(started.elapsed() < Duration::from_secs(1));

		// The worker still runs whenever it gets there, its result is discarded
		assert_eq!(task.run(&ThreadInfo::new()), OutcomeKind::Done);
	}

	#[test]
	fn asynchronous_task_is_released_at_submission() {
		let (task, handle) = new_task(TaskDefinition::new(Priority::Low, "", ""), false, |_| {
			Ok(ExecStatus::Done(7))
		});

		assert_eq!(handle.status(), TaskStatus::Released);
		task.mark_started();
		assert_eq!(handle.status(), TaskStatus::Released);
		assert_eq!(task.run(&ThreadInfo::new()), OutcomeKind::Done);
		assert!(matches!(handle.wait(), Err(InterfaceError::Released(_))));
	}

	#[test]
	fn dropped_task_resolves_as_shutdown() {
		let (task, handle) = new_task(TaskDefinition::new(Priority::Low, "", ""), true, |_| {
			Ok(ExecStatus::Done(()))
		});

		drop(task);

		assert!(matches!(handle.wait(), Err(InterfaceError::Shutdown(_))));
	}

	#[test]
	#[traced_test]
	fn failure_after_dead_man_timeout_is_logged() {
		let (task, handle) = InterfaceTask::<()>::new(
			TaskDefinition::new(Priority::Neutral, "", ""),
			true,
			Box::new(|_| Err(DatabaseError::new("ORA-00054: resource busy"))),
			Arc::new(Headless),
			queue_config(20),
		);

		assert!(handle.wait().unwrap_err().is_timeout());
		assert_eq!(task.run(&ThreadInfo::new()), OutcomeKind::Failed);
		assert!(logs_contain("Database interface task failed"));
		assert!(logs_contain("ORA-00054"));
	}

	#[test]
	fn finished_task_wins_over_an_expired_deadline() {
		let (task, handle) = InterfaceTask::new(
			TaskDefinition::new(Priority::Neutral, "", ""),
			true,
			Box::new(|_| Ok(ExecStatus::Done("on time"))),
			Arc::new(Headless),
			queue_config(0),
		);

		task.run(&ThreadInfo::new());

		assert_eq!(handle.wait().ok(), Some("on time"));
	}

	#[test]
	#[traced_test]
	fn dropped_handle_hands_a_later_outcome_to_the_logs() {
		let (task, handle) = new_task::<()>(TaskDefinition::new(Priority::Low, "", ""), true, |_| {
			Err(DatabaseError::new("ORA-00060: deadlock detected"))
		});

		drop(handle);
		assert_eq!(task.run(&ThreadInfo::new()), OutcomeKind::Failed);

		assert!(logs_contain("ORA-00060"));
	}

	#[test]
	#[traced_test]
	fn dropped_handle_logs_an_outcome_nobody_collected() {
		let (task, handle) = new_task::<()>(TaskDefinition::new(Priority::Low, "", ""), true, |_| {
			Err(DatabaseError::new("ORA-01555: snapshot too old"))
		});

		assert_eq!(task.run(&ThreadInfo::new()), OutcomeKind::Failed);
		assert_eq!(handle.status(), TaskStatus::Finished);
		assert!(!logs_contain("ORA-01555"));

		drop(handle);
		assert!(logs_contain("ORA-01555"));
	}
}
