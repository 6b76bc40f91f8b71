#![allow(dead_code)]

use std::{
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
	thread::{self, ThreadId},
	time::{Duration, Instant},
};

use dbnav_db_interface::{
	Connection, DatabaseError, HostUi, InterfaceQueue, PoolKind, ProgressInfo, QueueConfig,
	WorkerPools,
};
use parking_lot::Mutex;

/// A host UI whose modal state is driven by the test, recording every progress indicator shown.
#[derive(Debug, Default)]
pub struct FakeUi {
	pub modal_dialog: AtomicBool,
	pub modal_progress: AtomicBool,
	pub dispatch_thread: Mutex<Option<ThreadId>>,
	pub titles: Mutex<Vec<String>>,
	running: AtomicUsize,
	pub peak_running: AtomicUsize,
}

impl FakeUi {
	pub fn modal() -> Self {
		let ui = Self::default();
		ui.modal_dialog.store(true, Ordering::Relaxed);
		ui
	}

	pub fn progress_titles(&self) -> Vec<String> {
		self.titles.lock().clone()
	}
}

impl HostUi for FakeUi {
	fn is_dispatch_thread(&self) -> bool {
		*self.dispatch_thread.lock() == Some(thread::current().id())
	}

	fn is_modal_dialog_open(&self) -> bool {
		self.modal_dialog.load(Ordering::Relaxed)
	}

	fn has_modal_progress(&self) -> bool {
		self.modal_progress.load(Ordering::Relaxed)
	}

	fn run_with_progress(&self, progress: ProgressInfo<'_>, work: &mut dyn FnMut()) {
		self.titles.lock().push(progress.title.to_string());

		let running = self.running.fetch_add(1, Ordering::AcqRel) + 1;
		self.peak_running.fetch_max(running, Ordering::AcqRel);

		work();

		self.running.fetch_sub(1, Ordering::AcqRel);
	}
}

pub fn start_queue(
	config: QueueConfig,
	ui: Arc<dyn HostUi>,
) -> (InterfaceQueue, Arc<WorkerPools>) {
	let pools = Arc::new(WorkerPools::with_defaults());
	let queue = InterfaceQueue::new(config, Arc::clone(&pools), ui).unwrap();

	(queue, pools)
}

pub fn queue_config(max_active_tasks: usize) -> QueueConfig {
	QueueConfig {
		max_active_tasks,
		wake_interval_ms: 5,
		pool: PoolKind::DatabaseInterface,
		..Default::default()
	}
}

/// Polls `condition` until it holds or five seconds went by.
pub fn eventually(condition: impl Fn() -> bool) -> bool {
	let deadline = Instant::now() + Duration::from_secs(5);

	while Instant::now() < deadline {
		if condition() {
			return true;
		}
		thread::sleep(Duration::from_millis(10));
	}

	condition()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavepointCall {
	Set,
	Rollback,
	Release,
}

#[derive(Debug, Clone)]
pub struct SavepointEvent {
	pub call: SavepointCall,
	pub name: String,
	pub at: Instant,
}

#[derive(Debug, Default)]
struct TransactionState {
	pending: Vec<String>,
	savepoints: Vec<(String, usize)>,
}

/// An in-memory connection with an open transaction, recording every savepoint call.
#[derive(Debug, Default)]
pub struct RecordingConnection {
	auto_commit: bool,
	fail_rollback: bool,
	fail_auto_commit_check: bool,
	state: Mutex<TransactionState>,
	events: Mutex<Vec<SavepointEvent>>,
}

impl RecordingConnection {
	pub fn auto_commit() -> Self {
		Self {
			auto_commit: true,
			..Default::default()
		}
	}

	pub fn failing_rollback() -> Self {
		Self {
			fail_rollback: true,
			..Default::default()
		}
	}

	/// A connection whose driver cannot tell whether auto-commit is on.
	pub fn failing_auto_commit_check() -> Self {
		Self {
			fail_auto_commit_check: true,
			..Default::default()
		}
	}

	/// Stages a statement in the current transaction.
	pub fn execute(&self, statement: &str) {
		self.state.lock().pending.push(statement.to_string());
	}

	pub fn pending(&self) -> Vec<String> {
		self.state.lock().pending.clone()
	}

	pub fn events(&self) -> Vec<SavepointEvent> {
		self.events.lock().clone()
	}

	pub fn calls(&self) -> Vec<SavepointCall> {
		self.events.lock().iter().map(|event| event.call).collect()
	}

	fn record(&self, call: SavepointCall, name: &str) {
		self.events.lock().push(SavepointEvent {
			call,
			name: name.to_string(),
			at: Instant::now(),
		});
	}
}

impl Connection for RecordingConnection {
	fn is_auto_commit(&self) -> Result<bool, DatabaseError> {
		if self.fail_auto_commit_check {
			return Err(DatabaseError::new("ORA-03113: end-of-file on communication channel"));
		}

		Ok(self.auto_commit)
	}

	fn set_savepoint(&self, name: &str) -> Result<(), DatabaseError> {
		let mut state = self.state.lock();
		let mark = state.pending.len();
		state.savepoints.push((name.to_string(), mark));
		drop(state);

		self.record(SavepointCall::Set, name);
		Ok(())
	}

	fn rollback_to_savepoint(&self, name: &str) -> Result<(), DatabaseError> {
		self.record(SavepointCall::Rollback, name);

		if self.fail_rollback {
			return Err(DatabaseError::new("connection reset during rollback"));
		}

		let mut state = self.state.lock();
		let mark = state
			.savepoints
			.iter()
			.find(|(savepoint, _)| savepoint == name)
			.map(|(_, mark)| *mark)
			.ok_or_else(|| DatabaseError::new(format!("no savepoint named {name}")))?;
		state.pending.truncate(mark);

		Ok(())
	}

	fn release_savepoint(&self, name: &str) -> Result<(), DatabaseError> {
		self.state
			.lock()
			.savepoints
			.retain(|(savepoint, _)| savepoint != name);

		self.record(SavepointCall::Release, name);
		Ok(())
	}
}
