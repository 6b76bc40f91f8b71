use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::task::TaskId;

/// The host application's UI, as far as the scheduler cares about it.
///
/// Every method has a default suited for a process without any UI, see [`Headless`].
pub trait HostUi: Send + Sync + 'static {
	/// Whether the calling thread is the one owning the UI event loop.
	fn is_dispatch_thread(&self) -> bool {
		false
	}

	fn is_modal_dialog_open(&self) -> bool {
		false
	}

	fn has_modal_progress(&self) -> bool {
		false
	}

	/// Shows a progress indicator for the duration of `work`, which must be called exactly once
	/// on the current thread. Cancelling the indicator should cancel `progress.cancel_token`.
	fn run_with_progress(&self, progress: ProgressInfo<'_>, work: &mut dyn FnMut()) {
		let _ = progress;
		work();
	}
}

/// What a progress indicator shows about the task it wraps.
#[derive(Debug, Clone, Copy)]
pub struct ProgressInfo<'a> {
	pub task_id: TaskId,
	pub title: &'a str,
	pub text: &'a str,
	pub cancel_token: &'a CancellationToken,
}

/// A [`HostUi`] for processes without a UI: never modal, never on the UI thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl HostUi for Headless {}

/// How the dispatcher chose to run a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPath {
	/// Wrapped by a progress indicator
	Progress,
	/// Silent background run
	Background,
}

impl fmt::Display for DispatchPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Progress => f.write_str("progress"),
			Self::Background => f.write_str("background"),
		}
	}
}
