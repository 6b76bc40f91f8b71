use std::{io, time::Duration};

use thiserror::Error;

use super::{pool::PoolKind, task::TaskId};

/// A failure reported by the database itself, or by the driver talking to it.
///
/// Task callables and [`Connection`](crate::Connection) implementations raise this type; the
/// scheduler never inspects it, it only carries it back to whoever is waiting for the result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct DatabaseError {
	message: String,
	sql_state: Option<String>,
	vendor_code: Option<i32>,
}

impl DatabaseError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			sql_state: None,
			vendor_code: None,
		}
	}

	#[must_use]
	pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
		self.sql_state = Some(sql_state.into());
		self
	}

	#[must_use]
	pub const fn with_vendor_code(mut self, vendor_code: i32) -> Self {
		self.vendor_code = Some(vendor_code);
		self
	}

	#[must_use]
	pub fn message(&self) -> &str {
		&self.message
	}

	#[must_use]
	pub fn sql_state(&self) -> Option<&str> {
		self.sql_state.as_deref()
	}

	#[must_use]
	pub const fn vendor_code(&self) -> Option<i32> {
		self.vendor_code
	}
}

/// Everything the scheduler can hand back to a caller instead of a result.
#[derive(Debug, Error)]
pub enum InterfaceError {
	#[error(transparent)]
	Database(#[from] DatabaseError),
	#[error("gave up waiting after {waited:?}")]
	Timeout { waited: Duration },
	#[error("task <id='{0}'> was canceled")]
	Canceled(TaskId),
	#[error("task <id='{task_id}'> panicked: {message}")]
	Panicked { task_id: TaskId, message: String },
	#[error("interface queue shut down before task <id='{0}'> could run")]
	Shutdown(TaskId),
	#[error("task <id='{0}'> was submitted asynchronously, its result is discarded")]
	Released(TaskId),
	#[error("worker pool '{0}' is shut down")]
	PoolShutdown(PoolKind),
	#[error("failed to spawn a worker thread for pool '{kind}'")]
	Spawn {
		kind: PoolKind,
		#[source]
		source: io::Error,
	},
}

impl InterfaceError {
	/// The caller stopped waiting; the work itself may still be running.
	#[must_use]
	pub const fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}

	#[must_use]
	pub const fn is_canceled(&self) -> bool {
		matches!(self, Self::Canceled(_))
	}

	#[must_use]
	pub const fn database_error(&self) -> Option<&DatabaseError> {
		if let Self::Database(e) = self {
			Some(e)
		} else {
			None
		}
	}
}
