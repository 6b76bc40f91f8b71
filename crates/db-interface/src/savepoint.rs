use std::fmt;

use parking_lot::ReentrantMutex;
use tracing::{instrument, trace, warn};
use uuid::Uuid;

use super::error::DatabaseError;

/// The slice of a live database connection the savepoint scope drives.
pub trait Connection: Send + Sync {
	fn is_auto_commit(&self) -> Result<bool, DatabaseError>;

	fn is_closed(&self) -> bool {
		false
	}

	fn set_savepoint(&self, name: &str) -> Result<(), DatabaseError>;

	fn rollback_to_savepoint(&self, name: &str) -> Result<(), DatabaseError>;

	fn release_savepoint(&self, name: &str) -> Result<(), DatabaseError>;
}

/// A connection together with the lock allowing one savepoint scope at a time on it.
///
/// The lock is reentrant: a scope opened from inside another scope on the same thread nests
/// instead of deadlocking.
pub struct ConnectionHandle<C> {
	connection: C,
	scope_lock: ReentrantMutex<()>,
}

impl<C> ConnectionHandle<C> {
	pub fn new(connection: C) -> Self {
		Self {
			connection,
			scope_lock: ReentrantMutex::new(()),
		}
	}

	pub const fn connection(&self) -> &C {
		&self.connection
	}

	pub fn into_inner(self) -> C {
		self.connection
	}
}

impl<C: fmt::Debug> fmt::Debug for ConnectionHandle<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionHandle")
			.field("connection", &self.connection)
			.field("scope_locked", &self.scope_lock.is_locked())
			.finish()
	}
}

/// Runs `f` behind a savepoint on `connection`, so a database error raised by `f` only undoes
/// the work `f` did, leaving the rest of the connection's transaction alone.
///
/// The error is handed back after the rollback; a failing rollback is logged and never replaces
/// it. The savepoint is released whatever happens. Without a connection, or on one in
/// auto-commit mode or already closed, `f` simply runs. So does it when the savepoint cannot be
/// set up, the failure only ends up in the logs.
#[instrument(skip_all)]
pub fn with_savepoint<C, T, F>(
	connection: Option<&ConnectionHandle<C>>,
	f: F,
) -> Result<T, DatabaseError>
where
	C: Connection,
	F: FnOnce() -> Result<T, DatabaseError>,
{
	let Some(handle) = connection else {
		return f();
	};

	let _scope = handle.scope_lock.lock();
	let connection = &handle.connection;

	if connection.is_closed() {
		return f();
	}

	match connection.is_auto_commit() {
		Ok(false) => {}
		Ok(true) => return f(),
		Err(e) => {
			warn!(?e, "Failed to check auto-commit mode, running without a savepoint;");
			return f();
		}
	}

	let name = format!("sp_{}", Uuid::new_v4().simple());
	let savepoint = match connection.set_savepoint(&name) {
		Ok(()) => {
			trace!(%name, "Savepoint created;");
			Some(Savepoint { connection, name })
		}
		Err(e) => {
			warn!(?e, "Failed to create savepoint, running without one;");
			None
		}
	};

	let res = f();

	if let (Err(e), Some(savepoint)) = (&res, &savepoint) {
		savepoint.rollback(e);
	}

	res
}

struct Savepoint<'a, C: Connection> {
	connection: &'a C,
	name: String,
}

impl<C: Connection> Savepoint<'_, C> {
	fn rollback(&self, cause: &DatabaseError) {
		if let Err(e) = self.connection.rollback_to_savepoint(&self.name) {
			warn!(
				name = %self.name,
				?e,
				?cause,
				"Failed to roll back to savepoint, keeping the original error;"
			);
		}
	}
}

impl<C: Connection> Drop for Savepoint<'_, C> {
	fn drop(&mut self) {
		if let Err(e) = self.connection.release_savepoint(&self.name) {
			warn!(name = %self.name, ?e, "Failed to release savepoint;");
		}
	}
}

#[cfg(feature = "sqlite")]
mod sqlite {
	use parking_lot::Mutex;

	use super::{Connection, DatabaseError};

	impl From<rusqlite::Error> for DatabaseError {
		fn from(e: rusqlite::Error) -> Self {
			let message = e.to_string();

			match e {
				rusqlite::Error::SqliteFailure(failure, _) => {
					Self::new(message).with_vendor_code(failure.extended_code)
				}
				_ => Self::new(message),
			}
		}
	}

	impl Connection for Mutex<rusqlite::Connection> {
		fn is_auto_commit(&self) -> Result<bool, DatabaseError> {
			Ok(self.lock().is_autocommit())
		}

		fn set_savepoint(&self, name: &str) -> Result<(), DatabaseError> {
			self.lock()
				.execute_batch(&format!("SAVEPOINT {name}"))
				.map_err(Into::into)
		}

		fn rollback_to_savepoint(&self, name: &str) -> Result<(), DatabaseError> {
			self.lock()
				.execute_batch(&format!("ROLLBACK TO SAVEPOINT {name}"))
				.map_err(Into::into)
		}

		fn release_savepoint(&self, name: &str) -> Result<(), DatabaseError> {
			self.lock()
				.execute_batch(&format!("RELEASE SAVEPOINT {name}"))
				.map_err(Into::into)
		}
	}
}
