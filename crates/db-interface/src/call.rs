//! Blocking database calls the caller can walk away from.
//!
//! Both helpers run the call on a dedicated pool and keep the calling thread polling for the
//! result. When the caller gives up, the call is never interrupted: the worker runs to its end
//! and its result is dropped.

use std::{
	panic::{catch_unwind, AssertUnwindSafe},
	sync::Arc,
	time::{Duration, Instant},
};

use crossbeam_channel::{self as chan, RecvTimeoutError};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace, warn};

use super::{
	context::{ActivityFlags, ActivityProperty, ThreadInfo},
	error::{DatabaseError, InterfaceError},
	pool::{PoolKind, WorkerPools},
	task::{panic_message, TaskId},
};

const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

type CallResult<T> = Result<Result<T, DatabaseError>, String>;

/// Runs `call` on the cancellable-calls pool, checking `cancel_token` every 100 ms.
///
/// Once the token fires, or `timeout` runs out, `cancel` is invoked on the calling thread to
/// abort the call on the driver side (statement cancel and the like) and the caller gets
/// [`InterfaceError::Canceled`] or [`InterfaceError::Timeout`]. A `timeout` of `None` or zero
/// waits as long as it takes.
#[instrument(skip_all, fields(call_id = tracing::field::Empty, ?timeout))]
pub fn run_cancellable<T, F, C>(
	pools: &WorkerPools,
	cancel_token: &CancellationToken,
	timeout: Option<Duration>,
	call: F,
	cancel: C,
) -> Result<T, InterfaceError>
where
	T: Send + 'static,
	F: FnOnce() -> Result<T, DatabaseError> + Send + 'static,
	C: FnOnce() -> Result<(), DatabaseError>,
{
	let call_id = TaskId::new_v4();
	tracing::Span::current().record("call_id", tracing::field::display(call_id));

	let started = Instant::now();
	let timeout = timeout.filter(|timeout| !timeout.is_zero());
	let (result_tx, result_rx) = chan::bounded::<CallResult<T>>(1);

	pools
		.pool(PoolKind::CancellableCalls)
		.execute(Box::new(move |_| {
			let res = catch_unwind(AssertUnwindSafe(call))
				.map_err(|payload| panic_message(payload.as_ref()));

			if result_tx.send(res).is_err() {
				trace!("Caller stopped waiting, dropping call result;");
			}
		}))?;

	loop {
		match result_rx.recv_timeout(CANCEL_CHECK_INTERVAL) {
			Ok(res) => return into_result(call_id, res),
			Err(RecvTimeoutError::Disconnected) => {
				return Err(InterfaceError::PoolShutdown(PoolKind::CancellableCalls));
			}
			Err(RecvTimeoutError::Timeout) => {}
		}

		if cancel_token.is_cancelled() {
			trace!("Cancellation requested, cancelling database call;");
			invoke_cancel(cancel);
			return Err(InterfaceError::Canceled(call_id));
		}

		if let Some(timeout) = timeout {
			let waited = started.elapsed();
			if waited >= timeout {
				warn!(?waited, "Database call timed out, cancelling it;");
				invoke_cancel(cancel);
				return Err(InterfaceError::Timeout { waited });
			}
		}
	}
}

/// Runs `f` on a timeout pool with the [`Timeout`](ActivityProperty::Timeout) property set and
/// the `invoker` properties merged, giving up after `timeout`.
///
/// Daemon pool workers never hold the process back at shutdown, non-daemon ones are joined.
#[instrument(skip_all, fields(?timeout, daemon = daemon))]
pub fn run_with_timeout<T, F>(
	pools: &WorkerPools,
	timeout: Duration,
	daemon: bool,
	invoker: ActivityFlags,
	f: F,
) -> Result<T, InterfaceError>
where
	T: Send + 'static,
	F: FnOnce(&ThreadInfo) -> Result<T, DatabaseError> + Send + 'static,
{
	let call_id = TaskId::new_v4();
	let pool = pools.timeout_pool(daemon);
	let monitor = Arc::clone(pools.monitor());
	let (result_tx, result_rx) = chan::bounded::<CallResult<T>>(1);

	pool.execute(Box::new(move |info| {
		let res = catch_unwind(AssertUnwindSafe(|| {
			monitor.surround_invoked(info, invoker, ActivityProperty::Timeout, || f(info))
		}))
		.map_err(|payload| panic_message(payload.as_ref()));

		if result_tx.send(res).is_err() {
			trace!(%call_id, "Timed out call finished after its caller left;");
		}
	}))?;

	match result_rx.recv_timeout(timeout) {
		Ok(res) => into_result(call_id, res),
		Err(RecvTimeoutError::Timeout) => {
			warn!(%call_id, "Call did not complete in time, leaving it running;");
			Err(InterfaceError::Timeout { waited: timeout })
		}
		Err(RecvTimeoutError::Disconnected) => Err(InterfaceError::PoolShutdown(pool.kind())),
	}
}

fn into_result<T>(call_id: TaskId, res: CallResult<T>) -> Result<T, InterfaceError> {
	match res {
		Ok(res) => res.map_err(Into::into),
		Err(message) => Err(InterfaceError::Panicked {
			task_id: call_id,
			message,
		}),
	}
}

fn invoke_cancel(cancel: impl FnOnce() -> Result<(), DatabaseError>) {
	if let Err(e) = cancel() {
		warn!(?e, "Error cancelling database call;");
	}
}
