use std::{
	sync::{Arc, Barrier},
	thread,
	time::{Duration, Instant},
};

use dbnav_db_interface::{
	with_savepoint, ConnectionHandle, DatabaseError, ExecStatus, Headless, Priority,
};
use parking_lot::Mutex;
use tracing_test::traced_test;

mod common;

use common::{queue_config, start_queue, RecordingConnection, SavepointCall};

#[test]
#[traced_test]
fn nested_failure_only_rolls_back_nested_work() {
	let handle = ConnectionHandle::new(RecordingConnection::default());
	handle.connection().execute("UPDATE employees SET salary = salary * 1.1");

	let res: Result<(), _> = with_savepoint(Some(&handle), || {
		handle.connection().execute("INSERT INTO audit VALUES (1)");
		Err(DatabaseError::new("ORA-00001: unique constraint violated"))
	});

	assert_eq!(res.unwrap_err().message(), "ORA-00001: unique constraint violated");
	assert_eq!(
		handle.connection().pending(),
		["UPDATE employees SET salary = salary * 1.1"]
	);
	assert_eq!(
		handle.connection().calls(),
		[SavepointCall::Set, SavepointCall::Rollback, SavepointCall::Release]
	);
}

#[test]
#[traced_test]
fn successful_block_keeps_its_work() {
	let handle = ConnectionHandle::new(RecordingConnection::default());
	handle.connection().execute("DELETE FROM sessions");

	let count = with_savepoint(Some(&handle), || {
		handle.connection().execute("INSERT INTO sessions VALUES (42)");
		Ok(1)
	})
	.unwrap();

	assert_eq!(count, 1);
	assert_eq!(handle.connection().pending().len(), 2);
	assert_eq!(
		handle.connection().calls(),
		[SavepointCall::Set, SavepointCall::Release]
	);
}

#[test]
#[traced_test]
fn rollback_failure_does_not_mask_the_original_error() {
	let handle = ConnectionHandle::new(RecordingConnection::failing_rollback());

	let res: Result<(), _> =
		with_savepoint(Some(&handle), || Err(DatabaseError::new("deadlock detected")));

	assert_eq!(res.unwrap_err().message(), "deadlock detected");
	assert_eq!(
		handle.connection().calls(),
		[SavepointCall::Set, SavepointCall::Rollback, SavepointCall::Release]
	);
	assert!(logs_contain("Failed to roll back to savepoint"));
}

#[test]
#[traced_test]
fn auto_commit_and_virtual_contexts_run_directly() {
	let handle = ConnectionHandle::new(RecordingConnection::auto_commit());

	let res: Result<(), _> = with_savepoint(Some(&handle), || Err(DatabaseError::new("boom")));
	assert!(res.is_err());
	assert!(handle.connection().calls().is_empty());

	let res = with_savepoint::<RecordingConnection, _, _>(None, || Ok::<_, DatabaseError>("virtual"));
	assert_eq!(res.unwrap(), "virtual");
}

#[test]
#[traced_test]
fn failed_auto_commit_check_still_runs_the_block() {
	let handle = ConnectionHandle::new(RecordingConnection::failing_auto_commit_check());

	let count = with_savepoint(Some(&handle), || {
		handle.connection().execute("UPDATE jobs SET broken = 'N'");
		Ok(1)
	})
	.unwrap();

	assert_eq!(count, 1);
	assert_eq!(handle.connection().pending(), ["UPDATE jobs SET broken = 'N'"]);
	assert!(handle.connection().calls().is_empty());
	assert!(logs_contain("Failed to check auto-commit mode"));
}

#[test]
#[traced_test]
fn concurrent_scopes_on_one_connection_serialize() {
	let handle = Arc::new(ConnectionHandle::new(RecordingConnection::default()));
	let barrier = Arc::new(Barrier::new(2));
	let bodies = Arc::new(Mutex::new(Vec::<(Instant, Instant)>::new()));

	let threads = (0..2)
		.map(|_| {
			let handle = Arc::clone(&handle);
			let barrier = Arc::clone(&barrier);
			let bodies = Arc::clone(&bodies);

			thread::spawn(move || {
				barrier.wait();
				with_savepoint(Some(&*handle), || {
					let started = Instant::now();
					thread::sleep(Duration::from_millis(100));
					bodies.lock().push((started, Instant::now()));
					Ok::<_, DatabaseError>(())
				})
			})
		})
		.collect::<Vec<_>>();

	for thread in threads {
		thread.join().unwrap().unwrap();
	}

	let events = handle.connection().events();
	let calls = events.iter().map(|event| event.call).collect::<Vec<_>>();
	assert_eq!(
		calls,
		[
			SavepointCall::Set,
			SavepointCall::Release,
			SavepointCall::Set,
			SavepointCall::Release
		]
	);
	assert_eq!(events[0].name, events[1].name);
	assert_eq!(events[2].name, events[3].name);
	assert_ne!(events[0].name, events[2].name);

	// The second scope starts only once the first one released its savepoint
	assert!(events[2].at >= events[1].at);

	let mut bodies = bodies.lock().clone();
	bodies.sort();
	assert!(bodies[1].0 >= bodies[0].1);
}

#[test]
#[traced_test]
fn savepoint_scope_inside_a_task() {
	let (queue, _pools) = start_queue(queue_config(2), Arc::new(Headless));
	let handle = Arc::new(ConnectionHandle::new(RecordingConnection::default()));
	handle.connection().execute("UPDATE objects SET valid = 0");

	let res = queue.schedule_and_wait(Priority::High, "", "", {
		let handle = Arc::clone(&handle);
		move |_| {
			let nested: Result<(), _> = with_savepoint(Some(&*handle), || {
				handle.connection().execute("ALTER PACKAGE pkg COMPILE");
				Err(DatabaseError::new("ORA-24344: success with compilation error"))
			});

			Ok(ExecStatus::Done(nested.is_err()))
		}
	});

	assert!(res.unwrap());
	assert_eq!(handle.connection().pending(), ["UPDATE objects SET valid = 0"]);
}
