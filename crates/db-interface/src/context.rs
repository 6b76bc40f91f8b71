//! Activity context of the code running on a worker.
//!
//! Downstream code often needs to know *where* it runs: inside a modal dialog, under a
//! progress indicator, as part of a timeout-bounded call... Each pool worker owns a
//! [`ThreadInfo`] and hands it explicitly to every job it runs, and submitters ship a copy of
//! their own [`ActivityFlags`] along with the work so the worker can [`merge`](ThreadInfo::merge)
//! it for the duration of the call.

use std::{
	cell::Cell,
	sync::atomic::{AtomicUsize, Ordering},
};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ActivityProperty {
	Background,
	Progress,
	Modal,
	Timeout,
	Disposer,
	DatabaseInterface,
}

impl ActivityProperty {
	pub const ALL: [Self; 6] = [
		Self::Background,
		Self::Progress,
		Self::Modal,
		Self::Timeout,
		Self::Disposer,
		Self::DatabaseInterface,
	];

	#[must_use]
	pub const fn flag(self) -> ActivityFlags {
		match self {
			Self::Background => ActivityFlags::BACKGROUND,
			Self::Progress => ActivityFlags::PROGRESS,
			Self::Modal => ActivityFlags::MODAL,
			Self::Timeout => ActivityFlags::TIMEOUT,
			Self::Disposer => ActivityFlags::DISPOSER,
			Self::DatabaseInterface => ActivityFlags::DATABASE_INTERFACE,
		}
	}

	const fn index(self) -> usize {
		self as usize
	}
}

bitflags! {
	/// A snapshot of activity properties, cheap to copy across threads.
	#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
	pub struct ActivityFlags: u8 {
		const BACKGROUND         = 1 << 0;
		const PROGRESS           = 1 << 1;
		const MODAL              = 1 << 2;
		const TIMEOUT            = 1 << 3;
		const DISPOSER           = 1 << 4;
		const DATABASE_INTERFACE = 1 << 5;
	}
}

impl ActivityFlags {
	#[must_use]
	pub const fn is(self, property: ActivityProperty) -> bool {
		self.contains(property.flag())
	}
}

impl From<ActivityProperty> for ActivityFlags {
	fn from(property: ActivityProperty) -> Self {
		property.flag()
	}
}

/// Mutable activity state owned by a single worker thread.
#[derive(Debug, Default)]
pub struct ThreadInfo {
	flags: Cell<ActivityFlags>,
}

impl ThreadInfo {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn is(&self, property: ActivityProperty) -> bool {
		self.flags.get().is(property)
	}

	pub fn set(&self, property: ActivityProperty, value: bool) {
		let mut flags = self.flags.get();
		flags.set(property.flag(), value);
		self.flags.set(flags);
	}

	#[must_use]
	pub fn snapshot(&self) -> ActivityFlags {
		self.flags.get()
	}

	/// Copies the invoker's properties into this thread, returning the ones that were not
	/// already set here. Pass that return value to [`unmerge`](Self::unmerge).
	pub fn merge(&self, invoker: ActivityFlags) -> ActivityFlags {
		let current = self.flags.get();
		self.flags.set(current | invoker);
		invoker - current
	}

	pub fn unmerge(&self, merged: ActivityFlags) {
		self.flags.set(self.flags.get() - merged);
	}

	#[must_use]
	pub fn is_background(&self) -> bool {
		self.is(ActivityProperty::Background)
	}

	#[must_use]
	pub fn is_progress(&self) -> bool {
		self.is(ActivityProperty::Progress)
	}

	#[must_use]
	pub fn is_modal(&self) -> bool {
		self.is(ActivityProperty::Modal)
	}

	#[must_use]
	pub fn is_timeout(&self) -> bool {
		self.is(ActivityProperty::Timeout)
	}
}

/// Process-wide bookkeeping of how many surrounded blocks are in flight per property.
#[derive(Debug, Default)]
pub struct ThreadMonitor {
	counters: [AtomicUsize; ActivityProperty::ALL.len()],
}

impl ThreadMonitor {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Runs `f` with `property` set on `info`, restoring the previous value afterwards, even
	/// if `f` panics.
	pub fn surround<T>(
		&self,
		info: &ThreadInfo,
		property: ActivityProperty,
		f: impl FnOnce() -> T,
	) -> T {
		self.surround_invoked(info, ActivityFlags::empty(), property, f)
	}

	/// Same as [`surround`](Self::surround), also merging the `invoker` properties into `info`
	/// for the duration of the call.
	pub fn surround_invoked<T>(
		&self,
		info: &ThreadInfo,
		invoker: ActivityFlags,
		property: ActivityProperty,
		f: impl FnOnce() -> T,
	) -> T {
		let _guard =
			SurroundGuard::enter(info, invoker, property, &self.counters[property.index()]);

		f()
	}

	#[must_use]
	pub fn process_count(&self, property: ActivityProperty) -> usize {
		self.counters[property.index()].load(Ordering::Acquire)
	}
}

struct SurroundGuard<'a> {
	info: &'a ThreadInfo,
	property: ActivityProperty,
	original: bool,
	merged: ActivityFlags,
	counter: &'a AtomicUsize,
}

impl<'a> SurroundGuard<'a> {
	fn enter(
		info: &'a ThreadInfo,
		invoker: ActivityFlags,
		property: ActivityProperty,
		counter: &'a AtomicUsize,
	) -> Self {
		let original = info.is(property);
		counter.fetch_add(1, Ordering::AcqRel);
		info.set(property, true);
		let merged = info.merge(invoker);

		Self {
			info,
			property,
			original,
			merged,
			counter,
		}
	}
}

impl Drop for SurroundGuard<'_> {
	fn drop(&mut self) {
		self.info.unmerge(self.merged);
		self.info.set(self.property, self.original);
		self.counter.fetch_sub(1, Ordering::AcqRel);
	}
}
