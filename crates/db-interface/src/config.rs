use std::{collections::BTreeMap, env, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::pool::PoolKind;

const MAX_ACTIVE_TASKS_ENV: &str = "DBNAV_MAX_ACTIVE_TASKS";
const DEAD_MAN_TIMEOUT_ENV: &str = "DBNAV_DEAD_MAN_TIMEOUT_MS";

/// Top level configuration of the database interface layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
	pub queue: QueueConfig,

	/// Per pool overrides, kinds missing here use [`PoolKind::default_config`]
	pub pools: BTreeMap<PoolKind, PoolConfig>,
}

impl InterfaceConfig {
	#[must_use]
	pub fn pool(&self, kind: PoolKind) -> PoolConfig {
		self.pools
			.get(&kind)
			.copied()
			.unwrap_or_else(|| kind.default_config())
			.validated(kind)
	}
}

/// Admission queue settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
	/// Upper bound of tasks handed to workers at the same time
	pub max_active_tasks: usize,

	/// How long a synchronous caller waits before giving up on a task
	pub dead_man_timeout_ms: u64,

	/// Park interval of a waiting UI thread, other threads wait ten times longer
	pub wake_interval_ms: u64,

	/// Progress-path tasks allowed to run at the same time
	pub progress_threshold: usize,

	/// Pool running the queue's tasks
	pub pool: PoolKind,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			max_active_tasks: 10,
			dead_man_timeout_ms: 5 * 60 * 1000,
			wake_interval_ms: 1000,
			progress_threshold: 10,
			pool: PoolKind::DatabaseInterface,
		}
	}
}

impl QueueConfig {
	/// Applies `DBNAV_MAX_ACTIVE_TASKS` and `DBNAV_DEAD_MAN_TIMEOUT_MS` when they are set.
	#[must_use]
	pub fn with_env_overrides(mut self) -> Self {
		if let Some(max_active_tasks) = read_env(MAX_ACTIVE_TASKS_ENV) {
			self.max_active_tasks = max_active_tasks;
		}

		if let Some(dead_man_timeout_ms) = read_env(DEAD_MAN_TIMEOUT_ENV) {
			self.dead_man_timeout_ms = dead_man_timeout_ms;
		}

		self
	}

	#[must_use]
	pub const fn dead_man_timeout(&self) -> Duration {
		Duration::from_millis(self.dead_man_timeout_ms)
	}

	#[must_use]
	pub const fn wake_interval(&self, dispatch_thread: bool) -> Duration {
		if dispatch_thread {
			Duration::from_millis(self.wake_interval_ms)
		} else {
			Duration::from_millis(self.wake_interval_ms.saturating_mul(10))
		}
	}

	/// Keeps at least one pool thread free so a finishing worker can always hand over.
	pub(crate) fn validated(mut self, pool: &PoolConfig) -> Self {
		let ceiling = pool.max_size.saturating_sub(1).max(1);
		let clamped = self.max_active_tasks.clamp(1, ceiling);

		if clamped != self.max_active_tasks {
			warn!(
				requested = self.max_active_tasks,
				clamped,
				pool = %self.pool,
				"Max active tasks does not fit the worker pool, clamping;"
			);
			self.max_active_tasks = clamped;
		}

		self
	}
}

/// Sizing of a single worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
	pub core_size: usize,
	pub max_size: usize,

	/// Daemon pools are not waited for on shutdown
	pub daemon: bool,

	/// Idle time after which threads above `core_size` retire
	#[serde(default = "default_keep_alive_ms")]
	pub keep_alive_ms: u64,
}

const fn default_keep_alive_ms() -> u64 {
	60 * 1000
}

impl PoolConfig {
	#[must_use]
	pub const fn new(core_size: usize, max_size: usize, daemon: bool) -> Self {
		Self {
			core_size,
			max_size,
			daemon,
			keep_alive_ms: default_keep_alive_ms(),
		}
	}

	#[must_use]
	pub const fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
		#[allow(clippy::cast_possible_truncation)]
		{
			self.keep_alive_ms = keep_alive.as_millis() as u64;
		}
		self
	}

	#[must_use]
	pub const fn keep_alive(&self) -> Duration {
		Duration::from_millis(self.keep_alive_ms)
	}

	fn validated(mut self, kind: PoolKind) -> Self {
		if self.max_size == 0 {
			warn!(pool = %kind, "Worker pool configured with zero threads, using one;");
			self.max_size = 1;
		}

		if self.core_size > self.max_size {
			warn!(
				pool = %kind,
				core_size = self.core_size,
				max_size = self.max_size,
				"Core size exceeds max size, lowering core size;"
			);
			self.core_size = self.max_size;
		}

		self
	}
}

fn read_env<T: std::str::FromStr>(name: &str) -> Option<T> {
	let value = env::var(name).ok()?;

	value
		.trim()
		.parse()
		.map_err(|_| warn!(%name, %value, "Ignoring unparseable environment override;"))
		.ok()
}
