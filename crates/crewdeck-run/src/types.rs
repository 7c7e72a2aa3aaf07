use std::collections::HashMap;
use std::path::PathBuf;
use serde::Serialize;
use tokio::sync::watch;

use crate::feed::LineFeed;

/// Everything needed to launch one crew run. Built by the caller; the
/// supervisor only executes it (any topic materialization happens via
/// the prepare step of `Supervisor::start_with`).
#[derive(Debug, Clone)]
pub struct RunSpec {
	pub topic: String,
	/// Shell command, run via `sh -c`.
	pub command: String,
	pub dir: PathBuf,
	pub env: HashMap<String, String>,
}

/// Cheap-clone reference to the run occupying the slot. The child itself
/// is owned by the waiter task; the handle carries what observers need.
#[derive(Clone)]
pub struct RunHandle {
	pub pid: u32,
	pub topic: String,
	pub(crate) feed: LineFeed,
	/// `Some(code)` once the child has been reaped.
	pub(crate) done: watch::Receiver<Option<i32>>,
}

impl RunHandle {
	pub fn status(&self) -> RunStatus {
		RunStatus {
			pid: self.pid,
			topic: self.topic.clone(),
		}
	}
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunStatus {
	pub pid: u32,
	pub topic: String,
}

/// One item of a run's output stream. `Exited` is always the last event
/// of a run and carries the exit code (-1 when killed by a signal or the
/// status could not be read).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
	Line { text: String },
	Exited { code: i32 },
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
	#[error("a crew is already running (pid {pid})")]
	AlreadyRunning { pid: u32 },
	#[error("failed to spawn crew: {0}")]
	Spawn(#[from] std::io::Error),
	/// A `start_with` preparation step failed; the slot stays empty.
	#[error("failed to materialize run config: {0}")]
	Materialize(String),
}
