use tokio::sync::Mutex;

use crate::supervisor::ActiveRun;
use crate::types::{RunHandle, StartError};

/// The single process slot. Holds at most one run, process-wide; the
/// exclusivity invariant lives entirely behind this mutex.
pub struct RunSlot {
	inner: Mutex<Option<RunHandle>>,
}

impl RunSlot {
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(None),
		}
	}

	/// Check-and-spawn as one critical section: the spawn closure runs
	/// while the lock is held, so two concurrent starts cannot both get
	/// past the emptiness check. A failed spawn leaves the slot empty.
	pub async fn try_occupy<F>(&self, spawn: F) -> Result<ActiveRun, StartError>
	where
		F: FnOnce() -> Result<ActiveRun, StartError>,
	{
		let mut slot = self.inner.lock().await;
		if let Some(handle) = slot.as_ref() {
			return Err(StartError::AlreadyRunning { pid: handle.pid });
		}
		let run = spawn()?;
		*slot = Some(run.handle.clone());
		Ok(run)
	}

	pub async fn current(&self) -> Option<RunHandle> {
		self.inner.lock().await.clone()
	}

	/// Idempotent: releasing an empty slot is a no-op.
	pub async fn release(&self) {
		self.inner.lock().await.take();
	}
}

impl Default for RunSlot {
	fn default() -> Self {
		Self::new()
	}
}
