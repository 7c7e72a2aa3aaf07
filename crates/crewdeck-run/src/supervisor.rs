use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;

use crate::feed::{pump_lines, DisconnectGuard, LineFeed, RunFollower};
use crate::slot::RunSlot;
use crate::types::{RunEvent, RunHandle, RunSpec, RunStatus, StartError};

/// Orchestrates the one-run lifecycle: spawn into the slot, pump output
/// into the feed, reap the child, release the slot.
pub struct Supervisor {
	slot: RunSlot,
}

/// A freshly spawned run: the shared handle plus the parts only the
/// waiter task may own (the child and its output pipe).
pub struct ActiveRun {
	pub(crate) handle: RunHandle,
	child: Child,
	output: Option<ChildStdout>,
	done_tx: watch::Sender<Option<i32>>,
}

impl Supervisor {
	pub fn new() -> Arc<Self> {
		Arc::new(Self { slot: RunSlot::new() })
	}

	/// Spawn a run if the slot is empty. Returns immediately; the run
	/// proceeds whether or not anyone ever attaches to its output.
	pub async fn start(self: &Arc<Self>, spec: RunSpec) -> Result<RunStatus, StartError> {
		self.start_with(spec, || Ok(())).await
	}

	/// Like [`start`](Self::start), with a preparation step (writing the
	/// run's config, say) executed inside the slot's critical section,
	/// after the emptiness check and before the spawn. A conflicting
	/// start fails before `prepare` runs, so a rejected start leaves no
	/// state change behind; a failed `prepare` leaves the slot empty.
	pub async fn start_with<F>(
		self: &Arc<Self>,
		spec: RunSpec,
		prepare: F,
	) -> Result<RunStatus, StartError>
	where
		F: FnOnce() -> Result<(), StartError>,
	{
		let run = self
			.slot
			.try_occupy(|| {
				prepare()?;
				spawn_run(&spec)
			})
			.await?;
		let status = run.handle.status();
		tracing::info!("crew started (pid {}, topic {:?})", status.pid, status.topic);

		let sup = Arc::clone(self);
		tokio::spawn(async move {
			run_to_exit(sup, run).await;
		});

		Ok(status)
	}

	/// Follow the current run's output from the start of its retained
	/// history. `None` when nothing is running — a run may legitimately
	/// have finished between start and attach, so this is not an error.
	pub async fn attach(&self) -> Option<RunFollower> {
		let handle = self.slot.current().await?;
		let (cursor, wake) = handle.feed.attach().await;
		Some(RunFollower {
			feed: handle.feed.clone(),
			cursor,
			wake,
			finished: false,
			_guard: DisconnectGuard {
				pid: handle.pid,
				done: handle.done.clone(),
			},
		})
	}

	/// Terminate the current run, if any. Returns the stopped run's
	/// status, or `None` when nothing was running (safe to call any
	/// number of times). The slot is released by the waiter once the
	/// exit is confirmed, so a racing start keeps getting a conflict
	/// until the old run is actually gone.
	pub async fn stop(&self) -> Option<RunStatus> {
		let handle = self.slot.current().await?;
		tracing::info!("stopping crew (pid {})", handle.pid);
		kill_run_tree(handle.pid);
		Some(handle.status())
	}

	pub async fn status(&self) -> Option<RunStatus> {
		Some(self.slot.current().await?.status())
	}
}

fn spawn_run(spec: &RunSpec) -> Result<ActiveRun, StartError> {
	// stderr is folded into stdout before the command runs, so the
	// stream keeps the child's emission order across both.
	let command = format!("exec 2>&1; {}", spec.command);

	let mut cmd = Command::new("sh");
	cmd.args(["-c", &command])
		.current_dir(&spec.dir)
		.stdout(Stdio::piped())
		.stderr(Stdio::null())
		.process_group(0);

	for (key, val) in &spec.env {
		cmd.env(key, val);
	}

	let mut child = cmd.spawn()?;
	let pid = child.id().unwrap_or(0);
	let output = child.stdout.take();
	let (done_tx, done_rx) = watch::channel(None);

	Ok(ActiveRun {
		handle: RunHandle {
			pid,
			topic: spec.topic.clone(),
			feed: LineFeed::new(),
			done: done_rx,
		},
		child,
		output,
		done_tx,
	})
}

/// Waiter task, one per run. Reaps the child, makes sure every line has
/// been flushed into the feed, then releases the slot and pushes the
/// terminal event — in that order, so a consumer that sees the terminal
/// event can immediately start a new run.
async fn run_to_exit(supervisor: Arc<Supervisor>, mut run: ActiveRun) {
	let pump = run.output.take().map(|output| {
		let feed = run.handle.feed.clone();
		tokio::spawn(pump_lines(output, feed))
	});

	let code = match run.child.wait().await {
		Ok(status) => status.code().unwrap_or(-1),
		Err(e) => {
			tracing::error!("wait failed for pid {}: {}", run.handle.pid, e);
			-1
		}
	};

	// The pipe hits EOF at exit; joining the pump guarantees no line
	// lands after the terminal event.
	if let Some(pump) = pump {
		let _ = pump.await;
	}

	let _ = run.done_tx.send(Some(code));
	supervisor.slot.release().await;
	run.handle.feed.push(RunEvent::Exited { code }).await;
	tracing::info!("crew exited (pid {}, code {})", run.handle.pid, code);
}

/// SIGTERM the run's process group, escalating to SIGKILL after a grace
/// period. Runs the escalation off the caller's path; callable from
/// non-async contexts (the disconnect guard drops synchronously).
pub(crate) fn kill_run_tree(pid: u32) {
	use nix::sys::signal::{killpg, Signal};
	use nix::unistd::Pid;
	let pgid = Pid::from_raw(pid as i32);
	let _ = killpg(pgid, Signal::SIGTERM);
	std::thread::spawn(move || {
		std::thread::sleep(std::time::Duration::from_secs(3));
		let _ = killpg(pgid, Signal::SIGKILL);
	});
}
