use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tokio::sync::Mutex;

use crate::supervisor::kill_run_tree;
use crate::types::RunEvent;

/// Retained-history cap. A follower that falls further behind than this
/// many events loses the oldest ones; within the cap, delivery is
/// complete and ordered no matter how bursty the run's output is.
const BACKLOG_EVENTS: usize = 10_000;

struct FeedState {
	events: VecDeque<RunEvent>,
	/// Sequence number of `events.front()`; grows as the cap evicts.
	start: u64,
}

/// Ordered event history for one run. Followers read out of the shared
/// history by sequence number, so a consumer that drains slower than
/// the child emits falls behind without dropping or reordering lines.
/// The watch channel is only a wake-up signal for caught-up followers.
#[derive(Clone)]
pub struct LineFeed {
	state: Arc<Mutex<FeedState>>,
	wake: watch::Sender<u64>,
}

impl LineFeed {
	pub(crate) fn new() -> Self {
		let (wake, _) = watch::channel(0);
		Self {
			state: Arc::new(Mutex::new(FeedState {
				events: VecDeque::new(),
				start: 0,
			})),
			wake,
		}
	}

	pub(crate) async fn push(&self, event: RunEvent) {
		let mut state = self.state.lock().await;
		if state.events.len() >= BACKLOG_EVENTS {
			state.events.pop_front();
			state.start += 1;
		}
		state.events.push_back(event);
		self.wake.send_modify(|n| *n = n.wrapping_add(1));
	}

	/// Starting cursor and wake-up channel for a new follower, taken
	/// under the history lock so no event can slip between the two.
	pub(crate) async fn attach(&self) -> (u64, watch::Receiver<u64>) {
		let state = self.state.lock().await;
		(state.start, self.wake.subscribe())
	}
}

/// Drains the child's merged output pipe into the feed, line by line.
/// A final partial line (no trailing newline) is flushed as a line;
/// read errors end the pump — the waiter reports the exit separately.
pub(crate) async fn pump_lines<R>(reader: R, feed: LineFeed)
where
	R: AsyncRead + Unpin,
{
	let mut lines = BufReader::new(reader).lines();
	loop {
		match lines.next_line().await {
			Ok(Some(text)) => feed.push(RunEvent::Line { text }).await,
			Ok(None) => break,
			Err(_) => break,
		}
	}
}

/// Consumer side of a run's stream: a cursor into the feed's history.
/// Yields every retained event in emission order, ending after the
/// terminal `Exited` event. Dropping the follower while the run is
/// still alive terminates the run — a stream with no one watching has
/// no reason to keep the crew going.
pub struct RunFollower {
	pub(crate) feed: LineFeed,
	pub(crate) cursor: u64,
	pub(crate) wake: watch::Receiver<u64>,
	pub(crate) finished: bool,
	pub(crate) _guard: DisconnectGuard,
}

impl RunFollower {
	/// Next event, suspending until one arrives. `None` once the
	/// terminal event has been delivered.
	pub async fn next(&mut self) -> Option<RunEvent> {
		if self.finished {
			return None;
		}
		loop {
			{
				let state = self.feed.state.lock().await;
				if self.cursor < state.start {
					tracing::warn!(
						"log follower fell {} events behind the retained history",
						state.start - self.cursor
					);
					self.cursor = state.start;
				}
				let idx = (self.cursor - state.start) as usize;
				if idx < state.events.len() {
					let event = state.events[idx].clone();
					self.cursor += 1;
					if matches!(event, RunEvent::Exited { .. }) {
						self.finished = true;
					}
					return Some(event);
				}
			}
			// Caught up. Every push bumps the wake channel, and a bump
			// between the check above and this await is still observed,
			// so no event can be slept through.
			if self.wake.changed().await.is_err() {
				self.finished = true;
				return None;
			}
		}
	}
}

pub(crate) struct DisconnectGuard {
	pub(crate) pid: u32,
	pub(crate) done: watch::Receiver<Option<i32>>,
}

impl Drop for DisconnectGuard {
	fn drop(&mut self) {
		if self.pid == 0 || self.done.borrow().is_some() {
			return;
		}
		tracing::info!("log consumer disconnected, terminating run (pid {})", self.pid);
		kill_run_tree(self.pid);
	}
}
