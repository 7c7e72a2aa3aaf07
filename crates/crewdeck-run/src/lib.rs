//! # crewdeck-run
//!
//! Exclusive-run process supervisor: at most one external run at a time,
//! with live line-by-line output streaming.
//!
//! The slot rejects a second start while a run is active, the feed
//! delivers the run's combined stdout/stderr in emission order followed
//! by exactly one terminal exit event, and a consumer disconnecting
//! mid-stream terminates the run.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use crewdeck_run::{RunEvent, RunSpec, Supervisor};
//! use std::collections::HashMap;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sup = Supervisor::new();
//!
//! sup.start(RunSpec {
//!     topic: "Build landing page".into(),
//!     command: "echo hello".into(),
//!     dir: "/tmp".into(),
//!     env: HashMap::new(),
//! })
//! .await
//! .unwrap();
//!
//! let mut follower = sup.attach().await.unwrap();
//! while let Some(event) = follower.next().await {
//!     match event {
//!         RunEvent::Line { text } => println!("{}", text),
//!         RunEvent::Exited { code } => println!("exit {}", code),
//!     }
//! }
//! # }
//! ```

pub mod feed;
pub mod slot;
pub mod supervisor;
pub mod types;

pub use feed::RunFollower;
pub use slot::RunSlot;
pub use supervisor::Supervisor;
pub use types::{RunEvent, RunHandle, RunSpec, RunStatus, StartError};
