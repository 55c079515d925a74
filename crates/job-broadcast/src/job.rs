//! Pipeline job: an actor that owns a [`JobState`](crate::types::JobState)
//! and the subscriber queues of one run, driven through a [`JobHandle`].
//!
//! All mutation happens inside the actor task, in command order, so every
//! subscriber observes events in exactly the order they were broadcast.

pub mod actor;
pub mod command;
pub mod handle;

pub use actor::JobActor;
pub use command::JobCommand;
pub use handle::JobHandle;

use std::time::Duration;

/// Tunables shared by every job and chat job a registry creates
#[derive(Debug, Clone)]
pub struct JobSettings {
	/// Pause after each ordinary fan-out
	pub pace: Duration,
	/// Upper bound on concurrently attached subscribers per job
	pub max_subscribers: usize,
	/// Capacity of the actor command channel
	pub command_buffer: usize,
}

impl Default for JobSettings {
	fn default() -> Self {
		Self {
			pace: Duration::from_millis(10),
			max_subscribers: 64,
			command_buffer: 256,
		}
	}
}
