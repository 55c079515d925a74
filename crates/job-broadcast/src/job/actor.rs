use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::command::JobCommand;
use crate::event::{Control, Event};
use crate::subscription::Subscribers;
use crate::types::{JobKey, JobState, StatePatch};

/// Job actor that owns the snapshot and the subscriber queues
pub struct JobActor {
	key: JobKey,
	state: JobState,
	subscribers: Subscribers,
	commands: mpsc::Receiver<JobCommand>,
}

impl JobActor {
	#[must_use]
	pub fn new(key: JobKey, commands: mpsc::Receiver<JobCommand>, max_subscribers: usize) -> Self {
		Self {
			subscribers: Subscribers::new(key.clone(), max_subscribers),
			key,
			state: JobState::default(),
			commands,
		}
	}

	/// Run the actor loop until the job is closed or every handle is dropped
	pub async fn run(mut self) {
		debug!(job = %self.key, "Job actor started");

		while let Some(cmd) = self.commands.recv().await {
			match cmd {
				JobCommand::UpdateStatus { status, message } => {
					if !self.state.status.can_advance_to(status) {
						warn!(job = %self.key, from = %self.state.status, to = %status, "Ignoring status regression");
						continue;
					}
					self.state.status = status;
					self.subscribers.fan_out(&Event::StatusUpdate { status, message });
				}

				JobCommand::Broadcast { kind, payload, patch } => {
					self.merge(patch);
					self.subscribers.fan_out(&Event::DataUpdate { kind, payload });
				}

				JobCommand::Subscribe { reply } => {
					let attached = self.subscribers.add().map(|(id, rx)| (id, self.state.clone(), rx));
					let _ = reply.send(attached);
				}

				JobCommand::Unsubscribe { id } => {
					self.subscribers.remove(id);
				}

				JobCommand::Snapshot { reply } => {
					let _ = reply.send(self.state.clone());
				}

				JobCommand::SubscriberCount { reply } => {
					let _ = reply.send(self.subscribers.len());
				}

				JobCommand::Close { reply } => {
					// Refuse further commands before acknowledging, so the handle reports closed
					self.commands.close();
					let released = self.subscribers.close_all(Event::Control(Control::Close));
					info!(job = %self.key, status = %self.state.status, released, "Job closed");
					let _ = reply.send(());
					break;
				}
			}
		}

		// Handles dropped without an explicit close still release their subscribers
		self.subscribers.close_all(Event::Control(Control::Close));
		debug!(job = %self.key, "Job actor stopped");
	}

	fn merge(&mut self, patch: StatePatch) {
		if patch.is_empty() {
			return;
		}
		let attempted = format!("{patch:?}");
		if !self.state.apply(patch) {
			warn!(job = %self.key, patch = %attempted, "Ignored regressing fields in state update");
		}
	}
}
