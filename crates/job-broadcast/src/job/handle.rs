use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::command::JobCommand;
use super::{JobActor, JobSettings};
use crate::error::JobError;
use crate::event::DataKind;
use crate::subscription::{pace, DetachGuard, Subscription};
use crate::types::{JobKey, JobState, JobStatus, StatePatch, SubscriberId};

/// Cloneable handle to a running job actor
#[derive(Clone, Debug)]
pub struct JobHandle {
	key: JobKey,
	sender: mpsc::Sender<JobCommand>,
	pace: Duration,
}

impl JobHandle {
	/// Spawn a job actor on the current runtime and return its handle
	#[must_use]
	pub fn spawn(key: JobKey, settings: &JobSettings) -> Self {
		let (sender, receiver) = mpsc::channel(settings.command_buffer.max(1));
		let actor = JobActor::new(key.clone(), receiver, settings.max_subscribers);
		tokio::spawn(actor.run());

		Self {
			key,
			sender,
			pace: settings.pace,
		}
	}

	pub fn key(&self) -> &JobKey {
		&self.key
	}

	/// Default pause applied after an ordinary broadcast
	pub fn pace(&self) -> Duration {
		self.pace
	}

	pub fn is_closed(&self) -> bool {
		self.sender.is_closed()
	}

	/// Move the job to `status` and tell every subscriber.
	///
	/// A status that cannot follow the current one is dropped by the actor.
	pub async fn update_status(&self, status: JobStatus, message: impl Into<String>) -> Result<(), JobError> {
		self
			.send(JobCommand::UpdateStatus {
				status,
				message: message.into(),
			})
			.await
	}

	/// Merge `patch` into the snapshot, fan the data event out, then pause for `pace`
	pub async fn broadcast_data(&self, kind: DataKind, payload: Value, patch: StatePatch, pace_for: Duration) -> Result<(), JobError> {
		self.send(JobCommand::Broadcast { kind, payload, patch }).await?;
		pace(pace_for).await;
		Ok(())
	}

	/// Attach a subscriber. The returned subscription carries the snapshot taken
	/// at the moment of attachment and detaches itself when dropped.
	pub async fn subscribe(&self) -> Result<Subscription<JobState>, JobError> {
		let (tx, rx) = oneshot::channel();
		self.send(JobCommand::Subscribe { reply: tx }).await?;
		let (id, snapshot, events) = rx.await.map_err(|_| self.closed())??;

		let guard = DetachGuard::new(id, detach_from(self.sender.downgrade()));
		Ok(Subscription::new(id, snapshot, events, guard))
	}

	/// Current snapshot without subscribing
	pub async fn snapshot(&self) -> Result<JobState, JobError> {
		let (tx, rx) = oneshot::channel();
		self.send(JobCommand::Snapshot { reply: tx }).await?;
		rx.await.map_err(|_| self.closed())
	}

	pub async fn subscriber_count(&self) -> Result<usize, JobError> {
		let (tx, rx) = oneshot::channel();
		self.send(JobCommand::SubscriberCount { reply: tx }).await?;
		rx.await.map_err(|_| self.closed())
	}

	/// Push the close marker to every subscriber and stop the actor.
	///
	/// Closing an already closed job is a no-op.
	pub async fn close(&self) {
		let (tx, rx) = oneshot::channel();
		if self.sender.send(JobCommand::Close { reply: tx }).await.is_ok() {
			let _ = rx.await;
		}
	}

	async fn send(&self, cmd: JobCommand) -> Result<(), JobError> {
		self.sender.send(cmd).await.map_err(|_| self.closed())
	}

	fn closed(&self) -> JobError {
		JobError::Closed(self.key.clone())
	}
}

fn detach_from(sender: mpsc::WeakSender<JobCommand>) -> impl FnOnce(SubscriberId) + Send + 'static {
	move |id| {
		let Some(sender) = sender.upgrade() else {
			return;
		};
		if let Err(mpsc::error::TrySendError::Full(cmd)) = sender.try_send(JobCommand::Unsubscribe { id }) {
			if let Ok(runtime) = tokio::runtime::Handle::try_current() {
				runtime.spawn(async move {
					let _ = sender.send(cmd).await;
				});
			}
		}
	}
}
