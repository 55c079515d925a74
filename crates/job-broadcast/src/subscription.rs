use crate::error::JobError;
use crate::event::{Event, Frame};
use crate::types::{JobKey, SubscriberId};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Subscriber queues owned by one job actor
pub(crate) struct Subscribers {
	key: JobKey,
	queues: HashMap<SubscriberId, mpsc::UnboundedSender<Event>>,
	limit: usize,
}

impl Subscribers {
	pub(crate) fn new(key: JobKey, limit: usize) -> Self {
		Self {
			key,
			queues: HashMap::new(),
			limit,
		}
	}

	pub(crate) fn add(&mut self) -> Result<(SubscriberId, mpsc::UnboundedReceiver<Event>), JobError> {
		if self.queues.len() >= self.limit {
			return Err(JobError::SubscriberLimit {
				key: self.key.clone(),
				limit: self.limit,
			});
		}

		let id = SubscriberId::new();
		let (tx, rx) = mpsc::unbounded_channel();
		self.queues.insert(id, tx);
		debug!(job = %self.key, subscriber = %id, subscribers = self.queues.len(), "Subscriber attached");

		Ok((id, rx))
	}

	pub(crate) fn remove(&mut self, id: SubscriberId) -> bool {
		let removed = self.queues.remove(&id).is_some();
		if removed {
			debug!(job = %self.key, subscriber = %id, subscribers = self.queues.len(), "Subscriber detached");
		}
		removed
	}

	/// Push `event` to every queue, pruning queues whose receiver is gone
	pub(crate) fn fan_out(&mut self, event: &Event) -> usize {
		let key = &self.key;
		self.queues.retain(|id, tx| {
			let alive = tx.send(event.clone()).is_ok();
			if !alive {
				debug!(job = %key, subscriber = %id, "Pruned dead subscriber queue");
			}
			alive
		});
		self.queues.len()
	}

	/// Push the close marker to every queue and forget them all
	pub(crate) fn close_all(&mut self, close: Event) -> usize {
		let count = self.queues.len();
		for (_, tx) in self.queues.drain() {
			let _ = tx.send(close.clone());
		}
		count
	}

	pub(crate) fn len(&self) -> usize {
		self.queues.len()
	}
}

/// Runs once when a subscription is dropped, deregistering it from its job
pub(crate) struct DetachGuard {
	id: SubscriberId,
	detach: Option<Box<dyn FnOnce(SubscriberId) + Send>>,
}

impl DetachGuard {
	pub(crate) fn new(id: SubscriberId, detach: impl FnOnce(SubscriberId) + Send + 'static) -> Self {
		Self {
			id,
			detach: Some(Box::new(detach)),
		}
	}
}

impl Drop for DetachGuard {
	fn drop(&mut self) {
		if let Some(detach) = self.detach.take() {
			detach(self.id);
		}
	}
}

/// A live attachment to a job: the snapshot taken at attach time plus the
/// queue of every event broadcast afterwards.
///
/// Dropping the subscription deregisters it from the job.
pub struct Subscription<S> {
	id: SubscriberId,
	snapshot: S,
	events: mpsc::UnboundedReceiver<Event>,
	guard: DetachGuard,
}

impl<S> Subscription<S> {
	pub(crate) fn new(id: SubscriberId, snapshot: S, events: mpsc::UnboundedReceiver<Event>, guard: DetachGuard) -> Self {
		Self { id, snapshot, events, guard }
	}

	pub fn id(&self) -> SubscriberId {
		self.id
	}

	pub fn snapshot(&self) -> &S {
		&self.snapshot
	}

	/// Next queued event, or `None` once the job is gone
	pub async fn recv(&mut self) -> Option<Event> {
		self.events.recv().await
	}
}

impl<S: fmt::Debug> fmt::Debug for Subscription<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription").field("id", &self.id).field("snapshot", &self.snapshot).finish_non_exhaustive()
	}
}

impl<S: Serialize + Send + 'static> Subscription<S> {
	/// Snapshot frame first, then one frame per event until the close frame.
	///
	/// If the job disappears without sending a close marker the stream simply ends.
	pub fn into_frames(self) -> impl Stream<Item = Frame> + Send + 'static {
		let Self { snapshot, events, guard, .. } = self;
		let first = Frame::snapshot(&snapshot);

		let live = stream::unfold(Some((events, guard)), |open| async move {
			let (mut events, guard) = open?;
			let event = events.recv().await?;
			let terminal = event.is_terminal();
			let frame = event.into_frame();
			let next = if terminal { None } else { Some((events, guard)) };
			Some((frame, next))
		});

		stream::once(async move { first }).chain(live)
	}
}

/// Cooperative pause after a fan-out
pub(crate) async fn pace(duration: std::time::Duration) {
	if duration.is_zero() {
		tokio::task::yield_now().await;
	} else {
		tokio::time::sleep(duration).await;
	}
}
