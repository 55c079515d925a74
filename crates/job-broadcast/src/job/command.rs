use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::JobError;
use crate::event::{DataKind, Event};
use crate::types::{JobState, JobStatus, StatePatch, SubscriberId};

pub type Attached = (SubscriberId, JobState, mpsc::UnboundedReceiver<Event>);

/// Messages a job actor understands
#[derive(Debug)]
pub enum JobCommand {
	UpdateStatus { status: JobStatus, message: String },

	Broadcast { kind: DataKind, payload: Value, patch: StatePatch },

	Subscribe { reply: oneshot::Sender<Result<Attached, JobError>> },

	Unsubscribe { id: SubscriberId },

	Snapshot { reply: oneshot::Sender<JobState> },

	SubscriberCount { reply: oneshot::Sender<usize> },

	Close { reply: oneshot::Sender<()> },
}
