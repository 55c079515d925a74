//! Job lifecycle and live event broadcast.
//!
//! A [`Registry`] owns one actor per in-flight key. Each actor holds the
//! snapshot of its job and the queues of its subscribers; a new subscriber
//! gets the snapshot first and every later event in broadcast order.
//! Blocking stage work reaches a job through a [`WorkerBridge`].

pub mod bridge;
pub mod chat;
pub mod error;
pub mod event;
pub mod job;
pub mod progress;
pub mod registry;
pub mod subscription;
pub mod types;

pub use bridge::{StageUpdate, WorkerBridge, WorkerMessage, WorkerSender};
pub use chat::ChatHandle;
pub use error::{JobError, RegistryError, StageError};
pub use event::{Control, DataKind, Event, Frame};
pub use job::{JobHandle, JobSettings};
pub use progress::DownloadProgress;
pub use registry::{Broadcaster, Registry};
pub use subscription::Subscription;
pub use types::{ChatTurn, JobKey, JobState, JobStatus, Segment, StatePatch, SubscriberId, VideoMetadata};

pub type JobRegistry = Registry<JobHandle>;
pub type ChatRegistry = Registry<ChatHandle>;
