use crate::types::JobStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// Kind tag of a data update, rendered as the `type` field of an update frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
	DownloadProgress,
	VideoMetadata,
	TranscriptSegment,
	SummaryChunk,
	Error,
}

impl DataKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::DownloadProgress => "download_progress",
			Self::VideoMetadata => "video_metadata",
			Self::TranscriptSegment => "transcript_segment",
			Self::SummaryChunk => "summary_chunk",
			Self::Error => "error",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
	/// The job is closing; the last event a subscriber will see
	Close,
	/// A chat response finished streaming
	Complete,
	/// A chat response failed
	Error(String),
}

/// Everything that travels through a subscriber queue
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
	StatusUpdate { status: JobStatus, message: String },
	DataUpdate { kind: DataKind, payload: Value },
	Token(String),
	Control(Control),
}

impl Event {
	pub const fn is_terminal(&self) -> bool {
		matches!(self, Self::Control(Control::Close))
	}

	/// Render the event as a named server-push frame
	pub fn into_frame(self) -> Frame {
		match self {
			Self::StatusUpdate { status, message } => Frame::named(
				"update",
				json!({
					"type": "status_update",
					"data": { "status": status, "message": message },
				}),
			),
			Self::DataUpdate { kind, payload } => Frame::named("update", json!({ "type": kind, "data": payload })),
			Self::Token(token) => Frame::named("token", Value::String(token)),
			Self::Control(Control::Complete) => Frame::named("complete", json!({ "type": "response_complete" })),
			Self::Control(Control::Error(message)) => Frame::named("error", json!({ "error": message })),
			Self::Control(Control::Close) => Frame::named("close", json!({ "message": "Stream closed by server" })),
		}
	}
}

/// One frame of a subscriber stream: an optional event name plus JSON data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
	pub event: Option<&'static str>,
	pub data: String,
}

impl Frame {
	fn named(event: &'static str, data: Value) -> Self {
		Self {
			event: Some(event),
			data: data.to_string(),
		}
	}

	/// Unnamed frame carrying a full snapshot
	pub fn snapshot<S: Serialize>(snapshot: &S) -> Self {
		let data = serde_json::to_string(snapshot).unwrap_or_else(|e| {
			warn!(error = %e, "Failed to serialize snapshot");
			"{}".to_string()
		});
		Self { event: None, data }
	}
}
