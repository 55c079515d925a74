use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use uuid::Uuid;

/// Key of an in-flight job, unique among the jobs currently registered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(Arc<str>);

impl JobKey {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for JobKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for JobKey {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for JobKey {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

/// Identifier handed out to each attached subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for SubscriberId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SubscriberId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Pipeline status of a job.
///
/// Variants are declared in pipeline order. `Success` and `Error` are terminal,
/// and `Error` is reachable from every non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Starting,
	Preparing,
	ExtractingMetadata,
	Downloading,
	Converting,
	Downloaded,
	Transcribing,
	Transcribed,
	Summarizing,
	Summarized,
	Success,
	Error,
}

impl JobStatus {
	const fn rank(self) -> u8 {
		match self {
			Self::Starting => 0,
			Self::Preparing => 1,
			Self::ExtractingMetadata => 2,
			Self::Downloading => 3,
			Self::Converting => 4,
			Self::Downloaded => 5,
			Self::Transcribing => 6,
			Self::Transcribed => 7,
			Self::Summarizing => 8,
			Self::Summarized => 9,
			Self::Success | Self::Error => 10,
		}
	}

	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Success | Self::Error)
	}

	/// Whether a job currently in `self` may move to `next`.
	///
	/// Repeating the current status is allowed, skipping ahead is allowed,
	/// moving backwards or leaving a terminal status is not.
	pub const fn can_advance_to(self, next: Self) -> bool {
		if self.is_terminal() {
			return false;
		}
		matches!(next, Self::Error) || next.rank() >= self.rank()
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Starting => "starting",
			Self::Preparing => "preparing",
			Self::ExtractingMetadata => "extracting_metadata",
			Self::Downloading => "downloading",
			Self::Converting => "converting",
			Self::Downloaded => "downloaded",
			Self::Transcribing => "transcribing",
			Self::Transcribed => "transcribed",
			Self::Summarizing => "summarizing",
			Self::Summarized => "summarized",
			Self::Success => "success",
			Self::Error => "error",
		}
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One timed piece of a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
	pub start: f64,
	pub end: f64,
	pub text: String,
}

/// Descriptive metadata of the media behind a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
	pub video_id: String,
	pub title: Option<String>,
	pub duration: Option<f64>,
	pub uploader: Option<String>,
	pub upload_date: Option<String>,
	pub thumbnail_url: Option<String>,
	pub webpage_url: Option<String>,
}

/// Snapshot of a job, replayed in full to every newly attached subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
	pub status: JobStatus,
	pub download_progress: f64,
	pub transcript_buffer: Vec<Segment>,
	pub summary_buffer: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub video: Option<VideoMetadata>,
}

impl Default for JobState {
	fn default() -> Self {
		Self {
			status: JobStatus::Starting,
			download_progress: 0.0,
			transcript_buffer: Vec::new(),
			summary_buffer: String::new(),
			video: None,
		}
	}
}

impl JobState {
	/// Merge `patch` field by field, last writer wins.
	///
	/// A status that cannot follow the current one and a progress value lower
	/// than the current one are ignored. Returns false when anything was ignored.
	pub fn apply(&mut self, patch: StatePatch) -> bool {
		let mut clean = true;

		if let Some(status) = patch.status {
			if self.status.can_advance_to(status) {
				self.status = status;
			} else {
				clean = false;
			}
		}

		if let Some(progress) = patch.download_progress {
			if progress.is_finite() && progress >= self.download_progress {
				self.download_progress = progress.min(100.0);
			} else {
				clean = false;
			}
		}

		if let Some(transcript) = patch.transcript_buffer {
			self.transcript_buffer = transcript;
		}

		if let Some(summary) = patch.summary_buffer {
			self.summary_buffer = summary;
		}

		if let Some(video) = patch.video {
			self.video = Some(video);
		}

		clean
	}
}

/// Field-level overwrite applied to a [`JobState`] before a broadcast
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
	pub status: Option<JobStatus>,
	pub download_progress: Option<f64>,
	pub transcript_buffer: Option<Vec<Segment>>,
	pub summary_buffer: Option<String>,
	pub video: Option<VideoMetadata>,
}

impl StatePatch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn status(mut self, status: JobStatus) -> Self {
		self.status = Some(status);
		self
	}

	pub fn download_progress(mut self, progress: f64) -> Self {
		self.download_progress = Some(progress);
		self
	}

	pub fn transcript_buffer(mut self, segments: Vec<Segment>) -> Self {
		self.transcript_buffer = Some(segments);
		self
	}

	pub fn summary_buffer(mut self, summary: impl Into<String>) -> Self {
		self.summary_buffer = Some(summary.into());
		self
	}

	pub fn video(mut self, video: VideoMetadata) -> Self {
		self.video = Some(video);
		self
	}

	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}
}

/// Streaming state of the current chat turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
	pub text: String,
	pub turn: u64,
	#[serde(rename = "is_responding")]
	pub responding: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_moves_forward_or_to_error() {
		assert!(JobStatus::Starting.can_advance_to(JobStatus::Preparing));
		assert!(JobStatus::Preparing.can_advance_to(JobStatus::Downloaded));
		assert!(JobStatus::Transcribed.can_advance_to(JobStatus::Transcribed));
		assert!(JobStatus::Downloading.can_advance_to(JobStatus::Error));
		assert!(!JobStatus::Transcribing.can_advance_to(JobStatus::Downloading));
		assert!(!JobStatus::Error.can_advance_to(JobStatus::Success));
		assert!(!JobStatus::Success.can_advance_to(JobStatus::Error));
	}

	#[test]
	fn status_serializes_snake_case() {
		let json = serde_json::to_string(&JobStatus::ExtractingMetadata).unwrap();
		assert_eq!(json, "\"extracting_metadata\"");
		assert_eq!(JobStatus::ExtractingMetadata.to_string(), "extracting_metadata");
	}

	#[test]
	fn apply_ignores_progress_regression() {
		let mut state = JobState::default();
		assert!(state.apply(StatePatch::new().download_progress(40.0)));
		assert!(!state.apply(StatePatch::new().download_progress(20.0)));
		assert_eq!(state.download_progress, 40.0);

		assert!(state.apply(StatePatch::new().download_progress(250.0)));
		assert_eq!(state.download_progress, 100.0);
	}

	#[test]
	fn apply_ignores_backwards_status() {
		let mut state = JobState::default();
		state.apply(StatePatch::new().status(JobStatus::Transcribing));
		assert!(!state.apply(StatePatch::new().status(JobStatus::Preparing)));
		assert_eq!(state.status, JobStatus::Transcribing);
	}

	#[test]
	fn snapshot_omits_missing_video() {
		let value = serde_json::to_value(JobState::default()).unwrap();
		assert_eq!(value["status"], "starting");
		assert_eq!(value["download_progress"], 0.0);
		assert!(value.get("video").is_none());
	}

	#[test]
	fn chat_turn_uses_wire_field_names() {
		let value = serde_json::to_value(ChatTurn { text: "hi".into(), turn: 2, responding: true }).unwrap();
		assert_eq!(value, serde_json::json!({ "text": "hi", "turn": 2, "is_responding": true }));
	}
}
