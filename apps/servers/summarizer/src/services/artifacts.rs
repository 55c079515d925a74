use anyhow::{Context, Result};
use job_broadcast::Segment;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::llm::ChatMessage;

const DOWNLOADS: &str = "downloads";
const TRANSCRIPTIONS: &str = "transcriptions";
const SUMMARIES: &str = "summaries";
const CHATS: &str = "chats";

/// Per-video files under the content directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
	root: PathBuf,
}

impl ArtifactStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub async fn init(&self) -> Result<()> {
		for dir in [DOWNLOADS, TRANSCRIPTIONS, SUMMARIES, CHATS] {
			let path = self.root.join(dir);
			tokio::fs::create_dir_all(&path).await.with_context(|| format!("creating {}", path.display()))?;
		}
		Ok(())
	}

	pub fn audio_path(&self, video_id: &str) -> PathBuf {
		self.root.join(DOWNLOADS).join(format!("{video_id}.wav"))
	}

	pub fn transcript_path(&self, video_id: &str) -> PathBuf {
		self.root.join(TRANSCRIPTIONS).join(format!("{video_id}.json"))
	}

	pub fn summary_path(&self, video_id: &str) -> PathBuf {
		self.root.join(SUMMARIES).join(format!("{video_id}.md"))
	}

	pub fn chat_path(&self, video_id: &str) -> PathBuf {
		self.root.join(CHATS).join(format!("{video_id}_chat.json"))
	}

	pub async fn exists(path: &Path) -> bool {
		tokio::fs::try_exists(path).await.unwrap_or(false)
	}

	pub async fn write_transcript(&self, video_id: &str, segments: &[Segment]) -> Result<PathBuf> {
		let path = self.transcript_path(video_id);
		write_creating_parent(&path, serde_json::to_vec_pretty(segments)?).await?;
		Ok(path)
	}

	pub async fn read_transcript(&self, video_id: &str) -> Result<Option<Vec<Segment>>> {
		let path = self.transcript_path(video_id);
		match tokio::fs::read(&path).await {
			Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
		}
	}

	/// Plain transcript text for chat context, empty when unavailable
	pub async fn transcript_text(&self, video_id: &str) -> String {
		match self.read_transcript(video_id).await {
			Ok(Some(segments)) => segments.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" "),
			Ok(None) => String::new(),
			Err(e) => {
				warn!(video_id, error = %e, "Failed to load transcript");
				String::new()
			}
		}
	}

	pub async fn write_summary(&self, video_id: &str, summary: &str) -> Result<()> {
		write_creating_parent(&self.summary_path(video_id), summary.as_bytes().to_vec()).await
	}

	pub async fn read_summary(&self, video_id: &str) -> Result<Option<String>> {
		match tokio::fs::read_to_string(self.summary_path(video_id)).await {
			Ok(content) => Ok(Some(content)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// Stored conversation, empty when missing or unreadable
	pub async fn load_history(&self, video_id: &str) -> Vec<ChatMessage> {
		let path = self.chat_path(video_id);
		let Ok(bytes) = tokio::fs::read(&path).await else {
			return Vec::new();
		};

		serde_json::from_slice(&bytes).unwrap_or_else(|e| {
			warn!(video_id, error = %e, "Failed to load chat history, starting fresh");
			Vec::new()
		})
	}

	pub async fn save_history(&self, video_id: &str, messages: &[ChatMessage]) -> Result<()> {
		write_creating_parent(&self.chat_path(video_id), serde_json::to_vec_pretty(messages)?).await
	}

	/// Delete audio, transcript and summary, ignoring individual failures.
	/// Returns how many files were removed.
	pub async fn remove_media(&self, video_id: &str) -> usize {
		let mut removed = 0;
		for path in [self.audio_path(video_id), self.transcript_path(video_id), self.summary_path(video_id)] {
			match tokio::fs::remove_file(&path).await {
				Ok(()) => removed += 1,
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
				Err(e) => debug!(path = %path.display(), error = %e, "Could not remove artifact"),
			}
		}
		removed
	}
}

async fn write_creating_parent(path: &Path, bytes: Vec<u8>) -> Result<()> {
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	tokio::fs::write(path, bytes).await.with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::services::llm::Role;

	fn segment(start: f64, text: &str) -> Segment {
		Segment {
			start,
			end: start + 1.0,
			text: text.to_string(),
		}
	}

	#[tokio::test]
	async fn transcript_round_trips_and_joins_text() {
		let dir = tempfile::tempdir().unwrap();
		let store = ArtifactStore::new(dir.path());

		assert_eq!(store.read_transcript("abc").await.unwrap(), None);
		let path = store.write_transcript("abc", &[segment(0.0, "Hello"), segment(1.0, "world")]).await.unwrap();
		assert!(path.ends_with("transcriptions/abc.json"));

		assert_eq!(store.read_transcript("abc").await.unwrap().unwrap().len(), 2);
		assert_eq!(store.transcript_text("abc").await, "Hello world");
	}

	#[tokio::test]
	async fn history_is_empty_when_missing_or_corrupt() {
		let dir = tempfile::tempdir().unwrap();
		let store = ArtifactStore::new(dir.path());
		assert!(store.load_history("abc").await.is_empty());

		store.init().await.unwrap();
		tokio::fs::write(store.chat_path("abc"), b"not json").await.unwrap();
		assert!(store.load_history("abc").await.is_empty());

		let messages = vec![ChatMessage::user("Why?"), ChatMessage::assistant("Because.")];
		store.save_history("abc", &messages).await.unwrap();
		let loaded = store.load_history("abc").await;
		assert_eq!(loaded, messages);
		assert_eq!(loaded[0].role, Role::User);
	}

	#[tokio::test]
	async fn remove_media_ignores_missing_files() {
		let dir = tempfile::tempdir().unwrap();
		let store = ArtifactStore::new(dir.path());
		store.init().await.unwrap();
		store.write_summary("abc", "# Summary").await.unwrap();
		tokio::fs::write(store.audio_path("abc"), b"RIFF").await.unwrap();

		assert_eq!(store.remove_media("abc").await, 2);
		assert!(!ArtifactStore::exists(&store.summary_path("abc")).await);
		assert_eq!(store.remove_media("abc").await, 0);
	}
}
