//! In-process stand-ins for the external collaborators.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream;
use job_broadcast::{Segment, VideoMetadata};
use sqlx::sqlite::SqlitePoolOptions;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::services::{ChatBackend, ChatMessage, DownloadEvent, MediaSource, MetadataStore, SqliteMetadataStore, TokenStream, TranscriptionEngine};

pub async fn metadata_store() -> Arc<dyn MetadataStore> {
	let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
	let store = SqliteMetadataStore::new(pool);
	store.migrate().await.unwrap();
	Arc::new(store)
}

#[derive(Debug, Default)]
pub struct FakeMedia {
	pub fail_with: Option<String>,
	downloads: AtomicUsize,
}

impl FakeMedia {
	pub fn failing(message: &str) -> Self {
		Self {
			fail_with: Some(message.to_string()),
			..Self::default()
		}
	}

	pub fn downloads(&self) -> usize {
		self.downloads.load(Ordering::SeqCst)
	}
}

impl MediaSource for FakeMedia {
	fn metadata(&self, video_id: &str) -> Result<VideoMetadata> {
		if let Some(message) = &self.fail_with {
			return Err(anyhow!("{message}"));
		}
		Ok(VideoMetadata {
			video_id: video_id.to_string(),
			title: Some("Fake video".into()),
			duration: Some(90.0),
			..VideoMetadata::default()
		})
	}

	fn download_audio(&self, _video_id: &str, dest: &Path, on_event: &mut dyn FnMut(DownloadEvent)) -> Result<()> {
		self.downloads.fetch_add(1, Ordering::SeqCst);
		for (index, percent) in [(1, 50.0), (1, 100.0), (2, 30.0), (2, 20.0), (2, 100.0)] {
			on_event(DownloadEvent::Fragment { index, count: 2, percent });
		}
		on_event(DownloadEvent::Finished);

		if let Some(parent) = dest.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(dest, b"RIFF")?;
		Ok(())
	}
}

#[derive(Debug, Default)]
pub struct FakeEngine {
	pub segments: Vec<Segment>,
	pub fail_with: Option<String>,
}

impl FakeEngine {
	pub fn with_lines(lines: &[&str]) -> Self {
		let segments = lines
			.iter()
			.zip(0_u32..)
			.map(|(text, i)| Segment {
				start: f64::from(i) * 5.0,
				end: f64::from(i + 1) * 5.0,
				text: (*text).to_string(),
			})
			.collect();
		Self { segments, fail_with: None }
	}
}

impl TranscriptionEngine for FakeEngine {
	fn name(&self) -> &'static str {
		"fake"
	}

	fn transcribe(&self, _audio: &Path, on_segment: &mut dyn FnMut(Segment)) -> Result<()> {
		if let Some(message) = &self.fail_with {
			return Err(anyhow!("{message}"));
		}
		for segment in &self.segments {
			on_segment(segment.clone());
		}
		Ok(())
	}
}

/// Streams a fixed reply and records every prompt it was sent
#[derive(Debug, Default)]
pub struct FakeLlm {
	pub tokens: Vec<String>,
	pub fail_with: Option<String>,
	pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeLlm {
	pub fn replying(tokens: &[&str]) -> Self {
		Self {
			tokens: tokens.iter().map(|t| (*t).to_string()).collect(),
			..Self::default()
		}
	}

	pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
		self.requests.lock().unwrap().clone()
	}
}

#[async_trait]
impl ChatBackend for FakeLlm {
	fn name(&self) -> &'static str {
		"fake"
	}

	async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
		self.requests.lock().unwrap().push(messages);
		if let Some(message) = &self.fail_with {
			return Err(anyhow!("{message}"));
		}
		let tokens: Vec<Result<String>> = self.tokens.iter().cloned().map(Ok).collect();
		Ok(Box::pin(stream::iter(tokens)))
	}

	async fn check(&self) -> Result<String> {
		match &self.fail_with {
			Some(message) => Err(anyhow!("{message}")),
			None => Ok("fake backend ready".to_string()),
		}
	}
}
