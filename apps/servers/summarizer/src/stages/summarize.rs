use async_trait::async_trait;
use futures::StreamExt;
use job_broadcast::{DataKind, JobHandle, JobStatus, StageError, StageUpdate, StatePatch, WorkerBridge};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::pipeline::Stage;
use crate::services::prompt::{format_timestamped, split_text, strip_think, summary_request, CHUNK_OVERLAP, SUMMARY_SYSTEM_PROMPT};
use crate::services::{ArtifactStore, ChatBackend, ChatMessage};

const NAME: &str = "summarize";

/// Streams a summary of the transcript, one chunk of transcript at a time
pub struct Summarize {
	llm: Arc<dyn ChatBackend>,
	artifacts: ArtifactStore,
	max_chunk_size: usize,
	pace: Duration,
}

impl Summarize {
	pub fn new(llm: Arc<dyn ChatBackend>, artifacts: ArtifactStore, max_chunk_size: usize, pace: Duration) -> Self {
		Self {
			llm,
			artifacts,
			max_chunk_size,
			pace,
		}
	}
}

#[async_trait]
impl Stage for Summarize {
	fn name(&self) -> &'static str {
		NAME
	}

	async fn run(&self, job: &JobHandle) -> Result<(), StageError> {
		let video_id = job.key().as_str().to_string();
		job.update_status(JobStatus::Summarizing, format!("Summarizing with {}", self.llm.name())).await?;

		let segments = self
			.artifacts
			.read_transcript(&video_id)
			.await?
			.ok_or_else(|| StageError::failed(NAME, "transcript not found"))?;
		let chunks = split_text(&format_timestamped(&segments), self.max_chunk_size, CHUNK_OVERLAP);
		info!(video_id = %video_id, chunks = chunks.len(), "Summarizing transcript");

		let mut streamed = String::new();
		let mut summary = String::new();

		for (index, chunk) in chunks.iter().enumerate() {
			let llm = Arc::clone(&self.llm);
			let messages = vec![ChatMessage::system(SUMMARY_SYSTEM_PROMPT), ChatMessage::user(summary_request(chunk))];
			let mut bridge = WorkerBridge::spawn(NAME, move |tx| async move {
				let mut tokens = llm.stream_chat(messages).await?;
				while let Some(token) = tokens.next().await {
					if !tx.update(token?) {
						break;
					}
				}
				Ok::<(), anyhow::Error>(())
			});

			let mut chunk_text = String::new();
			while let Some(update) = bridge.recv().await? {
				match update {
					StageUpdate::Status { status, message } => job.update_status(status, message).await?,
					StageUpdate::Update(token) => {
						chunk_text.push_str(&token);
						streamed.push_str(&token);
						job.broadcast_data(
							DataKind::SummaryChunk,
							json!({ "content": token, "chunk": index }),
							StatePatch::new().summary_buffer(streamed.clone()),
							self.pace,
						)
						.await?;
					}
				}
			}

			let cleaned = strip_think(&chunk_text);
			debug!(video_id = %video_id, chunk = index, chars = cleaned.len(), "Chunk summarized");
			if !summary.is_empty() {
				summary.push_str("\n\n");
			}
			summary.push_str(&cleaned);
		}

		self.artifacts.write_summary(&video_id, &summary).await?;
		info!(video_id = %video_id, "📄 Summary saved");

		job.update_status(JobStatus::Summarized, "Summary complete").await?;
		Ok(())
	}
}
