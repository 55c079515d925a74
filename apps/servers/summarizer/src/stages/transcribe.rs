use async_trait::async_trait;
use job_broadcast::{DataKind, JobHandle, JobStatus, Segment, StageError, StageUpdate, StatePatch, WorkerBridge};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::pipeline::Stage;
use crate::services::{ArtifactStore, MetadataStore, TranscriptionEngine};

const NAME: &str = "transcribe";

/// Turns the downloaded audio into a timed transcript
pub struct Transcribe {
	engine: Arc<dyn TranscriptionEngine>,
	metadata: Arc<dyn MetadataStore>,
	artifacts: ArtifactStore,
}

impl Transcribe {
	pub fn new(engine: Arc<dyn TranscriptionEngine>, metadata: Arc<dyn MetadataStore>, artifacts: ArtifactStore) -> Self {
		Self { engine, metadata, artifacts }
	}
}

#[async_trait]
impl Stage for Transcribe {
	fn name(&self) -> &'static str {
		NAME
	}

	async fn run(&self, job: &JobHandle) -> Result<(), StageError> {
		let video_id = job.key().as_str().to_string();

		if self.metadata.get(&video_id).await?.is_some_and(|record| record.is_transcribed()) {
			info!(video_id = %video_id, "Transcript already present, skipping transcription");
			job.update_status(JobStatus::Transcribed, "Transcript already available").await?;
			return Ok(());
		}

		job.update_status(JobStatus::Transcribing, format!("Transcribing audio with {}", self.engine.name())).await?;

		let engine = Arc::clone(&self.engine);
		let audio = self.artifacts.audio_path(&video_id);
		let mut bridge = WorkerBridge::spawn_blocking(NAME, move |tx| {
			engine.transcribe(&audio, &mut |segment| {
				tx.update(segment);
			})
		});

		let mut segments: Vec<Segment> = Vec::new();
		while let Some(update) = bridge.recv().await? {
			match update {
				StageUpdate::Status { status, message } => job.update_status(status, message).await?,
				StageUpdate::Update(segment) => {
					let text = segment.text.trim();
					if text.is_empty() {
						continue;
					}
					let segment = Segment {
						text: text.to_string(),
						..segment
					};
					let payload = json!({ "start": segment.start, "end": segment.end, "text": segment.text });
					segments.push(segment);
					job.broadcast_data(DataKind::TranscriptSegment, payload, StatePatch::new().transcript_buffer(segments.clone()), job.pace()).await?;
				}
			}
		}

		if segments.is_empty() {
			return Err(StageError::failed(NAME, "no speech found in audio"));
		}

		let path = self.artifacts.write_transcript(&video_id, &segments).await?;
		self.metadata.mark_transcribed(&video_id, &path.to_string_lossy()).await?;
		info!(video_id = %video_id, segments = segments.len(), "📝 Transcript saved");

		job.update_status(JobStatus::Transcribed, "Transcription complete").await?;
		Ok(())
	}
}
