use async_trait::async_trait;
use job_broadcast::{DataKind, DownloadProgress, JobHandle, JobStatus, StageError, StageUpdate, StatePatch, VideoMetadata, WorkerBridge};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::pipeline::Stage;
use crate::services::{ArtifactStore, DownloadEvent, MediaSource, MetadataStore};

const NAME: &str = "download";

/// What the download worker reports besides status changes
#[derive(Debug)]
enum Acquired {
	Metadata(VideoMetadata),
	Progress(f64),
}

/// Makes sure the metadata record and the audio file exist for the job's video
pub struct AcquireAudio {
	media: Arc<dyn MediaSource>,
	metadata: Arc<dyn MetadataStore>,
	artifacts: ArtifactStore,
}

impl AcquireAudio {
	pub fn new(media: Arc<dyn MediaSource>, metadata: Arc<dyn MetadataStore>, artifacts: ArtifactStore) -> Self {
		Self { media, metadata, artifacts }
	}
}

#[async_trait]
impl Stage for AcquireAudio {
	fn name(&self) -> &'static str {
		NAME
	}

	async fn run(&self, job: &JobHandle) -> Result<(), StageError> {
		let video_id = job.key().as_str().to_string();
		job.update_status(JobStatus::Preparing, "Preparing download").await?;

		let audio = self.artifacts.audio_path(&video_id);
		let need_metadata = self.metadata.get(&video_id).await?.is_none();
		let need_audio = !ArtifactStore::exists(&audio).await;

		if !need_metadata && !need_audio {
			info!(video_id = %video_id, "Audio and metadata already present, skipping download");
			job.update_status(JobStatus::Downloaded, "Audio already available").await?;
			return Ok(());
		}

		let media = Arc::clone(&self.media);
		let id = video_id.clone();
		let mut bridge = WorkerBridge::spawn_blocking(NAME, move |tx| {
			if need_metadata {
				tx.status(JobStatus::ExtractingMetadata, "Extracting video metadata");
				let video = media.metadata(&id)?;
				tx.update(Acquired::Metadata(video));
			}

			if need_audio {
				tx.status(JobStatus::Downloading, "Downloading audio");
				let mut progress = DownloadProgress::new();
				media.download_audio(&id, &audio, &mut |event| {
					let advanced = match event {
						DownloadEvent::Fragment { index, count, percent } => progress.fragment(index, count, percent),
						DownloadEvent::Percent(percent) => progress.overall(percent),
						DownloadEvent::Finished => progress.overall(100.0),
					};
					if let Some(value) = advanced {
						tx.update(Acquired::Progress(value));
					}
					if event == DownloadEvent::Finished {
						tx.status(JobStatus::Converting, "Converting audio");
					}
				})?;
			}

			Ok(())
		});

		while let Some(update) = bridge.recv().await? {
			match update {
				StageUpdate::Status { status, message } => job.update_status(status, message).await?,
				StageUpdate::Update(Acquired::Metadata(video)) => {
					self.metadata.insert(&video).await?;
					debug!(video_id = %video_id, title = ?video.title, "Stored video metadata");
					let payload = serde_json::to_value(&video).map_err(anyhow::Error::from)?;
					job.broadcast_data(DataKind::VideoMetadata, payload, StatePatch::new().video(video), job.pace()).await?;
				}
				StageUpdate::Update(Acquired::Progress(value)) => {
					job.broadcast_data(
						DataKind::DownloadProgress,
						json!({ "progress": value, "message": format!("Downloading: {value:.1}%") }),
						StatePatch::new().download_progress(value),
						job.pace(),
					)
					.await?;
				}
			}
		}

		job.update_status(JobStatus::Downloaded, "Download complete").await?;
		Ok(())
	}
}
