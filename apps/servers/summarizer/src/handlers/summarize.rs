use crate::error::ApiError;
use crate::services::ArtifactStore;
use crate::utils::extract_video_id;
use crate::{sse, utils, AppState};
use axum::{
	extract::{Json, Path, State},
	response::IntoResponse,
};
use job_broadcast::{JobKey, JobState, Segment, VideoMetadata};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
	pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
	success: bool,
	video_id: String,
	message: &'static str,
}

#[axum::debug_handler]
#[instrument(name = "summarize", skip(state))]
pub async fn start(State(state): State<AppState>, Json(payload): Json<SummarizeRequest>) -> Result<Json<SummarizeResponse>, ApiError> {
	let url = payload.url.filter(|u| !u.trim().is_empty()).ok_or(ApiError::MissingField("url"))?;
	let video_id = extract_video_id(&url).ok_or(ApiError::InvalidUrl)?;

	state.pipeline.trigger(&state.jobs, JobKey::from(video_id.as_str()))?;
	info!(video_id = %video_id, "🚀 Processing started");

	Ok(Json(SummarizeResponse {
		success: true,
		video_id,
		message: "Processing started",
	}))
}

/// Live progress of an in-flight job as server-sent events
#[axum::debug_handler]
#[instrument(name = "summarize_subscribe", skip(state))]
pub async fn subscribe(State(state): State<AppState>, Path(video_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
	let video_id = utils::video_id(video_id)?;
	let job = state.jobs.get(&JobKey::from(video_id)).ok_or(ApiError::NoJob)?;
	let subscription = job.subscribe().await?;
	Ok(sse::stream(subscription))
}

#[derive(Debug, Serialize)]
pub struct CompletedState {
	video: Option<VideoMetadata>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryStatus {
	InProgress { state: JobState },
	Completed { state: CompletedState },
	NotStarted { video: VideoMetadata },
}

#[axum::debug_handler]
#[instrument(name = "summary_status", skip(state))]
pub async fn status(State(state): State<AppState>, Path(video_id): Path<String>) -> Result<Json<SummaryStatus>, ApiError> {
	let video_id = utils::video_id(video_id)?;
	if let Some(job) = state.jobs.get(&JobKey::from(video_id.as_str())) {
		if let Ok(snapshot) = job.snapshot().await {
			return Ok(Json(SummaryStatus::InProgress { state: snapshot }));
		}
	}

	let video = state.metadata.get(&video_id).await?.map(|record| record.video);

	if ArtifactStore::exists(&state.artifacts.summary_path(&video_id)).await {
		return Ok(Json(SummaryStatus::Completed {
			state: CompletedState { video },
		}));
	}

	video.map(|video| Json(SummaryStatus::NotStarted { video })).ok_or(ApiError::NotFound("Video"))
}

#[derive(Debug, Serialize)]
pub struct SummaryContent {
	content: String,
}

#[axum::debug_handler]
#[instrument(name = "summary", skip(state))]
pub async fn summary(State(state): State<AppState>, Path(video_id): Path<String>) -> Result<Json<SummaryContent>, ApiError> {
	let video_id = utils::video_id(video_id)?;
	let content = state.artifacts.read_summary(&video_id).await?.ok_or(ApiError::NotFound("Summary"))?;
	Ok(Json(SummaryContent { content }))
}

#[derive(Debug, Serialize)]
pub struct TranscriptContent {
	transcript: Vec<Segment>,
}

#[axum::debug_handler]
#[instrument(name = "transcript", skip(state))]
pub async fn transcript(State(state): State<AppState>, Path(video_id): Path<String>) -> Result<Json<TranscriptContent>, ApiError> {
	let video_id = utils::video_id(video_id)?;
	let transcript = state.artifacts.read_transcript(&video_id).await?.ok_or(ApiError::NotFound("Transcript"))?;
	Ok(Json(TranscriptContent { transcript }))
}
