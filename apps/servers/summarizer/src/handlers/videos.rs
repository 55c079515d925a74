use crate::error::ApiError;
use crate::services::VideoRecord;
use crate::{utils, AppState};
use axum::extract::{Json, Path, State};
use job_broadcast::JobKey;
use serde::Serialize;
use tracing::{info, instrument};

#[derive(Serialize)]
pub struct VideoList {
	videos: Vec<VideoRecord>,
}

#[axum::debug_handler]
#[instrument(name = "list_videos", skip(state))]
pub async fn list(State(state): State<AppState>) -> Result<Json<VideoList>, ApiError> {
	let videos = state.metadata.list().await?;
	Ok(Json(VideoList { videos }))
}

#[derive(Serialize)]
pub struct VideoResponse {
	video: VideoRecord,
}

#[axum::debug_handler]
#[instrument(name = "get_video", skip(state))]
pub async fn get(State(state): State<AppState>, Path(video_id): Path<String>) -> Result<Json<VideoResponse>, ApiError> {
	let video_id = utils::video_id(video_id)?;
	let video = state.metadata.get(&video_id).await?.ok_or(ApiError::NotFound("Video"))?;
	Ok(Json(VideoResponse { video }))
}

#[derive(Serialize)]
pub struct DeleteResponse {
	success: bool,
	message: String,
}

/// Remove a video's files and record, and close its chat
#[axum::debug_handler]
#[instrument(name = "delete_video", skip(state))]
pub async fn delete(State(state): State<AppState>, Path(video_id): Path<String>) -> Result<Json<DeleteResponse>, ApiError> {
	let video_id = utils::video_id(video_id)?;
	if state.metadata.get(&video_id).await?.is_none() {
		return Err(ApiError::NotFound("Video"));
	}

	let removed = state.artifacts.remove_media(&video_id).await;
	state.metadata.remove(&video_id).await?;
	state.chat.chats().close(&JobKey::from(video_id.as_str())).await;
	info!(video_id = %video_id, removed, "🗑️ Video deleted");

	Ok(Json(DeleteResponse {
		success: true,
		message: format!("Video {video_id} deleted successfully"),
	}))
}
