use crate::error::ApiError;
use crate::services::ChatMessage;
use crate::{sse, utils, AppState};
use axum::{
	extract::{Json, Path, State},
	response::IntoResponse,
};
use job_broadcast::JobKey;
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Serialize)]
pub struct ChatHistory {
	messages: Vec<ChatMessage>,
}

#[axum::debug_handler]
#[instrument(name = "chat_history", skip(state))]
pub async fn history(State(state): State<AppState>, Path(video_id): Path<String>) -> Result<Json<ChatHistory>, ApiError> {
	let video_id = utils::video_id(video_id)?;
	Ok(Json(ChatHistory {
		messages: state.artifacts.load_history(&video_id).await,
	}))
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
	#[serde(default)]
	pub question: String,
}

#[derive(Serialize)]
pub struct AskResponse {
	success: bool,
	turn: u64,
	message: &'static str,
}

/// Chats only exist for videos the server knows about
async fn known_video(state: &AppState, video_id: String) -> Result<String, ApiError> {
	let video_id = utils::video_id(video_id)?;
	if state.metadata.get(&video_id).await?.is_none() {
		return Err(ApiError::NotFound("Video"));
	}
	Ok(video_id)
}

#[axum::debug_handler]
#[instrument(name = "chat_ask", skip(state, payload))]
pub async fn ask(State(state): State<AppState>, Path(video_id): Path<String>, Json(payload): Json<AskRequest>) -> Result<Json<AskResponse>, ApiError> {
	let video_id = known_video(&state, video_id).await?;
	let turn = state.chat.ask(&video_id, &payload.question).await?;
	Ok(Json(AskResponse {
		success: true,
		turn,
		message: "Question received, response streaming",
	}))
}

/// Answer tokens for a video's chat as server-sent events, creating the chat if needed.
///
/// The chat closes itself once its last subscriber leaves with no answer in flight.
#[axum::debug_handler]
#[instrument(name = "chat_subscribe", skip(state))]
pub async fn subscribe(State(state): State<AppState>, Path(video_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
	let video_id = known_video(&state, video_id).await?;
	let chat = state.chat.chats().get_or_create(JobKey::from(video_id));
	let subscription = chat.subscribe().await?;
	Ok(sse::stream(subscription))
}
