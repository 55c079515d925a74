//! HTTP service that downloads, transcribes and summarizes videos, streaming
//! every step to live subscribers.

use std::sync::Arc;

use axum::Router;
use job_broadcast::{ChatRegistry, JobRegistry};

pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod routes;
pub mod services;
pub mod sse;
pub mod stages;
pub mod utils;

#[cfg(test)]
mod testing;

pub use chat::ChatService;
pub use config::*;
pub use error::ApiError;
pub use pipeline::{Pipeline, Stage};

use crate::routes::{
	chat::chat,
	health::{get_config, get_health},
	summarize::summaries,
	videos::videos,
};
use crate::services::{ArtifactStore, ChatBackend, MediaSource, MetadataStore, TranscriptionEngine};
use crate::stages::{AcquireAudio, Summarize, Transcribe};

/// The external collaborators the service is wired to
#[derive(Clone)]
pub struct Backends {
	pub media: Arc<dyn MediaSource>,
	pub transcription: Arc<dyn TranscriptionEngine>,
	pub llm: Arc<dyn ChatBackend>,
	pub metadata: Arc<dyn MetadataStore>,
}

#[derive(Clone)]
pub struct AppState {
	pub config: Arc<Config>,
	pub jobs: JobRegistry,
	pub pipeline: Arc<Pipeline>,
	pub chat: ChatService,
	pub llm: Arc<dyn ChatBackend>,
	pub metadata: Arc<dyn MetadataStore>,
	pub artifacts: ArtifactStore,
}

impl AppState {
	pub fn build(config: Arc<Config>, backends: Backends) -> Self {
		let settings = config.job_settings();
		let artifacts = ArtifactStore::new(&config.content_dir);

		let pipeline = Pipeline::new(vec![
			Arc::new(AcquireAudio::new(backends.media, Arc::clone(&backends.metadata), artifacts.clone())) as Arc<dyn Stage>,
			Arc::new(Transcribe::new(backends.transcription, Arc::clone(&backends.metadata), artifacts.clone())) as Arc<dyn Stage>,
			Arc::new(Summarize::new(Arc::clone(&backends.llm), artifacts.clone(), config.max_chunk_size, config.stream_pace())) as Arc<dyn Stage>,
		]);

		let chat = ChatService::new(ChatRegistry::new(settings.clone()), Arc::clone(&backends.llm), artifacts.clone(), config.stream_pace());

		Self {
			jobs: JobRegistry::new(settings),
			pipeline: Arc::new(pipeline),
			chat,
			llm: backends.llm,
			metadata: backends.metadata,
			artifacts,
			config,
		}
	}

	/// Close every live job and chat, releasing their subscribers
	pub async fn shutdown(&self) {
		for key in self.jobs.keys() {
			self.jobs.close(&key).await;
		}
		for key in self.chat.chats().keys() {
			self.chat.chats().close(&key).await;
		}
	}
}

/// All routes with the state attached
pub fn app(state: AppState) -> Router {
	Router::new()
		.merge(summaries())
		.merge(videos())
		.merge(chat())
		.merge(get_config())
		.merge(get_health())
		.with_state(state)
}
