#[cfg(test)]
mod tests {
	use anyhow::{anyhow, Result};
	use async_trait::async_trait;
	use axum::body::Body;
	use axum::http::{Request, StatusCode};
	use axum::Router;
	use clap::Parser;
	use futures::stream;
	use job_broadcast::{Segment, VideoMetadata};
	use serde_json::{json, Value};
	use sqlx::sqlite::SqlitePoolOptions;
	use std::path::Path;
	use std::sync::{mpsc, Arc, Mutex};
	use summarizer::services::{ChatBackend, ChatMessage, DownloadEvent, MediaSource, MetadataStore, SqliteMetadataStore, TokenStream, TranscriptionEngine};
	use summarizer::{app, AppState, Backends, Config};
	use tower::ServiceExt;

	const VIDEO_ID: &str = "dQw4w9WgXcQ";
	const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

	/// Blocks the download until the test opens the gate
	struct GatedMedia {
		gate: Mutex<Option<mpsc::Receiver<()>>>,
	}

	impl MediaSource for GatedMedia {
		fn metadata(&self, video_id: &str) -> Result<VideoMetadata> {
			Ok(VideoMetadata {
				video_id: video_id.to_string(),
				title: Some("Never Gonna Give You Up".into()),
				..VideoMetadata::default()
			})
		}

		fn download_audio(&self, _video_id: &str, dest: &Path, on_event: &mut dyn FnMut(DownloadEvent)) -> Result<()> {
			let gate = self.gate.lock().map_err(|_| anyhow!("gate poisoned"))?.take();
			if let Some(gate) = gate {
				let _ = gate.recv();
			}
			on_event(DownloadEvent::Percent(50.0));
			on_event(DownloadEvent::Finished);
			if let Some(parent) = dest.parent() {
				std::fs::create_dir_all(parent)?;
			}
			std::fs::write(dest, b"RIFF")?;
			Ok(())
		}
	}

	struct OneLine;

	impl TranscriptionEngine for OneLine {
		fn name(&self) -> &'static str {
			"one-line"
		}

		fn transcribe(&self, _audio: &Path, on_segment: &mut dyn FnMut(Segment)) -> Result<()> {
			on_segment(Segment {
				start: 0.0,
				end: 2.5,
				text: " Never gonna give you up ".into(),
			});
			Ok(())
		}
	}

	struct Echo;

	#[async_trait]
	impl ChatBackend for Echo {
		fn name(&self) -> &'static str {
			"echo"
		}

		async fn stream_chat(&self, _messages: Vec<ChatMessage>) -> Result<TokenStream> {
			let tokens: Vec<Result<String>> = vec![Ok("## Summary".to_string()), Ok(" done".to_string())];
			Ok(Box::pin(stream::iter(tokens)))
		}

		async fn check(&self) -> Result<String> {
			Ok("echo ready".to_string())
		}
	}

	struct Harness {
		router: Router,
		metadata: Arc<SqliteMetadataStore>,
		dir: tempfile::TempDir,
	}

	impl Harness {
		async fn new(gate: Option<mpsc::Receiver<()>>) -> Self {
			let dir = tempfile::tempdir().unwrap();
			let content = dir.path().to_string_lossy().into_owned();
			let config = Config::parse_from([
				"summarizer",
				"--content-dir",
				content.as_str(),
				"--openrouter-api-key",
				"sk-or-secret-value",
				"--broadcast-pace-ms",
				"0",
				"--stream-pace-ms",
				"0",
				"--ollama-base-url",
				"http://127.0.0.1:9",
				"--ollama-model",
				"llama3:8b",
			]);

			let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
			let metadata = Arc::new(SqliteMetadataStore::new(pool));
			metadata.migrate().await.unwrap();

			let backends = Backends {
				media: Arc::new(GatedMedia { gate: Mutex::new(gate) }),
				transcription: Arc::new(OneLine),
				llm: Arc::new(Echo),
				metadata: metadata.clone(),
			};

			Self {
				router: app(AppState::build(Arc::new(config), backends)),
				metadata,
				dir,
			}
		}

		async fn seed_video(&self) {
			let video = VideoMetadata {
				video_id: VIDEO_ID.to_string(),
				title: Some("Never Gonna Give You Up".into()),
				..VideoMetadata::default()
			};
			self.metadata.insert(&video).await.unwrap();
		}

		async fn active_chats(&self) -> u64 {
			let (_, health) = self.get("/health").await;
			health["active_chats"].as_u64().unwrap()
		}

		async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
			let response = self.router.clone().oneshot(request).await.unwrap();
			let status = response.status();
			let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
			(status, String::from_utf8(body.to_vec()).unwrap())
		}

		async fn get(&self, uri: &str) -> (StatusCode, Value) {
			let (status, body) = self.send(Request::get(uri).body(Body::empty()).unwrap()).await;
			(status, serde_json::from_str(&body).unwrap())
		}

		async fn post(&self, uri: &str, payload: Value) -> (StatusCode, Value) {
			let request = Request::post(uri).header("content-type", "application/json").body(Body::from(payload.to_string())).unwrap();
			let (status, body) = self.send(request).await;
			(status, serde_json::from_str(&body).unwrap())
		}
	}

	#[tokio::test]
	async fn test_health_reports_no_active_jobs() {
		let harness = Harness::new(None).await;
		let (status, body) = harness.get("/health").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "healthy");
		assert_eq!(body["active_jobs"], 0);
	}

	#[tokio::test]
	async fn test_invalid_url_creates_no_job() {
		let harness = Harness::new(None).await;

		let (status, body) = harness.post("/api/summarize", json!({ "url": "https://example.com/watch?v=nope" })).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "Invalid YouTube URL");

		let (status, _) = harness.post("/api/summarize", json!({})).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);

		let (_, health) = harness.get("/health").await;
		assert_eq!(health["active_jobs"], 0);
	}

	#[tokio::test]
	async fn test_subscribe_without_job_is_404() {
		let harness = Harness::new(None).await;
		let (status, body) = harness.get(&format!("/api/summarize/{VIDEO_ID}/subscribe")).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "No job for this video id");
	}

	#[tokio::test]
	async fn test_full_run_streams_to_subscriber_and_persists_artifacts() {
		let (open, gate) = mpsc::channel();
		let harness = Harness::new(Some(gate)).await;

		let (status, body) = harness.post("/api/summarize", json!({ "url": URL })).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body, json!({ "success": true, "video_id": VIDEO_ID, "message": "Processing started" }));

		// Still downloading: a second trigger conflicts and the job reports in progress
		let (status, _) = harness.post("/api/summarize", json!({ "url": URL })).await;
		assert_eq!(status, StatusCode::CONFLICT);
		let (_, progress) = harness.get(&format!("/api/summary/{VIDEO_ID}/status")).await;
		assert_eq!(progress["status"], "in_progress");

		let subscribe = harness.router.clone().oneshot(Request::get(format!("/api/summarize/{VIDEO_ID}/subscribe")).body(Body::empty()).unwrap());
		let response = subscribe.await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		open.send(()).unwrap();

		let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let body = String::from_utf8(body.to_vec()).unwrap();
		assert!(body.starts_with("data: {"), "{body}");
		assert!(body.contains(r#""type":"transcript_segment""#));
		assert!(body.contains(r#""type":"summary_chunk""#));
		assert!(body.contains(r#""status":"success""#));
		assert!(body.trim_end().ends_with(r#"event: close
data: {"message":"Stream closed by server"}"#));

		let (status, done) = harness.get(&format!("/api/summary/{VIDEO_ID}/status")).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(done["status"], "completed");
		assert_eq!(done["state"]["video"]["title"], "Never Gonna Give You Up");

		let (_, summary) = harness.get(&format!("/api/summary/{VIDEO_ID}")).await;
		assert_eq!(summary["content"], "## Summary done");

		let (_, transcript) = harness.get(&format!("/api/transcript/{VIDEO_ID}")).await;
		assert_eq!(transcript["transcript"][0]["text"], "Never gonna give you up");

		let (_, videos) = harness.get("/api/videos").await;
		assert_eq!(videos["videos"].as_array().unwrap().len(), 1);
		assert_eq!(videos["videos"][0]["status"], "done");
	}

	#[tokio::test]
	async fn test_delete_removes_video_and_artifacts() {
		let (open, gate) = mpsc::channel();
		drop(open);
		let harness = Harness::new(Some(gate)).await;

		harness.post("/api/summarize", json!({ "url": URL })).await;
		for _ in 0..200 {
			let (_, status) = harness.get(&format!("/api/summary/{VIDEO_ID}/status")).await;
			if status["status"] == "completed" {
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		}

		let (status, body) = harness.send(Request::delete(format!("/api/videos/{VIDEO_ID}")).body(Body::empty()).unwrap()).await;
		assert_eq!(status, StatusCode::OK, "{body}");

		let (status, _) = harness.get(&format!("/api/videos/{VIDEO_ID}")).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let (status, _) = harness.get(&format!("/api/summary/{VIDEO_ID}")).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let (status, _) = harness.get(&format!("/api/summary/{VIDEO_ID}/status")).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn test_chat_question_is_required() {
		let harness = Harness::new(None).await;
		harness.seed_video().await;
		let (status, body) = harness.post(&format!("/api/chat/{VIDEO_ID}/ask"), json!({ "question": "  " })).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "question is required");

		let (status, history) = harness.get(&format!("/api/chat/{VIDEO_ID}")).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(history, json!({ "messages": [] }));
	}

	#[tokio::test]
	async fn test_config_masks_api_key() {
		let harness = Harness::new(None).await;
		let (status, body) = harness.get("/api/config").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["success"], true);
		assert_eq!(body["config"]["OPENROUTER_API_KEY"], "sk-...lue");
		assert_eq!(body["config"]["LLM_PROVIDER"], "openrouter");
	}

	#[tokio::test]
	async fn test_traversal_video_id_is_rejected_before_touching_files() {
		let harness = Harness::new(None).await;
		harness.seed_video().await;
		let escaped = harness.dir.path().parent().unwrap().join("escaped_chat.json");

		let (status, body) = harness.post("/api/chat/..%2F..%2Fescaped/ask", json!({ "question": "hi" })).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "Invalid video id");
		assert!(!escaped.exists());

		for uri in [
			"/api/chat/..%2F..%2Fescaped",
			"/api/chat/..%2F..%2Fescaped/subscribe",
			"/api/summary/..%2F..%2Fsecret",
			"/api/summary/..%2Fsecret/status",
			"/api/transcript/..%2F..%2Fsecret",
			"/api/summarize/..%2Fsecret/subscribe",
			"/api/videos/not-an-id",
		] {
			let (status, _) = harness.get(uri).await;
			assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
		}

		let (status, _) = harness.send(Request::delete("/api/videos/..%2F..%2Fsecret").body(Body::empty()).unwrap()).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(harness.active_chats().await, 0);
	}

	#[tokio::test]
	async fn test_chat_needs_a_known_video_and_closes_when_abandoned() {
		let harness = Harness::new(None).await;

		let (status, _) = harness.get(&format!("/api/chat/{VIDEO_ID}/subscribe")).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let (status, _) = harness.post(&format!("/api/chat/{VIDEO_ID}/ask"), json!({ "question": "hi" })).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		for i in 0..20 {
			let (status, _) = harness.get(&format!("/api/chat/junk{i}/subscribe")).await;
			assert_eq!(status, StatusCode::BAD_REQUEST);
		}
		assert_eq!(harness.active_chats().await, 0);

		harness.seed_video().await;
		for _ in 0..10 {
			let request = Request::get(format!("/api/chat/{VIDEO_ID}/subscribe")).body(Body::empty()).unwrap();
			let response = harness.router.clone().oneshot(request).await.unwrap();
			assert_eq!(response.status(), StatusCode::OK);
			drop(response);
		}

		for _ in 0..200 {
			if harness.active_chats().await == 0 {
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		}
		assert_eq!(harness.active_chats().await, 0);
	}

	#[tokio::test]
	async fn test_connection_check_reports_provider_status() {
		let harness = Harness::new(None).await;

		let (status, body) = harness.post("/api/config/test", json!({})).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body, json!({ "success": true, "provider": "openrouter", "message": "echo ready" }));

		let (status, body) = harness.send(Request::post("/api/config/test").body(Body::empty()).unwrap()).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["success"], true);

		let (status, body) = harness.post("/api/config/test", json!({ "provider": "ollama" })).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["success"], false);
		assert_eq!(body["provider"], "ollama");
		assert!(body["error"].as_str().is_some_and(|e| e.contains("ollama is not reachable")), "{body}");
		assert!(body.get("message").is_none());
	}
}
