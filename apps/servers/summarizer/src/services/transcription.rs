use anyhow::{bail, Context, Result};
use job_broadcast::Segment;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

#[cfg(feature = "whisper")]
pub mod whisper;

/// Speech to text. `transcribe` blocks until the whole file is processed and
/// reports segments in order as they become available.
pub trait TranscriptionEngine: Send + Sync {
	fn name(&self) -> &'static str;

	fn transcribe(&self, audio: &Path, on_segment: &mut dyn FnMut(Segment)) -> Result<()>;
}

/// OpenAI-compatible `/audio/transcriptions` server
#[derive(Debug, Clone)]
pub struct RemoteWhisper {
	client: reqwest::Client,
	base_url: String,
	model: String,
	api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
	#[serde(default)]
	text: String,
	#[serde(default)]
	segments: Option<Vec<RemoteSegment>>,
}

#[derive(Debug, Deserialize)]
struct RemoteSegment {
	start: f64,
	end: f64,
	text: String,
}

impl RemoteWhisper {
	pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.trim().trim_end_matches('/').to_string(),
			model: model.trim().to_string(),
			api_key: api_key.filter(|k| !k.trim().is_empty()),
		}
	}

	async fn request(&self, audio: &Path) -> Result<VerboseTranscription> {
		let url = format!("{}/audio/transcriptions", self.base_url);
		debug!("Sending remote transcription request to: {}", url);

		let bytes = tokio::fs::read(audio).await.with_context(|| format!("reading {}", audio.display()))?;
		let file_name = audio.file_name().map_or_else(|| "audio.wav".to_string(), |n| n.to_string_lossy().into_owned());
		let file_part = Part::bytes(bytes).file_name(file_name).mime_str("audio/wav")?;

		let form = Form::new()
			.part("file", file_part)
			.text("model", self.model.clone())
			.text("response_format", "verbose_json")
			.text("timestamp_granularities[]", "segment");

		let mut request = self.client.post(&url).multipart(form);
		if let Some(key) = &self.api_key {
			request = request.bearer_auth(key);
		}

		let response = request.send().await.context("remote transcription request failed")?;
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_else(|_| "Failed to read error response".to_string());
			bail!("remote transcription failed with status {status}: {body}");
		}

		response.json().await.context("parsing remote transcription response")
	}
}

impl TranscriptionEngine for RemoteWhisper {
	fn name(&self) -> &'static str {
		"remote-whisper"
	}

	fn transcribe(&self, audio: &Path, on_segment: &mut dyn FnMut(Segment)) -> Result<()> {
		// Runs on a blocking worker thread, so parking on the runtime is allowed here
		let handle = tokio::runtime::Handle::current();
		let response = handle.block_on(self.request(audio))?;

		let segments = into_segments(response);
		info!(segments = segments.len(), "📋 Remote transcription returned");
		segments.into_iter().for_each(|segment| on_segment(segment));
		Ok(())
	}
}

fn into_segments(response: VerboseTranscription) -> Vec<Segment> {
	match response.segments {
		Some(segments) => segments
			.into_iter()
			.map(|s| Segment {
				start: s.start,
				end: s.end,
				text: s.text.trim().to_string(),
			})
			.filter(|s| !s.text.is_empty())
			.collect(),
		None if !response.text.trim().is_empty() => vec![Segment {
			start: 0.0,
			end: 0.0,
			text: response.text.trim().to_string(),
		}],
		None => Vec::new(),
	}
}
