use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::ready;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{Config, LlmProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	System,
	User,
	Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: Role,
	pub content: String,
}

impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self {
			role: Role::System,
			content: content.into(),
		}
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self {
			role: Role::User,
			content: content.into(),
		}
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self {
			role: Role::Assistant,
			content: content.into(),
		}
	}
}

pub type TokenStream = BoxStream<'static, Result<String>>;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A streaming text-generation backend: send a message list, get tokens back
#[async_trait]
pub trait ChatBackend: Send + Sync {
	fn name(&self) -> &'static str;

	async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream>;

	/// Confirm the backend answers and serves the configured model
	async fn check(&self) -> Result<String>;
}

/// Build the backend selected by the configuration
pub fn from_config(config: &Config) -> Result<Arc<dyn ChatBackend>> {
	for_provider(config, config.llm_provider)
}

/// Build the backend for `provider` from its configured settings
pub fn for_provider(config: &Config, provider: LlmProvider) -> Result<Arc<dyn ChatBackend>> {
	let backend: Arc<dyn ChatBackend> = match provider {
		LlmProvider::Ollama => Arc::new(Ollama::new(&config.ollama_base_url, &config.ollama_model)),
		LlmProvider::Openrouter => Arc::new(OpenRouter::new(
			&config.openrouter_base_url,
			&config.openrouter_model,
			&config.openrouter_api_key,
			&config.openrouter_app_name,
			&config.openrouter_site_url,
		)?),
	};
	Ok(backend)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
	model: &'a str,
	messages: &'a [ChatMessage],
	stream: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	max_tokens: Option<u32>,
}

pub struct Ollama {
	client: reqwest::Client,
	base_url: String,
	model: String,
}

impl Ollama {
	pub fn new(base_url: &str, model: &str) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.trim_end_matches('/').to_string(),
			model: model.to_string(),
		}
	}
}

#[async_trait]
impl ChatBackend for Ollama {
	fn name(&self) -> &'static str {
		"ollama"
	}

	async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
		let url = format!("{}/api/chat", self.base_url);
		debug!("Sending chat request to: {}", url);

		let response = self
			.client
			.post(&url)
			.json(&ChatRequest {
				model: &self.model,
				messages: &messages,
				stream: true,
				max_tokens: None,
			})
			.send()
			.await
			.context("ollama request failed")?;
		let response = ensure_success(response).await?;

		Ok(lines(Box::pin(response.bytes_stream())).try_filter_map(|line| ready(parse_ollama_line(&line))).boxed())
	}

	async fn check(&self) -> Result<String> {
		let url = format!("{}/api/tags", self.base_url);
		debug!("Listing ollama models at: {}", url);

		let response = self.client.get(&url).timeout(CHECK_TIMEOUT).send().await.context("ollama is not reachable")?;
		let tags: Value = ensure_success(response).await?.json().await.context("parsing ollama model list")?;

		let available = model_names(&tags);
		if !available.iter().any(|name| *name == self.model) {
			bail!("Model '{}' not found. Available models: {}", self.model, available.join(", "));
		}
		Ok(format!("Connected to Ollama. Model '{}' is available.", self.model))
	}
}

/// Names listed by Ollama's `/api/tags`
fn model_names(tags: &Value) -> Vec<&str> {
	tags.get("models")
		.and_then(Value::as_array)
		.map(|models| models.iter().filter_map(|model| model.get("name").and_then(Value::as_str)).collect())
		.unwrap_or_default()
}

pub struct OpenRouter {
	client: reqwest::Client,
	base_url: String,
	model: String,
}

impl OpenRouter {
	pub fn new(base_url: &str, model: &str, api_key: &str, app_name: &str, site_url: &str) -> Result<Self> {
		if api_key.trim().is_empty() {
			bail!("OPENROUTER_API_KEY is required when using openrouter provider");
		}

		let mut headers = HeaderMap::new();
		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", api_key.trim())).context("invalid authorization header value")?);
		headers.insert("HTTP-Referer", HeaderValue::from_str(site_url).context("invalid site url header value")?);
		headers.insert("X-Title", HeaderValue::from_str(app_name).context("invalid app name header value")?);

		let client = reqwest::Client::builder().default_headers(headers).build().context("Failed to build HTTP client")?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
			model: model.to_string(),
		})
	}
}

#[async_trait]
impl ChatBackend for OpenRouter {
	fn name(&self) -> &'static str {
		"openrouter"
	}

	async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
		let url = format!("{}/chat/completions", self.base_url);
		debug!("Sending chat completion request to: {}", url);

		let response = self
			.client
			.post(&url)
			.json(&ChatRequest {
				model: &self.model,
				messages: &messages,
				stream: true,
				max_tokens: None,
			})
			.send()
			.await
			.context("openrouter request failed")?;
		let response = ensure_success(response).await?;

		Ok(lines(Box::pin(response.bytes_stream()))
			.and_then(|line| ready(parse_sse_line(&line)))
			.try_take_while(|line| ready(Ok(*line != SseLine::Done)))
			.try_filter_map(|line| {
				ready(Ok(match line {
					SseLine::Token(token) => Some(token),
					SseLine::Done | SseLine::Skip => None,
				}))
			})
			.boxed())
	}

	async fn check(&self) -> Result<String> {
		let url = format!("{}/chat/completions", self.base_url);
		debug!("Sending one token completion to: {}", url);

		let response = self
			.client
			.post(&url)
			.timeout(CHECK_TIMEOUT)
			.json(&ChatRequest {
				model: &self.model,
				messages: &[ChatMessage::user("test")],
				stream: false,
				max_tokens: Some(1),
			})
			.send()
			.await
			.context("openrouter is not reachable")?;
		let completion: Value = ensure_success(response).await?.json().await.context("parsing completion")?;

		if !has_choices(&completion) {
			bail!("OpenRouter responded but no completion received");
		}
		Ok(format!("Connected to OpenRouter. Model '{}' is available.", self.model))
	}
}

fn has_choices(completion: &Value) -> bool {
	completion.get("choices").and_then(Value::as_array).is_some_and(|choices| !choices.is_empty())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}
	let body = response.text().await.unwrap_or_else(|_| "Failed to read error response".to_string());
	bail!("backend returned status {status}: {body}")
}

/// Split a byte stream into trimmed text lines
fn lines<S, B, E>(bytes: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
	S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
	B: AsRef<[u8]> + Send,
	E: std::error::Error + Send + Sync + 'static,
{
	stream::unfold((bytes, Vec::<u8>::new(), false), |(mut bytes, mut buf, mut done)| async move {
		loop {
			if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
				let line: Vec<u8> = buf.drain(..=pos).collect();
				let text = String::from_utf8_lossy(&line).trim().to_string();
				return Some((Ok(text), (bytes, buf, done)));
			}

			if done {
				if buf.is_empty() {
					return None;
				}
				let text = String::from_utf8_lossy(&buf).trim().to_string();
				buf.clear();
				return Some((Ok(text), (bytes, buf, done)));
			}

			match bytes.next().await {
				Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
				Some(Err(e)) => return Some((Err(anyhow::Error::new(e).context("reading response stream")), (bytes, buf, true))),
				None => done = true,
			}
		}
	})
}

/// One newline-delimited JSON chunk from Ollama
fn parse_ollama_line(line: &str) -> Result<Option<String>> {
	if line.is_empty() {
		return Ok(None);
	}

	let chunk: Value = serde_json::from_str(line).context("parsing ollama chunk")?;
	if let Some(error) = chunk.get("error").and_then(Value::as_str) {
		bail!("ollama error: {error}");
	}

	Ok(chunk
		.pointer("/message/content")
		.and_then(Value::as_str)
		.filter(|content| !content.is_empty())
		.map(str::to_string))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SseLine {
	Token(String),
	Done,
	Skip,
}

/// One server-sent line of an OpenAI-compatible completion stream
fn parse_sse_line(line: &str) -> Result<SseLine> {
	let Some(data) = line.strip_prefix("data:") else {
		return Ok(SseLine::Skip);
	};

	let data = data.trim();
	if data == "[DONE]" {
		return Ok(SseLine::Done);
	}

	let chunk: Value = serde_json::from_str(data).context("parsing completion chunk")?;
	if let Some(error) = chunk.pointer("/error/message").and_then(Value::as_str) {
		bail!("completion error: {error}");
	}

	Ok(chunk
		.pointer("/choices/0/delta/content")
		.and_then(Value::as_str)
		.filter(|content| !content.is_empty())
		.map_or(SseLine::Skip, |content| SseLine::Token(content.to_string())))
}
