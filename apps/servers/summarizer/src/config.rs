use clap::{Parser, ValueEnum};
use job_broadcast::JobSettings;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Parser, Clone, Debug)]
#[command(name = "summarizer")]
#[command(about = "Download, transcribe and summarize videos with live progress streams", long_about = None)]
pub struct Config {
	/// Server host
	#[arg(long, env = "HOST", default_value = "0.0.0.0")]
	pub host: String,

	/// Server port
	#[arg(long, env = "PORT", default_value = "8000")]
	pub port: u16,

	/// Use JSON formatting for tracing
	#[arg(long, env = "LOG_JSON", default_value = "false")]
	pub log_json: bool,

	/// Log filter
	#[arg(long, env = "RUST_LOG", default_value = "info")]
	pub rust_log: String,

	/// Root directory for downloads, transcriptions, summaries and chats
	#[arg(long, env = "CONTENT_DIR", default_value = "./content")]
	pub content_dir: PathBuf,

	/// Metadata database
	#[arg(long, env = "DATABASE_URL", default_value = "sqlite://content/db.sqlite")]
	pub database_url: String,

	/// Pause after each job broadcast, in milliseconds
	#[arg(long, env = "BROADCAST_PACE_MS", default_value = "10")]
	pub broadcast_pace_ms: u64,

	/// Pause after each streamed summary chunk or chat token, in milliseconds
	#[arg(long, env = "STREAM_PACE_MS", default_value = "1")]
	pub stream_pace_ms: u64,

	/// Maximum live subscribers per job
	#[arg(long, env = "MAX_SUBSCRIBERS_PER_JOB", default_value = "64")]
	pub max_subscribers: usize,

	/// Command channel capacity of each job actor
	#[arg(long, env = "JOB_COMMAND_BUFFER", default_value = "256")]
	pub command_buffer: usize,

	/// yt-dlp executable
	#[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
	pub ytdlp_path: String,

	/// OpenAI-compatible transcription server
	#[arg(long, env = "WHISPER_BASE_URL", default_value = "http://localhost:8080/v1")]
	pub whisper_url: String,

	/// Transcription model name
	#[arg(long, env = "WHISPER_MODEL", default_value = "small.en")]
	pub whisper_model: String,

	#[arg(long, env = "WHISPER_API_KEY")]
	pub whisper_api_key: Option<String>,

	/// Local ggml model; when set, transcription runs in process
	#[cfg(feature = "whisper")]
	#[arg(long, env = "WHISPER_MODEL_PATH")]
	pub whisper_model_path: Option<PathBuf>,

	/// Number of threads for in-process Whisper
	#[cfg(feature = "whisper")]
	#[arg(long, env = "WHISPER_THREADS", default_value = "2")]
	pub whisper_threads: i32,

	/// Text generation backend
	#[arg(long, env = "LLM_PROVIDER", value_enum, default_value = "openrouter", ignore_case = true)]
	pub llm_provider: LlmProvider,

	/// Maximum characters of transcript per summarization request
	#[arg(long, env = "MAX_CHUNK_SIZE", default_value = "32000")]
	pub max_chunk_size: usize,

	#[arg(long, env = "OLLAMA_MODEL", default_value = "")]
	pub ollama_model: String,

	#[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
	pub ollama_base_url: String,

	#[arg(long, env = "OPENROUTER_MODEL", default_value = "qwen/qwen-3-7b-instruct")]
	pub openrouter_model: String,

	#[arg(long, env = "OPENROUTER_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
	pub openrouter_base_url: String,

	#[arg(long, env = "OPENROUTER_API_KEY", default_value = "")]
	pub openrouter_api_key: String,

	#[arg(long, env = "OPENROUTER_APP_NAME", default_value = "YouTube Summarizer")]
	pub openrouter_app_name: String,

	#[arg(long, env = "OPENROUTER_SITE_URL", default_value = "https://localhost:3000")]
	pub openrouter_site_url: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
	Ollama,
	Openrouter,
}

impl Config {
	/// Validate configuration values
	pub fn validate(&self) -> Result<(), String> {
		if self.max_chunk_size <= 10 {
			return Err("max_chunk_size must be greater than the chunk overlap (10)".to_string());
		}

		if self.max_subscribers == 0 {
			return Err("max_subscribers must be at least 1".to_string());
		}

		if self.command_buffer == 0 {
			return Err("command_buffer must be at least 1".to_string());
		}

		match self.llm_provider {
			LlmProvider::Openrouter if self.openrouter_api_key.trim().is_empty() => {
				return Err("OPENROUTER_API_KEY is required when using the openrouter provider".to_string());
			}
			LlmProvider::Ollama if self.ollama_model.trim().is_empty() => {
				return Err("OLLAMA_MODEL is required when using the ollama provider".to_string());
			}
			_ => {}
		}

		#[cfg(feature = "whisper")]
		if self.whisper_threads < 1 {
			return Err("whisper_threads must be at least 1".to_string());
		}

		Ok(())
	}

	pub fn job_settings(&self) -> JobSettings {
		JobSettings {
			pace: Duration::from_millis(self.broadcast_pace_ms),
			max_subscribers: self.max_subscribers,
			command_buffer: self.command_buffer,
		}
	}

	pub const fn stream_pace(&self) -> Duration {
		Duration::from_millis(self.stream_pace_ms)
	}

	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}

	/// Configuration as served to clients, secrets masked
	pub fn masked(&self) -> MaskedConfig {
		MaskedConfig {
			llm_provider: self.llm_provider,
			max_chunk_size: self.max_chunk_size,
			whisper_model: self.whisper_model.clone(),
			whisper_base_url: self.whisper_url.clone(),
			ollama_model: self.ollama_model.clone(),
			ollama_base_url: self.ollama_base_url.clone(),
			openrouter_model: self.openrouter_model.clone(),
			openrouter_base_url: self.openrouter_base_url.clone(),
			openrouter_app_name: self.openrouter_app_name.clone(),
			openrouter_site_url: self.openrouter_site_url.clone(),
			openrouter_api_key: mask_secret(&self.openrouter_api_key),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MaskedConfig {
	pub llm_provider: LlmProvider,
	pub max_chunk_size: usize,
	pub whisper_model: String,
	pub whisper_base_url: String,
	pub ollama_model: String,
	pub ollama_base_url: String,
	pub openrouter_model: String,
	pub openrouter_base_url: String,
	pub openrouter_app_name: String,
	pub openrouter_site_url: String,
	pub openrouter_api_key: String,
}

/// Keep the first and last three characters of long secrets
pub fn mask_secret(value: &str) -> String {
	if value.is_empty() {
		return String::new();
	}

	let chars: Vec<char> = value.chars().collect();
	if chars.len() > 6 {
		let head: String = chars[..3].iter().collect();
		let tail: String = chars[chars.len() - 3..].iter().collect();
		format!("{head}...{tail}")
	} else {
		"***".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(args: &[&str]) -> Config {
		let mut argv = vec!["summarizer"];
		argv.extend_from_slice(args);
		Config::parse_from(argv)
	}

	#[test]
	fn masks_long_and_short_secrets() {
		assert_eq!(mask_secret("sk-or-v1-abcdef123"), "sk-...123");
		assert_eq!(mask_secret("abc123"), "***");
		assert_eq!(mask_secret(""), "");
	}

	#[test]
	fn masked_config_hides_api_key() {
		let cfg = config(&["--openrouter-api-key", "sk-or-secret-key"]);
		let value = serde_json::to_value(cfg.masked()).unwrap();
		assert_eq!(value["OPENROUTER_API_KEY"], "sk-...key");
		assert_eq!(value["LLM_PROVIDER"], "openrouter");
		assert_eq!(value["MAX_CHUNK_SIZE"], 32000);
	}

	#[test]
	fn validate_requires_provider_credentials() {
		assert!(config(&["--openrouter-api-key", "key"]).validate().is_ok());
		assert!(config(&["--llm-provider", "ollama"]).validate().is_err());
		assert!(config(&["--llm-provider", "ollama", "--ollama-model", "llama3"]).validate().is_ok());
	}

	#[test]
	fn job_settings_follow_config() {
		let cfg = config(&["--broadcast-pace-ms", "0", "--max-subscribers", "3"]);
		let settings = cfg.job_settings();
		assert!(settings.pace.is_zero());
		assert_eq!(settings.max_subscribers, 3);
	}
}
