use anyhow::{bail, Context, Result};
use job_broadcast::VideoMetadata;
use regex::Regex;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use tracing::{debug, info};

const PROGRESS_PREFIX: &str = "PROGRESS ";

/// Progress of an audio transfer as the source reports it
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
	Fragment { index: u32, count: u32, percent: f64 },
	Percent(f64),
	Finished,
}

/// Where media comes from. Both calls block and belong on a worker thread.
pub trait MediaSource: Send + Sync {
	fn metadata(&self, video_id: &str) -> Result<VideoMetadata>;

	/// Fetch the audio track of `video_id` as 16 kHz mono WAV at `dest`
	fn download_audio(&self, video_id: &str, dest: &Path, on_event: &mut dyn FnMut(DownloadEvent)) -> Result<()>;
}

/// `yt-dlp` driven as a child process
#[derive(Debug, Clone)]
pub struct YtDlp {
	program: String,
}

impl YtDlp {
	pub fn new(program: impl Into<String>) -> Self {
		Self { program: program.into() }
	}

	fn watch_url(video_id: &str) -> String {
		format!("https://www.youtube.com/watch?v={video_id}")
	}
}

#[derive(Debug, Deserialize)]
struct InfoJson {
	id: String,
	title: Option<String>,
	duration: Option<f64>,
	uploader: Option<String>,
	upload_date: Option<String>,
	thumbnail: Option<String>,
	webpage_url: Option<String>,
}

impl From<InfoJson> for VideoMetadata {
	fn from(info: InfoJson) -> Self {
		Self {
			video_id: info.id,
			title: info.title,
			duration: info.duration,
			uploader: info.uploader,
			upload_date: info.upload_date,
			thumbnail_url: info.thumbnail,
			webpage_url: info.webpage_url,
		}
	}
}

impl MediaSource for YtDlp {
	fn metadata(&self, video_id: &str) -> Result<VideoMetadata> {
		let output = Command::new(&self.program)
			.args(["-J", "--skip-download", "--no-warnings"])
			.arg(Self::watch_url(video_id))
			.output()
			.with_context(|| format!("running {}", self.program))?;

		if !output.status.success() {
			bail!("metadata extraction failed: {}", String::from_utf8_lossy(&output.stderr).trim());
		}

		let info: InfoJson = serde_json::from_slice(&output.stdout).context("parsing yt-dlp metadata")?;
		Ok(info.into())
	}

	fn download_audio(&self, video_id: &str, dest: &Path, on_event: &mut dyn FnMut(DownloadEvent)) -> Result<()> {
		let template = dest.with_extension("%(ext)s");
		info!(video_id, dest = %dest.display(), "⬇️ Starting audio download");

		let mut child = Command::new(&self.program)
			.args(["-f", "bestaudio/best", "-x", "--audio-format", "wav"])
			.args(["--postprocessor-args", "ffmpeg:-ar 16000 -ac 1"])
			.args(["--newline", "--progress-template", "download:PROGRESS %(progress)j"])
			.arg("-o")
			.arg(&template)
			.arg(Self::watch_url(video_id))
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()
			.with_context(|| format!("running {}", self.program))?;

		let stderr = child.stderr.take().map(|mut pipe| {
			std::thread::spawn(move || {
				let mut buf = String::new();
				let _ = pipe.read_to_string(&mut buf);
				buf
			})
		});

		if let Some(stdout) = child.stdout.take() {
			for line in BufReader::new(stdout).lines() {
				let line = line.context("reading yt-dlp output")?;
				if let Some(event) = parse_progress_line(&line) {
					on_event(event);
				} else {
					debug!(video_id, "{line}");
				}
			}
		}

		let status = child.wait()?;
		let stderr = stderr.and_then(|handle| handle.join().ok()).unwrap_or_default();
		if !status.success() {
			bail!("download failed ({status}): {}", stderr.trim());
		}

		Ok(())
	}
}

#[derive(Debug, Deserialize)]
struct ProgressLine {
	status: String,
	fragment_index: Option<u32>,
	fragment_count: Option<u32>,
	fragment_percent: Option<f64>,
	downloaded_bytes: Option<f64>,
	total_bytes: Option<f64>,
	total_bytes_estimate: Option<f64>,
	#[serde(rename = "_percent_str")]
	percent_str: Option<String>,
}

impl ProgressLine {
	fn percent(&self) -> Option<f64> {
		if let Some(text) = &self.percent_str {
			if let Some(percent) = parse_percent(text) {
				return Some(percent);
			}
		}
		let total = self.total_bytes.or(self.total_bytes_estimate).filter(|t| *t > 0.0)?;
		Some(self.downloaded_bytes? / total * 100.0)
	}
}

/// Turn one line of `--progress-template` output into an event
pub fn parse_progress_line(line: &str) -> Option<DownloadEvent> {
	let payload = line.trim().strip_prefix(PROGRESS_PREFIX)?;
	let progress: ProgressLine = serde_json::from_str(payload).ok()?;

	match progress.status.as_str() {
		"finished" => Some(DownloadEvent::Finished),
		"downloading" => match (progress.fragment_index, progress.fragment_count) {
			(Some(index), Some(count)) => Some(DownloadEvent::Fragment {
				index,
				count,
				percent: progress.fragment_percent.or_else(|| progress.percent()).unwrap_or(0.0),
			}),
			_ => progress.percent().map(DownloadEvent::Percent),
		},
		_ => None,
	}
}

/// Percentage out of a human string such as `"\u{1b}[0;94m 42.5%\u{1b}[0m"`
fn parse_percent(text: &str) -> Option<f64> {
	static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
	static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();

	let ansi = ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").ok()).as_ref()?;
	let number = NUMBER.get_or_init(|| Regex::new(r"(\d+\.?\d*)%?").ok()).as_ref()?;

	let cleaned = ansi.replace_all(text, "");
	number.captures(cleaned.trim())?.get(1)?.as_str().parse().ok()
}
