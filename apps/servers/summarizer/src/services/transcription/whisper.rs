use anyhow::{anyhow, bail, Context, Result};
use job_broadcast::Segment;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::TranscriptionEngine;

/// In-process whisper.cpp through whisper-rs
pub struct LocalWhisper {
	ctx: WhisperContext,
	threads: i32,
}

impl LocalWhisper {
	/// Load Whisper model from disk
	pub fn load(model_path: &Path, threads: i32) -> Result<Self> {
		info!("🔄 Loading Whisper model from {}...", model_path.display());
		let start = Instant::now();

		let path = model_path.to_str().ok_or_else(|| anyhow!("model path is not valid UTF-8"))?;
		let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())?;

		info!(load_time_ms = start.elapsed().as_millis(), threads, "✅ Whisper model loaded");
		Ok(Self { ctx, threads })
	}

	fn params(&self) -> FullParams<'static, 'static> {
		let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
		params.set_translate(false);
		params.set_print_special(false);
		params.set_print_progress(false);
		params.set_print_realtime(false);
		params.set_print_timestamps(false);
		params.set_n_threads(self.threads);
		params
	}
}

/// 16 kHz mono samples scaled to [-1, 1]
fn read_wav(audio: &Path) -> Result<Vec<f32>> {
	let mut reader = hound::WavReader::open(audio).with_context(|| format!("opening {}", audio.display()))?;
	let spec = reader.spec();
	if spec.sample_rate != 16_000 || spec.channels != 1 {
		bail!("expected 16 kHz mono audio, got {} Hz with {} channels", spec.sample_rate, spec.channels);
	}

	match spec.sample_format {
		hound::SampleFormat::Int => reader.samples::<i16>().map(|s| Ok(f32::from(s?) / f32::from(i16::MAX))).collect(),
		hound::SampleFormat::Float => reader.samples::<f32>().map(|s| Ok(s?)).collect(),
	}
}

impl TranscriptionEngine for LocalWhisper {
	fn name(&self) -> &'static str {
		"whisper-rs"
	}

	fn transcribe(&self, audio: &Path, on_segment: &mut dyn FnMut(Segment)) -> Result<()> {
		let samples = read_wav(audio)?;
		let started = Instant::now();

		let mut state = self.ctx.create_state().map_err(|e| anyhow!("Failed to create Whisper state: {e}"))?;
		state.full(self.params(), &samples).map_err(|e| anyhow!("Transcription failed: {e}"))?;

		let count = state.full_n_segments();
		if count == 0 {
			warn!("⚠️ No segments extracted - audio may be silence");
		}

		for i in 0..count {
			let Some(segment) = state.get_segment(i) else {
				continue;
			};
			let Ok(text) = segment.to_str() else {
				continue;
			};
			let text = text.trim();
			if text.is_empty() {
				continue;
			}

			// Timestamps are in centiseconds
			#[allow(clippy::cast_precision_loss)]
			let (start, end) = (segment.start_timestamp() as f64 / 100.0, segment.end_timestamp() as f64 / 100.0);
			on_segment(Segment {
				start,
				end,
				text: text.to_string(),
			});
		}

		info!(segments = count, elapsed_ms = started.elapsed().as_millis(), "✅ Transcription completed");
		Ok(())
	}
}
