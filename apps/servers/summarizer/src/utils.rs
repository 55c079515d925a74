use crate::error::ApiError;
use regex::Regex;
use std::sync::OnceLock;

const VIDEO_ID_LEN: usize = 11;

/// Accepts a path segment only when it is a bare video id, so it can name files and jobs
pub fn video_id(raw: String) -> Result<String, ApiError> {
	let valid = raw.len() == VIDEO_ID_LEN && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
	if valid {
		Ok(raw)
	} else {
		Err(ApiError::InvalidVideoId)
	}
}

/// Extracts the 11 character video id from a YouTube URL
pub fn extract_video_id(url: &str) -> Option<String> {
	static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

	let patterns = PATTERNS.get_or_init(|| {
		[
			r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([a-zA-Z0-9_-]{11})",
			r"youtube\.com/v/([a-zA-Z0-9_-]{11})",
			r"youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
		]
		.iter()
		.filter_map(|pattern| Regex::new(pattern).ok())
		.collect()
	});

	patterns.iter().find_map(|re| re.captures(url)).and_then(|caps| caps.get(1)).map(|m| m.as_str().to_string())
}
