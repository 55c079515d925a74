use job_broadcast::Segment;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::OnceLock;
use std::time::Duration;

pub const CHUNK_OVERLAP: usize = 10;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

pub const SUMMARY_SYSTEM_PROMPT: &str = r"
You are a YouTube video summarizer that creates comprehensive, well-structured markdown summaries from timestamped transcripts.

## Input Format
You will receive timestamped sentences in the format:
[MM:SS] Transcript text here

## Output Requirements

### Content Guidelines
- Include ALL key details, facts, concepts, and important information
- Remove filler words, repetitive statements, verbal stumbles, and unnecessary conversational padding
- Filter out sponsorships, advertisements, promotional content, and sponsor messages completely
- Maintain the logical flow and structure of the original content
- Preserve technical terms, specific numbers, dates, names, and citations exactly as mentioned

### Formatting Requirements
- Use clean, readable markdown with appropriate headers (##, ###, ####)
- Structure content with bullet points, numbered lists, and subheadings as needed
- Include a brief summary at the top (2-3 sentences maximum)
- Organize content thematically rather than chronologically when it improves clarity

### Timestamp Citations
- Every claim, fact, statistic, or important piece of information MUST include a timestamp citation
- Format timestamps as: `([MM:SS])`
- Place timestamps immediately after the relevant information
- For information spanning multiple timestamps, use the first occurrence

### Content to Exclude
- Sponsor segments and advertisements
- Product placements and promotional material
- Channel self-promotion (like/subscribe reminders)
- Irrelevant tangents and off-topic discussions
- Repetitive explanations of the same concept

Remember: Your goal is to create a comprehensive reference document in markdown that captures all valuable information while being concise and well-organized. Every important claim should be verifiable through its timestamp.
";

pub fn summary_request(chunk: &str) -> String {
	format!("Summarize the following video transcript: \n\n{chunk}")
}

pub fn chat_context_prompt(transcript: &str) -> String {
	format!(
		"You are a helpful assistant that answers questions about YouTube videos based on their transcripts. \n\n\
		Video Transcript:\n{transcript}\n\n\
		Please answer the user's question based on the information in the transcript. \
		If the transcript doesn't contain relevant information, say so politely.\n\n\
		Chat History:\n"
	)
}

/// One `[MM:SS] text` line per segment
pub fn format_timestamped(segments: &[Segment]) -> String {
	segments
		.iter()
		.map(|segment| {
			let total = Duration::try_from_secs_f64(segment.start).map_or(0, |offset| offset.as_secs());
			format!("[{:02}:{:02}] {}", total / 60, total % 60, segment.text)
		})
		.collect::<Vec<_>>()
		.join("\n")
}

/// Remove `<think>...</think>` sections emitted by reasoning models
pub fn strip_think(text: &str) -> String {
	static THINK: OnceLock<Option<Regex>> = OnceLock::new();

	match THINK.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").ok()) {
		Some(re) => re.replace_all(text, "").trim().to_string(),
		None => text.trim().to_string(),
	}
}

/// Split `text` into chunks of at most `chunk_size` characters, preferring
/// paragraph breaks, then line breaks, then spaces, then any character.
/// Neighbouring chunks share up to `overlap` characters.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
	split_recursive(text, &SEPARATORS, chunk_size.max(1), overlap)
}

fn char_len(s: &str) -> usize {
	s.chars().count()
}

fn split_recursive(text: &str, separators: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
	let position = separators.iter().position(|sep| sep.is_empty() || text.contains(sep)).unwrap_or(separators.len() - 1);
	let separator = separators[position];
	let remaining = &separators[position + 1..];

	let splits: Vec<&str> = if separator.is_empty() {
		text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect()
	} else {
		text.split(separator).filter(|s| !s.is_empty()).collect()
	};

	let mut chunks = Vec::new();
	let mut fitting = Vec::new();
	for split in splits {
		if char_len(split) < chunk_size {
			fitting.push(split);
			continue;
		}

		if !fitting.is_empty() {
			chunks.extend(merge_splits(&fitting, separator, chunk_size, overlap));
			fitting.clear();
		}

		if remaining.is_empty() {
			chunks.push(split.to_string());
		} else {
			chunks.extend(split_recursive(split, remaining, chunk_size, overlap));
		}
	}

	if !fitting.is_empty() {
		chunks.extend(merge_splits(&fitting, separator, chunk_size, overlap));
	}

	chunks
}

fn merge_splits(splits: &[&str], separator: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
	let sep_len = char_len(separator);
	let mut docs = Vec::new();
	let mut current: VecDeque<&str> = VecDeque::new();
	let mut total = 0;

	for split in splits {
		let len = char_len(split);
		let joiner = if current.is_empty() { 0 } else { sep_len };

		if total + len + joiner > chunk_size && !current.is_empty() {
			push_joined(&mut docs, &current, separator);

			while total > overlap || (total > 0 && total + len + if current.is_empty() { 0 } else { sep_len } > chunk_size) {
				let Some(front) = current.pop_front() else {
					break;
				};
				total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
			}
		}

		let joiner = if current.is_empty() { 0 } else { sep_len };
		current.push_back(split);
		total += len + joiner;
	}

	push_joined(&mut docs, &current, separator);
	docs
}

fn push_joined(docs: &mut Vec<String>, parts: &VecDeque<&str>, separator: &str) {
	let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
	let trimmed = joined.trim();
	if !trimmed.is_empty() {
		docs.push(trimmed.to_string());
	}
}
