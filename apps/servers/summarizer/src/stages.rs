//! The three stages of a summarization run, in the order the pipeline drives them.

mod download;
mod summarize;
mod transcribe;

pub use download::AcquireAudio;
pub use summarize::Summarize;
pub use transcribe::Transcribe;
