//! Collaborators the pipeline and chat flow talk to: stores, the media
//! source, transcription engines and text-generation backends.

pub mod artifacts;
pub mod llm;
pub mod media;
pub mod metadata;
pub mod prompt;
pub mod transcription;

pub use artifacts::ArtifactStore;
pub use llm::{ChatBackend, ChatMessage, Role, TokenStream};
pub use media::{DownloadEvent, MediaSource, YtDlp};
pub use metadata::{MetadataStore, SqliteMetadataStore, VideoRecord};
pub use transcription::TranscriptionEngine;
