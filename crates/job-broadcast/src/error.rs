use crate::types::JobKey;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
	#[error("job {0} is closed")]
	Closed(JobKey),

	#[error("job {key} already has {limit} subscribers")]
	SubscriberLimit { key: JobKey, limit: usize },

	#[error("a response is already streaming for {0}")]
	AlreadyResponding(JobKey),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
	#[error("a job is already running for {0}")]
	AlreadyRunning(JobKey),
}

/// Failure of one pipeline stage, surfaced to the driver
#[derive(Error, Debug)]
pub enum StageError {
	#[error("{stage} failed: {message}")]
	Failed { stage: &'static str, message: String },

	#[error("{stage} worker panicked")]
	Panicked { stage: &'static str },

	#[error(transparent)]
	Job(#[from] JobError),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl StageError {
	pub fn failed(stage: &'static str, message: impl Into<String>) -> Self {
		Self::Failed { stage, message: message.into() }
	}
}
