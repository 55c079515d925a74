//! Drives the stages of one job in order and always releases the job.

use async_trait::async_trait;
use futures::FutureExt;
use job_broadcast::{DataKind, JobHandle, JobKey, JobRegistry, JobStatus, RegistryError, StageError, StatePatch};
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// One step of the pipeline, run to completion against its job
#[async_trait]
pub trait Stage: Send + Sync {
	fn name(&self) -> &'static str;

	async fn run(&self, job: &JobHandle) -> Result<(), StageError>;
}

pub struct Pipeline {
	stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
	pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
		Self { stages }
	}

	pub fn stage_names(&self) -> Vec<&'static str> {
		self.stages.iter().map(|stage| stage.name()).collect()
	}

	/// Register a job for `key` and run the pipeline for it in the background.
	///
	/// Returns as soon as the job exists; a key that is already in flight is rejected.
	pub fn trigger(self: &Arc<Self>, registry: &JobRegistry, key: JobKey) -> Result<JobHandle, RegistryError> {
		let job = registry.create(key)?;

		let pipeline = Arc::clone(self);
		let registry = registry.clone();
		let handle = job.clone();
		tokio::spawn(async move {
			pipeline.run(&registry, &handle).await;
		});

		Ok(job)
	}

	/// Run every stage, record the outcome on the job, then close it.
	/// Returns the terminal status.
	pub async fn run(&self, registry: &JobRegistry, job: &JobHandle) -> JobStatus {
		let key = job.key().clone();
		let started = Instant::now();

		let status = match self.run_stages(job).await {
			Ok(()) => {
				if let Err(e) = job.update_status(JobStatus::Success, "Video has been summarized successfully").await {
					warn!(job = %key, error = %e, "Could not record success");
				}
				info!(job = %key, elapsed_ms = started.elapsed().as_millis(), "✅ Pipeline finished");
				JobStatus::Success
			}
			Err(e) => {
				error!(job = %key, error = %e, elapsed_ms = started.elapsed().as_millis(), "❌ Pipeline failed");
				let recorded = job
					.broadcast_data(DataKind::Error, json!({ "error": e.to_string() }), StatePatch::new().status(JobStatus::Error), job.pace())
					.await;
				if let Err(e) = recorded {
					warn!(job = %key, error = %e, "Could not record failure");
				}
				JobStatus::Error
			}
		};

		registry.close(&key).await;
		status
	}

	async fn run_stages(&self, job: &JobHandle) -> Result<(), StageError> {
		for stage in &self.stages {
			let name = stage.name();
			let started = Instant::now();
			info!(job = %job.key(), stage = name, "▶️ Stage started");

			match AssertUnwindSafe(stage.run(job)).catch_unwind().await {
				Ok(Ok(())) => info!(job = %job.key(), stage = name, elapsed_ms = started.elapsed().as_millis(), "Stage finished"),
				Ok(Err(e)) => {
					warn!(job = %job.key(), stage = name, error = %e, "Stage failed");
					return Err(e);
				}
				Err(_) => {
					error!(job = %job.key(), stage = name, "💥 Stage panicked");
					return Err(StageError::Panicked { stage: name });
				}
			}
		}
		Ok(())
	}
}
