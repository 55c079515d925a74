//! Hand-off between blocking stage work and the async side.
//!
//! A worker runs on its own thread (or task) and reports through a
//! [`WorkerSender`]. The consumer awaits [`WorkerBridge::recv`] until the
//! worker's sender is gone, so every message sent before the worker exited is
//! delivered before termination is observed.

use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::error::StageError;
use crate::types::JobStatus;

#[derive(Debug)]
pub enum WorkerMessage<T> {
	Status { status: JobStatus, message: String },
	Update(T),
	Failed(String),
}

/// Producer half given to a worker
#[derive(Debug)]
pub struct WorkerSender<T> {
	tx: mpsc::UnboundedSender<WorkerMessage<T>>,
}

impl<T> Clone for WorkerSender<T> {
	fn clone(&self) -> Self {
		Self { tx: self.tx.clone() }
	}
}

impl<T> WorkerSender<T> {
	/// Returns false once nobody is listening anymore
	pub fn status(&self, status: JobStatus, message: impl Into<String>) -> bool {
		self
			.tx
			.send(WorkerMessage::Status {
				status,
				message: message.into(),
			})
			.is_ok()
	}

	pub fn update(&self, value: T) -> bool {
		self.tx.send(WorkerMessage::Update(value)).is_ok()
	}

	pub fn fail(&self, message: impl Into<String>) {
		let _ = self.tx.send(WorkerMessage::Failed(message.into()));
	}
}

/// What the consumer sees from a healthy worker
#[derive(Debug, PartialEq)]
pub enum StageUpdate<T> {
	Status { status: JobStatus, message: String },
	Update(T),
}

pub struct WorkerBridge<T> {
	stage: &'static str,
	rx: mpsc::UnboundedReceiver<WorkerMessage<T>>,
	worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerBridge<T> {
	/// Run `work` on the blocking pool. An `Err` it returns becomes a failure message.
	pub fn spawn_blocking<F>(stage: &'static str, work: F) -> Self
	where
		F: FnOnce(&WorkerSender<T>) -> anyhow::Result<()> + Send + 'static,
	{
		let (tx, rx) = mpsc::unbounded_channel();
		let sender = WorkerSender { tx };
		let worker = tokio::task::spawn_blocking(move || {
			if let Err(e) = work(&sender) {
				sender.fail(format!("{e:#}"));
			}
		});

		Self {
			stage,
			rx,
			worker: Some(worker),
		}
	}

	/// Run async `work` as its own task, for workers that only wait on I/O
	pub fn spawn<F, Fut>(stage: &'static str, work: F) -> Self
	where
		F: FnOnce(WorkerSender<T>) -> Fut,
		Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
	{
		let (tx, rx) = mpsc::unbounded_channel();
		let failures = WorkerSender { tx: tx.clone() };
		let work = work(WorkerSender { tx });
		let worker = tokio::spawn(async move {
			if let Err(e) = work.await {
				failures.fail(format!("{e:#}"));
			}
		});

		Self {
			stage,
			rx,
			worker: Some(worker),
		}
	}

	pub fn stage(&self) -> &'static str {
		self.stage
	}

	/// Next message from the worker.
	///
	/// `Ok(None)` means the worker finished cleanly and everything it sent has
	/// been delivered. A reported failure or a panic ends the stage with an error.
	pub async fn recv(&mut self) -> Result<Option<StageUpdate<T>>, StageError> {
		match self.rx.recv().await {
			Some(WorkerMessage::Status { status, message }) => Ok(Some(StageUpdate::Status { status, message })),
			Some(WorkerMessage::Update(value)) => Ok(Some(StageUpdate::Update(value))),
			Some(WorkerMessage::Failed(message)) => Err(StageError::failed(self.stage, message)),
			None => {
				self.join().await?;
				Ok(None)
			}
		}
	}

	async fn join(&mut self) -> Result<(), StageError> {
		let Some(worker) = self.worker.take() else {
			return Ok(());
		};

		match worker.await {
			Ok(()) => Ok(()),
			Err(e) if e.is_panic() => {
				error!(stage = self.stage, "💥 Worker panicked");
				Err(StageError::Panicked { stage: self.stage })
			}
			Err(e) => Err(StageError::failed(self.stage, e.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn status_and_updates_arrive_in_order() {
		let mut bridge = WorkerBridge::spawn_blocking("unit", |tx| {
			tx.status(JobStatus::Transcribing, "go");
			tx.update(1_u32);
			tx.update(2_u32);
			Ok(())
		});

		assert_eq!(
			bridge.recv().await.unwrap(),
			Some(StageUpdate::Status {
				status: JobStatus::Transcribing,
				message: "go".into()
			})
		);
		assert_eq!(bridge.recv().await.unwrap(), Some(StageUpdate::Update(1)));
		assert_eq!(bridge.recv().await.unwrap(), Some(StageUpdate::Update(2)));
		assert_eq!(bridge.recv().await.unwrap(), None);
		assert_eq!(bridge.recv().await.unwrap(), None);
	}

	#[tokio::test]
	async fn async_worker_error_is_reported_with_context() {
		let mut bridge: WorkerBridge<()> = WorkerBridge::spawn("summarize", |_tx| async move { Err::<(), _>(anyhow::anyhow!("connection refused").context("calling backend")) });

		let err = bridge.recv().await.unwrap_err();
		assert_eq!(err.to_string(), "summarize failed: calling backend: connection refused");
	}
}
