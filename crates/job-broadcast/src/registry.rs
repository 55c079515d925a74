use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::chat::ChatHandle;
use crate::error::RegistryError;
use crate::job::{JobHandle, JobSettings};
use crate::types::JobKey;

/// Anything a [`Registry`] can own: a handle to an actor that broadcasts
/// until it is closed.
#[async_trait]
pub trait Broadcaster: Clone + Send + Sync + 'static {
	fn spawn(key: JobKey, settings: &JobSettings) -> Self;

	fn is_closed(&self) -> bool;

	async fn close(&self);
}

#[async_trait]
impl Broadcaster for JobHandle {
	fn spawn(key: JobKey, settings: &JobSettings) -> Self {
		Self::spawn(key, settings)
	}

	fn is_closed(&self) -> bool {
		self.is_closed()
	}

	async fn close(&self) {
		self.close().await;
	}
}

#[async_trait]
impl Broadcaster for ChatHandle {
	fn spawn(key: JobKey, settings: &JobSettings) -> Self {
		Self::spawn(key, settings)
	}

	fn is_closed(&self) -> bool {
		self.is_closed()
	}

	async fn close(&self) {
		self.close().await;
	}
}

/// Process-wide map from key to live job, owned by the serving layer
#[derive(Debug)]
pub struct Registry<B> {
	entries: Arc<DashMap<JobKey, B>>,
	settings: Arc<JobSettings>,
}

impl<B> Clone for Registry<B> {
	fn clone(&self) -> Self {
		Self {
			entries: Arc::clone(&self.entries),
			settings: Arc::clone(&self.settings),
		}
	}
}

impl<B: Broadcaster> Default for Registry<B> {
	fn default() -> Self {
		Self::new(JobSettings::default())
	}
}

impl<B: Broadcaster> Registry<B> {
	#[must_use]
	pub fn new(settings: JobSettings) -> Self {
		Self {
			entries: Arc::new(DashMap::new()),
			settings: Arc::new(settings),
		}
	}

	pub fn settings(&self) -> &JobSettings {
		&self.settings
	}

	/// Start a new job under `key`.
	///
	/// A key whose job is still live is rejected; a key whose job has already
	/// closed is replaced.
	pub fn create(&self, key: JobKey) -> Result<B, RegistryError> {
		match self.entries.entry(key.clone()) {
			Entry::Occupied(mut entry) => {
				if !entry.get().is_closed() {
					return Err(RegistryError::AlreadyRunning(key));
				}
				let handle = B::spawn(key.clone(), &self.settings);
				entry.insert(handle.clone());
				info!(job = %key, "Job created (replaced closed entry)");
				Ok(handle)
			}
			Entry::Vacant(entry) => {
				let handle = B::spawn(key.clone(), &self.settings);
				entry.insert(handle.clone());
				info!(job = %key, "Job created");
				Ok(handle)
			}
		}
	}

	/// Live job under `key`, spawning one when absent or closed
	pub fn get_or_create(&self, key: JobKey) -> B {
		self.prune();
		match self.entries.entry(key.clone()) {
			Entry::Occupied(entry) if !entry.get().is_closed() => entry.get().clone(),
			Entry::Occupied(mut entry) => {
				let handle = B::spawn(key, &self.settings);
				entry.insert(handle.clone());
				handle
			}
			Entry::Vacant(entry) => {
				debug!(job = %key, "Spawning on first use");
				let handle = B::spawn(key, &self.settings);
				entry.insert(handle.clone());
				handle
			}
		}
	}

	pub fn get(&self, key: &JobKey) -> Option<B> {
		self.entries.get(key).map(|entry| entry.value().clone()).filter(|handle| !handle.is_closed())
	}

	/// Close the job under `key` and forget it. Absent keys are a no-op.
	pub async fn close(&self, key: &JobKey) {
		let Some(handle) = self.entries.get(key).map(|entry| entry.value().clone()) else {
			return;
		};

		handle.close().await;
		// A fresh job may have replaced the entry while we were closing
		self.entries.remove_if(key, |_, current| current.is_closed());
	}

	/// Forget entries whose actor has already stopped on its own
	pub fn prune(&self) -> usize {
		let before = self.entries.len();
		self.entries.retain(|_, handle| !handle.is_closed());
		let pruned = before.saturating_sub(self.entries.len());
		if pruned > 0 {
			debug!(pruned, "Pruned closed entries");
		}
		pruned
	}

	/// Number of live entries
	pub fn len(&self) -> usize {
		self.entries.iter().filter(|entry| !entry.value().is_closed()).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn keys(&self) -> Vec<JobKey> {
		self.entries.iter().map(|entry| entry.key().clone()).collect()
	}
}
