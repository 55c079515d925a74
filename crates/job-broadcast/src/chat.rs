//! Conversational variant of a job: one streaming answer at a time, with
//! control signals carried as tagged events instead of in-band strings.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::JobError;
use crate::event::{Control, Event};
use crate::job::JobSettings;
use crate::subscription::{pace, DetachGuard, Subscribers, Subscription};
use crate::types::{ChatTurn, JobKey, SubscriberId};

type Attached = (SubscriberId, ChatTurn, mpsc::UnboundedReceiver<Event>);

#[derive(Debug)]
pub enum ChatCommand {
	StartResponse { reply: oneshot::Sender<Result<u64, JobError>> },
	Token(String),
	Finish,
	Fail(String),
	Subscribe { reply: oneshot::Sender<Result<Attached, JobError>> },
	Unsubscribe { id: SubscriberId },
	Snapshot { reply: oneshot::Sender<ChatTurn> },
	Close { reply: oneshot::Sender<()> },
}

/// Owns one chat's turn state.
///
/// A chat that loses its last subscriber closes itself, immediately when idle
/// or as soon as the answer in flight settles.
pub struct ChatActor {
	key: JobKey,
	turn: ChatTurn,
	subscribers: Subscribers,
	commands: mpsc::Receiver<ChatCommand>,
	abandoned: bool,
}

impl ChatActor {
	#[must_use]
	pub fn new(key: JobKey, commands: mpsc::Receiver<ChatCommand>, max_subscribers: usize) -> Self {
		Self {
			subscribers: Subscribers::new(key.clone(), max_subscribers),
			key,
			turn: ChatTurn::default(),
			commands,
			abandoned: false,
		}
	}

	fn shutdown(&mut self, reason: &'static str) {
		self.commands.close();
		let released = self.subscribers.close_all(Event::Control(Control::Close));
		info!(chat = %self.key, released, reason, "Chat closed");
	}

	pub async fn run(mut self) {
		while let Some(cmd) = self.commands.recv().await {
			match cmd {
				ChatCommand::StartResponse { reply } => {
					let started = if self.turn.responding {
						Err(JobError::AlreadyResponding(self.key.clone()))
					} else {
						self.turn.text.clear();
						self.turn.turn += 1;
						self.turn.responding = true;
						debug!(chat = %self.key, turn = self.turn.turn, "Response started");
						Ok(self.turn.turn)
					};
					let _ = reply.send(started);
				}

				ChatCommand::Token(token) => {
					self.turn.text.push_str(&token);
					self.subscribers.fan_out(&Event::Token(token));
				}

				ChatCommand::Finish => {
					self.turn.responding = false;
					if self.subscribers.fan_out(&Event::Control(Control::Complete)) == 0 && self.abandoned {
						self.shutdown("abandoned");
						break;
					}
				}

				ChatCommand::Fail(message) => {
					self.turn.responding = false;
					if self.subscribers.fan_out(&Event::Control(Control::Error(message))) == 0 && self.abandoned {
						self.shutdown("abandoned");
						break;
					}
				}

				ChatCommand::Subscribe { reply } => {
					let attached = self.subscribers.add().map(|(id, rx)| (id, self.turn.clone(), rx));
					if attached.is_ok() {
						self.abandoned = false;
					}
					let _ = reply.send(attached);
				}

				ChatCommand::Unsubscribe { id } => {
					self.subscribers.remove(id);
					if self.subscribers.len() == 0 {
						self.abandoned = true;
						if !self.turn.responding {
							self.shutdown("idle");
							break;
						}
					}
				}

				ChatCommand::Snapshot { reply } => {
					let _ = reply.send(self.turn.clone());
				}

				ChatCommand::Close { reply } => {
					self.shutdown("requested");
					let _ = reply.send(());
					break;
				}
			}
		}

		self.subscribers.close_all(Event::Control(Control::Close));
	}
}

/// Cloneable handle to a running chat actor
#[derive(Clone, Debug)]
pub struct ChatHandle {
	key: JobKey,
	sender: mpsc::Sender<ChatCommand>,
}

impl ChatHandle {
	#[must_use]
	pub fn spawn(key: JobKey, settings: &JobSettings) -> Self {
		let (sender, receiver) = mpsc::channel(settings.command_buffer.max(1));
		tokio::spawn(ChatActor::new(key.clone(), receiver, settings.max_subscribers).run());
		Self { key, sender }
	}

	pub fn key(&self) -> &JobKey {
		&self.key
	}

	pub fn is_closed(&self) -> bool {
		self.sender.is_closed()
	}

	/// Begin a new turn: clears the text, bumps the counter and marks the chat responding.
	///
	/// Fails with [`JobError::AlreadyResponding`] while a previous answer is still streaming.
	pub async fn start_response(&self) -> Result<u64, JobError> {
		let (tx, rx) = oneshot::channel();
		self.send(ChatCommand::StartResponse { reply: tx }).await?;
		rx.await.map_err(|_| self.closed())?
	}

	/// Append `token` to the current answer and forward it, then pause for `pace_for`
	pub async fn broadcast_token(&self, token: impl Into<String>, pace_for: Duration) -> Result<(), JobError> {
		self.send(ChatCommand::Token(token.into())).await?;
		pace(pace_for).await;
		Ok(())
	}

	pub async fn finish_response(&self) -> Result<(), JobError> {
		self.send(ChatCommand::Finish).await
	}

	pub async fn broadcast_error(&self, message: impl Into<String>) -> Result<(), JobError> {
		self.send(ChatCommand::Fail(message.into())).await
	}

	pub async fn subscribe(&self) -> Result<Subscription<ChatTurn>, JobError> {
		let (tx, rx) = oneshot::channel();
		self.send(ChatCommand::Subscribe { reply: tx }).await?;
		let (id, snapshot, events) = rx.await.map_err(|_| self.closed())??;

		let weak = self.sender.downgrade();
		let guard = DetachGuard::new(id, move |id| {
			let Some(sender) = weak.upgrade() else {
				return;
			};
			if let Err(mpsc::error::TrySendError::Full(cmd)) = sender.try_send(ChatCommand::Unsubscribe { id }) {
				if let Ok(runtime) = tokio::runtime::Handle::try_current() {
					runtime.spawn(async move {
						let _ = sender.send(cmd).await;
					});
				}
			}
		});
		Ok(Subscription::new(id, snapshot, events, guard))
	}

	pub async fn snapshot(&self) -> Result<ChatTurn, JobError> {
		let (tx, rx) = oneshot::channel();
		self.send(ChatCommand::Snapshot { reply: tx }).await?;
		rx.await.map_err(|_| self.closed())
	}

	pub async fn close(&self) {
		let (tx, rx) = oneshot::channel();
		if self.sender.send(ChatCommand::Close { reply: tx }).await.is_ok() {
			let _ = rx.await;
		}
	}

	async fn send(&self, cmd: ChatCommand) -> Result<(), JobError> {
		self.sender.send(cmd).await.map_err(|_| self.closed())
	}

	fn closed(&self) -> JobError {
		JobError::Closed(self.key.clone())
	}
}
