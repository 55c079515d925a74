//! Question answering over a transcript, streamed to every subscriber of the video's chat.

use futures::{FutureExt, StreamExt};
use job_broadcast::{ChatHandle, ChatRegistry, JobKey, StageError, StageUpdate, WorkerBridge};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::error::ApiError;
use crate::services::prompt::chat_context_prompt;
use crate::services::{ArtifactStore, ChatBackend, ChatMessage};

const NAME: &str = "chat";

#[derive(Clone)]
pub struct ChatService {
	chats: ChatRegistry,
	llm: Arc<dyn ChatBackend>,
	artifacts: ArtifactStore,
	pace: Duration,
}

impl ChatService {
	pub fn new(chats: ChatRegistry, llm: Arc<dyn ChatBackend>, artifacts: ArtifactStore, pace: Duration) -> Self {
		Self { chats, llm, artifacts, pace }
	}

	pub const fn chats(&self) -> &ChatRegistry {
		&self.chats
	}

	/// Start answering `question` for `video_id` and return the new turn number.
	///
	/// The answer streams in the background; a chat that is still answering rejects the question.
	#[instrument(skip(self, question))]
	pub async fn ask(&self, video_id: &str, question: &str) -> Result<u64, ApiError> {
		let question = question.trim();
		if question.is_empty() {
			return Err(ApiError::MissingField("question"));
		}

		let chat = self.chats.get_or_create(JobKey::from(video_id));
		let turn = chat.start_response().await?;
		info!(turn, "💬 Answering question");

		let service = self.clone();
		let video_id = video_id.to_string();
		let question = question.to_string();
		tokio::spawn(async move {
			let answer = service.answer(&chat, &video_id, question);
			settle(&chat, &video_id, answer).await;
		});

		Ok(turn)
	}

	async fn answer(&self, chat: &ChatHandle, video_id: &str, question: String) -> Result<(), StageError> {
		let mut history = self.artifacts.load_history(video_id).await;
		let transcript = self.artifacts.transcript_text(video_id).await;

		let mut messages = Vec::with_capacity(history.len() + 2);
		messages.push(ChatMessage::system(chat_context_prompt(&transcript)));
		messages.extend(history.iter().cloned());
		messages.push(ChatMessage::user(question.clone()));

		let llm = Arc::clone(&self.llm);
		let mut bridge = WorkerBridge::spawn(NAME, move |tx| async move {
			let mut tokens = llm.stream_chat(messages).await?;
			while let Some(token) = tokens.next().await {
				if !tx.update(token?) {
					break;
				}
			}
			Ok::<(), anyhow::Error>(())
		});

		let mut response = String::new();
		while let Some(update) = bridge.recv().await? {
			if let StageUpdate::Update(token) = update {
				response.push_str(&token);
				chat.broadcast_token(token, self.pace).await?;
			}
		}

		history.push(ChatMessage::user(question));
		history.push(ChatMessage::assistant(response));
		self.artifacts.save_history(video_id, &history).await?;

		chat.finish_response().await?;
		Ok(())
	}
}

/// Drive an answer to its end; a failed or panicked answer still ends the turn
async fn settle<F>(chat: &ChatHandle, video_id: &str, answer: F)
where
	F: Future<Output = Result<(), StageError>>,
{
	let message = match AssertUnwindSafe(answer).catch_unwind().await {
		Ok(Ok(())) => return,
		Ok(Err(e)) => {
			error!(video_id = %video_id, error = %e, "Chat response failed");
			e.to_string()
		}
		Err(_) => {
			error!(video_id = %video_id, "💥 Chat response panicked");
			StageError::Panicked { stage: NAME }.to_string()
		}
	};
	let _ = chat.broadcast_error(message).await;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::services::Role;
	use crate::testing::FakeLlm;
	use job_broadcast::{Event, JobError, JobSettings, Segment};

	fn service(dir: &std::path::Path, llm: FakeLlm) -> (ChatService, Arc<FakeLlm>) {
		let llm = Arc::new(llm);
		let chats = ChatRegistry::new(JobSettings {
			pace: Duration::ZERO,
			..JobSettings::default()
		});
		(ChatService::new(chats, llm.clone(), ArtifactStore::new(dir), Duration::ZERO), llm)
	}

	async fn drain_turn(subscription: &mut job_broadcast::Subscription<job_broadcast::ChatTurn>) -> Vec<Event> {
		let mut events = Vec::new();
		while let Some(event) = subscription.recv().await {
			let done = matches!(event, Event::Control(_));
			events.push(event);
			if done {
				break;
			}
		}
		events
	}

	#[tokio::test]
	async fn answer_streams_tokens_and_saves_history() {
		let dir = tempfile::tempdir().unwrap();
		let (service, llm) = service(dir.path(), FakeLlm::replying(&["Because ", "lifetimes."]));
		let artifacts = ArtifactStore::new(dir.path());
		artifacts
			.write_transcript(
				"abc",
				&[Segment {
					start: 0.0,
					end: 1.0,
					text: "Lifetimes are regions.".into(),
				}],
			)
			.await
			.unwrap();

		let chat = service.chats().get_or_create(JobKey::from("abc"));
		let mut subscription = chat.subscribe().await.unwrap();

		assert_eq!(service.ask("abc", "  Why?  ").await.unwrap(), 1);
		let events = drain_turn(&mut subscription).await;

		assert_eq!(
			events,
			vec![
				Event::Token("Because ".into()),
				Event::Token("lifetimes.".into()),
				Event::Control(job_broadcast::Control::Complete)
			]
		);

		let history = artifacts.load_history("abc").await;
		assert_eq!(history, vec![ChatMessage::user("Why?"), ChatMessage::assistant("Because lifetimes.")]);

		let prompt = &llm.requests()[0];
		assert_eq!(prompt[0].role, Role::System);
		assert!(prompt[0].content.contains("Lifetimes are regions."));
		assert_eq!(prompt.last().unwrap().content, "Why?");

		let turn = chat.snapshot().await.unwrap();
		assert_eq!(turn.text, "Because lifetimes.");
		assert!(!turn.responding);
	}

	#[tokio::test]
	async fn backend_failure_becomes_error_signal() {
		let dir = tempfile::tempdir().unwrap();
		let llm = FakeLlm {
			fail_with: Some("model offline".into()),
			..FakeLlm::default()
		};
		let (service, _) = service(dir.path(), llm);
		let chat = service.chats().get_or_create(JobKey::from("abc"));
		let mut subscription = chat.subscribe().await.unwrap();

		service.ask("abc", "hello").await.unwrap();
		let events = drain_turn(&mut subscription).await;

		assert_eq!(events, vec![Event::Control(job_broadcast::Control::Error("chat failed: model offline".into()))]);
		assert!(!chat.snapshot().await.unwrap().responding);
		assert!(ArtifactStore::new(dir.path()).load_history("abc").await.is_empty());
	}

	#[tokio::test]
	async fn blank_question_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let (service, _) = service(dir.path(), FakeLlm::default());
		assert!(matches!(service.ask("abc", "   ").await, Err(ApiError::MissingField("question"))));
		assert!(service.chats().is_empty());
	}

	#[tokio::test]
	async fn second_question_while_answering_conflicts() {
		let dir = tempfile::tempdir().unwrap();
		let (service, _) = service(dir.path(), FakeLlm::default());
		let chat = service.chats().get_or_create(JobKey::from("abc"));
		chat.start_response().await.unwrap();

		let err = service.ask("abc", "again?").await.unwrap_err();
		assert!(matches!(err, ApiError::Job(JobError::AlreadyResponding(_))));
	}

	#[tokio::test]
	async fn panicked_answer_ends_the_turn() {
		let dir = tempfile::tempdir().unwrap();
		let (service, _) = service(dir.path(), FakeLlm::replying(&["ok"]));
		let chat = service.chats().get_or_create(JobKey::from("abc"));
		let mut subscription = chat.subscribe().await.unwrap();

		chat.start_response().await.unwrap();
		let exploding = std::future::ready(()).map(|()| -> Result<(), StageError> { panic!("tokenizer exploded") });
		settle(&chat, "abc", exploding).await;

		let events = drain_turn(&mut subscription).await;
		assert_eq!(events, vec![Event::Control(job_broadcast::Control::Error("chat worker panicked".into()))]);
		assert!(!chat.snapshot().await.unwrap().responding);

		assert_eq!(service.ask("abc", "still there?").await.unwrap(), 2);
		let events = drain_turn(&mut subscription).await;
		assert_eq!(events.last(), Some(&Event::Control(job_broadcast::Control::Complete)));
	}
}
