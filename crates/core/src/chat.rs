//! Chat view: question submission and transcript.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use signlink_protocol::is_chat_failure;
use signlink_runtime::Session;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_CHAT_TIMEOUT_MS;

/// One transcript entry. User and bot turns are always separate entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "from", content = "text", rename_all = "lowercase")]
pub enum ChatEntry {
	User(String),
	Bot(String),
}

impl ChatEntry {
	pub fn text(&self) -> &str {
		match self {
			ChatEntry::User(text) | ChatEntry::Bot(text) => text,
		}
	}

	pub fn is_user(&self) -> bool {
		matches!(self, ChatEntry::User(_))
	}
}

/// How a submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
	/// Empty after trimming; nothing was sent or recorded.
	Rejected,
	/// The service answered; the answer was appended.
	Answered(String),
	/// The service reported a failure; nothing was appended.
	Suppressed,
	/// No answer within the timeout.
	TimedOut,
	/// The session was not connected or dropped before answering.
	Undelivered,
}

/// Sends questions through the session and keeps the transcript.
pub struct ChatExchange {
	session: Arc<Session>,
	timeout: Duration,
	transcript: watch::Sender<Vec<ChatEntry>>,
}

impl ChatExchange {
	pub fn new(session: Arc<Session>) -> Self {
		Self::with_timeout(session, Duration::from_millis(DEFAULT_CHAT_TIMEOUT_MS))
	}

	pub fn with_timeout(session: Arc<Session>, timeout: Duration) -> Self {
		let (transcript, _) = watch::channel(Vec::new());
		Self {
			session,
			timeout,
			transcript,
		}
	}

	pub fn transcript(&self) -> Vec<ChatEntry> {
		self.transcript.borrow().clone()
	}

	pub fn observe(&self) -> watch::Receiver<Vec<ChatEntry>> {
		self.transcript.subscribe()
	}

	/// Submits `text`.
	///
	/// The trimmed question is appended before anything is sent. The answer
	/// is appended when it arrives in time and is not a failure notice; every
	/// other ending leaves the transcript with the question alone.
	pub async fn submit(&self, text: &str) -> SubmitOutcome {
		let question = text.trim();
		if question.is_empty() {
			debug!(target = "signlink.chat", "empty submission ignored");
			return SubmitOutcome::Rejected;
		}
		self.push(ChatEntry::User(question.to_string()));

		match tokio::time::timeout(self.timeout, self.session.send_message(question)).await {
			Ok(Ok(reply)) if is_chat_failure(&reply) => {
				warn!(target = "signlink.chat", %reply, "service failed to answer");
				SubmitOutcome::Suppressed
			}
			Ok(Ok(reply)) => {
				info!(target = "signlink.chat", "answer received");
				self.push(ChatEntry::Bot(reply.clone()));
				SubmitOutcome::Answered(reply)
			}
			Ok(Err(err)) => {
				debug!(target = "signlink.chat", error = %err, "question not delivered");
				SubmitOutcome::Undelivered
			}
			Err(_) => {
				warn!(target = "signlink.chat", timeout_ms = self.timeout.as_millis() as u64, "no answer in time");
				SubmitOutcome::TimedOut
			}
		}
	}

	fn push(&self, entry: ChatEntry) {
		self.transcript.send_modify(|entries| entries.push(entry));
	}
}

#[cfg(test)]
mod tests {
	use signlink_runtime::fake_transport::{FakeDialer, FakeTransportController};

	use super::*;

	async fn connected() -> (Arc<Session>, FakeTransportController) {
		let dialer = Arc::new(FakeDialer::new());
		let controller = dialer.queue();
		let session = Arc::new(Session::with_dialer("ws://fake", dialer));
		session.connect().await.unwrap();
		(session, controller)
	}

	#[tokio::test]
	async fn blank_submissions_are_rejected() {
		let (session, controller) = connected().await;
		let chat = ChatExchange::new(session);

		assert_eq!(chat.submit("").await, SubmitOutcome::Rejected);
		assert_eq!(chat.submit("   \n\t").await, SubmitOutcome::Rejected);
		assert!(chat.transcript().is_empty());
		assert!(controller.try_sent().is_empty());
	}

	#[tokio::test]
	async fn question_is_recorded_before_the_answer() {
		let (session, controller) = connected().await;
		let chat = Arc::new(ChatExchange::new(session));

		let submission = tokio::spawn({
			let chat = Arc::clone(&chat);
			async move { chat.submit("  What is used for backend?  ").await }
		});

		let request = controller.next_event("message").await.unwrap();
		assert_eq!(request.data.as_ref().unwrap()["message"], "What is used for backend?");
		assert_eq!(chat.transcript(), vec![ChatEntry::User("What is used for backend?".to_string())]);

		controller.reply_to(&request, "Flask is used for the backend.");
		assert_eq!(submission.await.unwrap(), SubmitOutcome::Answered("Flask is used for the backend.".to_string()));
		assert_eq!(
			chat.transcript(),
			vec![
				ChatEntry::User("What is used for backend?".to_string()),
				ChatEntry::Bot("Flask is used for the backend.".to_string()),
			]
		);
	}

	#[tokio::test]
	async fn failure_notices_are_suppressed() {
		let (session, controller) = connected().await;
		let chat = Arc::new(ChatExchange::new(session));

		let submission = tokio::spawn({
			let chat = Arc::clone(&chat);
			async move { chat.submit("hello").await }
		});
		let request = controller.next_event("message").await.unwrap();
		controller.reply_to(&request, "Failed to receive a response: upstream unavailable");

		assert_eq!(submission.await.unwrap(), SubmitOutcome::Suppressed);
		assert_eq!(chat.transcript(), vec![ChatEntry::User("hello".to_string())]);
	}

	#[tokio::test(start_paused = true)]
	async fn unanswered_question_times_out_quietly() {
		let (session, controller) = connected().await;
		let chat = ChatExchange::with_timeout(Arc::clone(&session), Duration::from_secs(20));

		let started = tokio::time::Instant::now();
		assert_eq!(chat.submit("anyone there?").await, SubmitOutcome::TimedOut);
		assert!(started.elapsed() >= Duration::from_secs(20));
		assert_eq!(chat.transcript().len(), 1);
		assert_eq!(session.pending_replies(), 0);

		let request = controller.next_event("message").await.unwrap();
		controller.reply_to(&request, "too late");
		tokio::task::yield_now().await;
		assert_eq!(chat.transcript().len(), 1);
	}

	#[tokio::test]
	async fn disconnected_session_leaves_question_only() {
		let session = Arc::new(Session::with_dialer("ws://fake", Arc::new(FakeDialer::new())));
		let chat = ChatExchange::new(session);

		assert_eq!(chat.submit("hi").await, SubmitOutcome::Undelivered);
		assert_eq!(chat.transcript(), vec![ChatEntry::User("hi".to_string())]);
	}

	#[tokio::test]
	async fn concurrent_questions_get_their_own_answers() {
		let (session, controller) = connected().await;
		let chat = Arc::new(ChatExchange::new(session));

		let first = tokio::spawn({
			let chat = Arc::clone(&chat);
			async move { chat.submit("first").await }
		});
		let a = controller.next_event("message").await.unwrap();
		let second = tokio::spawn({
			let chat = Arc::clone(&chat);
			async move { chat.submit("second").await }
		});
		let b = controller.next_event("message").await.unwrap();

		controller.reply_to(&b, "answer two");
		assert_eq!(second.await.unwrap(), SubmitOutcome::Answered("answer two".to_string()));
		controller.reply_to(&a, "answer one");
		assert_eq!(first.await.unwrap(), SubmitOutcome::Answered("answer one".to_string()));

		let bots: Vec<String> = chat.transcript().into_iter().filter(|e| !e.is_user()).map(|e| e.text().to_string()).collect();
		assert_eq!(bots, vec!["answer two", "answer one"]);
	}

	#[test]
	fn entries_serialize_with_their_side() {
		let json = serde_json::to_value(vec![ChatEntry::User("q".into()), ChatEntry::Bot("a".into())]).unwrap();
		assert_eq!(json, serde_json::json!([{"from": "user", "text": "q"}, {"from": "bot", "text": "a"}]));
	}
}
