//! View lifecycle: which view is active and what it holds open.
//!
//! The coordinator owns the one [`Session`] of a page and hands clones of it
//! to the view it builds. Entering a view first tears down the previous one,
//! so at most one capture loop or chat exchange is ever live. Destroying the
//! view and unloading the page both end in the same idempotent teardown.

use std::sync::Arc;

use parking_lot::Mutex;
use signlink_runtime::Session;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::capture::{CaptureState, CaptureView, FrameCaptureLoop};
use crate::chat::ChatExchange;
use crate::config::ClientConfig;
use crate::media::MediaDevices;

enum ActiveView {
	Camera(Arc<FrameCaptureLoop>),
	Chat(Arc<ChatExchange>),
}

pub struct LifecycleCoordinator {
	config: ClientConfig,
	session: Arc<Session>,
	active: Mutex<Option<ActiveView>>,
}

impl LifecycleCoordinator {
	/// Creates a coordinator with a WebSocket session for `config.endpoint`.
	pub fn new(config: ClientConfig) -> Self {
		let session = Arc::new(Session::new(config.endpoint.clone()));
		Self::with_session(config, session)
	}

	pub fn with_session(config: ClientConfig, session: Arc<Session>) -> Self {
		Self {
			config,
			session,
			active: Mutex::new(None),
		}
	}

	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// State of the active capture loop, if the camera view is active.
	pub fn capture_state(&self) -> Option<CaptureState> {
		match self.active.lock().as_ref() {
			Some(ActiveView::Camera(capture)) => Some(capture.state()),
			_ => None,
		}
	}

	/// Enters the camera view.
	///
	/// Connects, asks for the camera slot and starts capturing from `devices`.
	/// Neither a failed connection nor a camera that cannot be acquired stops
	/// the view: both are logged, and frames sent without a connection are
	/// dropped by the session.
	pub async fn enter_camera(&self, devices: &dyn MediaDevices) -> watch::Receiver<CaptureView> {
		self.teardown().await;
		self.connect().await;
		self.session.announce_camera().await;

		let capture = Arc::new(FrameCaptureLoop::new(Arc::clone(&self.session), self.config.capture_interval()));
		let view = capture.observe();
		*self.active.lock() = Some(ActiveView::Camera(Arc::clone(&capture)));

		let started = capture.start(devices).await;
		info!(target = "signlink.lifecycle", started, connected = self.session.is_connected(), "entered camera view");
		view
	}

	/// Enters the chat view with an empty transcript.
	///
	/// Built even when the connection fails; submissions then end as
	/// [`SubmitOutcome::Undelivered`](crate::chat::SubmitOutcome::Undelivered).
	pub async fn enter_chat(&self) -> Arc<ChatExchange> {
		self.teardown().await;
		self.connect().await;

		let chat = Arc::new(ChatExchange::with_timeout(Arc::clone(&self.session), self.config.chat_timeout()));
		*self.active.lock() = Some(ActiveView::Chat(Arc::clone(&chat)));

		info!(target = "signlink.lifecycle", connected = self.session.is_connected(), "entered chat view");
		chat
	}

	async fn connect(&self) {
		if let Err(err) = self.session.connect().await {
			warn!(target = "signlink.lifecycle", endpoint = %self.session.endpoint(), error = %err, "continuing without a connection");
		}
	}

	/// The active view is being destroyed.
	pub async fn on_destroy(&self) {
		debug!(target = "signlink.lifecycle", "view destroyed");
		self.teardown().await;
	}

	/// The page is being unloaded.
	pub async fn on_unload(&self) {
		debug!(target = "signlink.lifecycle", "page unloading");
		self.teardown().await;
	}

	/// Stops capture, releases the camera, revokes the camera slot and
	/// disconnects. Any number of calls, in any order, is fine.
	pub async fn teardown(&self) {
		let active = self.active.lock().take();
		if let Some(ActiveView::Camera(capture)) = active {
			capture.teardown().await;
		}

		self.session.revoke_camera().await;
		self.session.disconnect().await;
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use signlink_runtime::{Dialer, SessionState};
	use signlink_runtime::fake_transport::FakeDialer;

	use super::*;
	use crate::chat::{ChatEntry, SubmitOutcome};
	use crate::media::{Dimensions, StillImageCamera, VideoFrame};

	fn coordinator() -> (LifecycleCoordinator, Arc<FakeDialer>) {
		let dialer = Arc::new(FakeDialer::new());
		let session = Arc::new(Session::with_dialer("ws://fake", Arc::clone(&dialer) as Arc<dyn Dialer>));
		(LifecycleCoordinator::with_session(ClientConfig::default(), session), dialer)
	}

	fn camera() -> StillImageCamera {
		StillImageCamera::new(vec![VideoFrame::png(Dimensions::new(640, 480), b"\x89PNG".to_vec())])
	}

	#[tokio::test(start_paused = true)]
	async fn camera_view_announces_and_captures() {
		let (coordinator, dialer) = coordinator();
		let controller = dialer.queue();

		coordinator.enter_camera(&camera()).await;
		assert_eq!(coordinator.capture_state(), Some(CaptureState::Capturing));
		assert_eq!(controller.next_sent().await.unwrap().event, "cameracon");
		assert_eq!(controller.next_sent().await.unwrap().event, "frame");
	}

	#[tokio::test(start_paused = true)]
	async fn destroy_then_unload_is_harmless() {
		let (coordinator, dialer) = coordinator();
		let controller = dialer.queue();
		let camera = camera();
		coordinator.enter_camera(&camera).await;

		coordinator.on_destroy().await;
		coordinator.on_unload().await;

		assert!(camera.tracks_stopped());
		assert_eq!(coordinator.capture_state(), None);
		assert_eq!(coordinator.session().state(), SessionState::Disconnected);
		assert!(controller.is_closed());

		controller.try_sent();
		tokio::time::sleep(Duration::from_secs(10)).await;
		assert!(controller.try_sent().is_empty());
	}

	#[tokio::test]
	async fn unload_without_a_view_is_a_no_op() {
		let (coordinator, dialer) = coordinator();
		coordinator.on_unload().await;
		coordinator.on_destroy().await;
		assert_eq!(dialer.dial_count(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn switching_views_tears_down_the_camera() {
		let (coordinator, dialer) = coordinator();
		let first = dialer.queue();
		let second = dialer.queue();
		let camera = camera();

		coordinator.enter_camera(&camera).await;
		let chat = coordinator.enter_chat().await;

		assert!(camera.tracks_stopped());
		assert!(first.is_closed());
		assert_eq!(coordinator.capture_state(), None);
		assert!(coordinator.session().is_connected());

		let submission = tokio::spawn({
			let chat = Arc::clone(&chat);
			async move { chat.submit("What is used for backend?").await }
		});
		let request = second.next_event("message").await.unwrap();
		second.reply_to(&request, "Flask");
		assert_eq!(submission.await.unwrap(), SubmitOutcome::Answered("Flask".to_string()));
	}

	#[tokio::test(start_paused = true)]
	async fn reentering_chat_starts_an_empty_transcript() {
		let (coordinator, dialer) = coordinator();
		let _first = dialer.queue();
		let _second = dialer.queue();

		let chat = coordinator.enter_chat().await;
		assert_eq!(chat.submit("hello").await, SubmitOutcome::TimedOut);
		assert_eq!(chat.transcript(), vec![ChatEntry::User("hello".to_string())]);

		let chat = coordinator.enter_chat().await;
		assert!(chat.transcript().is_empty());
		assert_eq!(dialer.dial_count(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn views_are_built_without_a_connection() {
		let (coordinator, dialer) = coordinator();
		let camera = camera();

		coordinator.enter_camera(&camera).await;
		assert_eq!(coordinator.capture_state(), Some(CaptureState::Capturing));
		assert_eq!(coordinator.session().state(), SessionState::Disconnected);

		tokio::time::sleep(Duration::from_millis(4500)).await;
		assert_eq!(coordinator.session().pending_replies(), 0);

		let chat = coordinator.enter_chat().await;
		assert!(camera.tracks_stopped());
		assert_eq!(chat.submit("hello").await, SubmitOutcome::Undelivered);
		assert_eq!(chat.transcript(), vec![ChatEntry::User("hello".to_string())]);
		assert_eq!(dialer.dial_count(), 2);

		coordinator.on_unload().await;
	}
}
