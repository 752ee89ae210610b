//! The transport session: one duplex connection shared by the frame and
//! chat flows.
//!
//! A [`Session`] is an explicitly owned handle. The lifecycle layer creates
//! it, wraps it in an `Arc` and hands clones to the capture loop and the chat
//! exchange; nothing reaches it through a global.
//!
//! Every operation follows a soft-failure policy: invoked while no
//! connection is open it logs at debug level and emits nothing. Sends return
//! [`Error::NotConnected`] so callers can tell, the camera control signals
//! return nothing at all.
//!
//! There is no reconnection. A connection dropped by the service is logged,
//! every pending reply fails with [`Error::ChannelClosed`], and the session
//! goes back to [`SessionState::Disconnected`] until `connect` is called
//! again.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use signlink_protocol::{CameraAck, ClientEvent, classify_camera_ack};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::transport::{Dialer, WebSocketDialer};

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SessionState::Disconnected => write!(f, "disconnected"),
			SessionState::Connecting => write!(f, "connecting"),
			SessionState::Connected => write!(f, "connected"),
		}
	}
}

struct Link {
	connection: Arc<Connection>,
	reader: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
	state: SessionState,
	link: Option<Link>,
}

/// Persistent duplex session with the recognition service.
pub struct Session {
	endpoint: String,
	dialer: Arc<dyn Dialer>,
	inner: Arc<Mutex<Inner>>,
}

impl Session {
	/// Creates an unconnected session for a WebSocket `endpoint`.
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self::with_dialer(endpoint, Arc::new(WebSocketDialer))
	}

	pub fn with_dialer(endpoint: impl Into<String>, dialer: Arc<dyn Dialer>) -> Self {
		Self {
			endpoint: endpoint.into(),
			dialer,
			inner: Arc::new(Mutex::new(Inner::default())),
		}
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	pub fn state(&self) -> SessionState {
		self.inner.lock().state
	}

	pub fn is_connected(&self) -> bool {
		self.state() == SessionState::Connected
	}

	/// Number of requests waiting for a reply on the open connection.
	pub fn pending_replies(&self) -> usize {
		self.connection().map_or(0, |connection| connection.pending_count())
	}

	/// Opens the connection.
	///
	/// A no-op (with a warning) while already connecting or connected. A
	/// failed dial leaves the session disconnected and is returned.
	pub async fn connect(&self) -> Result<()> {
		{
			let mut inner = self.inner.lock();
			if inner.state != SessionState::Disconnected {
				warn!(target = "signlink.session", state = %inner.state, endpoint = %self.endpoint, "connect called on an open session; ignoring");
				return Ok(());
			}
			inner.state = SessionState::Connecting;
		}

		let parts = match self.dialer.dial(&self.endpoint).await {
			Ok(parts) => parts,
			Err(err) => {
				let mut inner = self.inner.lock();
				if inner.state == SessionState::Connecting {
					inner.state = SessionState::Disconnected;
				}
				error!(target = "signlink.session", endpoint = %self.endpoint, error = %err, "failed to connect");
				return Err(err);
			}
		};

		let connection = Arc::new(Connection::new(parts));
		let superseded = {
			let mut inner = self.inner.lock();
			if inner.state == SessionState::Connecting {
				inner.state = SessionState::Connected;
				inner.link = Some(Link {
					connection: Arc::clone(&connection),
					reader: None,
				});
				false
			} else {
				true
			}
		};
		if superseded {
			debug!(target = "signlink.session", endpoint = %self.endpoint, "disconnect raced connect; closing new connection");
			if let Err(err) = connection.close().await {
				debug!(target = "signlink.session", error = %err, "close failed");
			}
			return Ok(());
		}

		let reader = tokio::spawn({
			let connection = Arc::clone(&connection);
			let inner = Arc::clone(&self.inner);
			async move {
				connection.run().await;
				on_remote_close(&inner, &connection);
			}
		});

		if let Some(link) = self.inner.lock().link.as_mut().filter(|link| Arc::ptr_eq(&link.connection, &connection)) {
			link.reader = Some(reader);
		}

		info!(target = "signlink.session", endpoint = %self.endpoint, "connected to server");
		Ok(())
	}

	/// Revokes the camera slot (best effort) and closes the connection.
	///
	/// Safe to call when already disconnected.
	pub async fn disconnect(&self) {
		let link = {
			let mut inner = self.inner.lock();
			let previous = std::mem::replace(&mut inner.state, SessionState::Disconnected);
			if previous == SessionState::Disconnected {
				debug!(target = "signlink.session", "disconnect on a closed session; nothing to do");
			}
			inner.link.take()
		};
		let Some(link) = link else {
			return;
		};

		let id = link.connection.next_id();
		if let Err(err) = link.connection.emit(ClientEvent::CameraDisconnect.into_request(id)).await {
			debug!(target = "signlink.session", error = %err, "camera revoke not sent");
		}
		if let Err(err) = link.connection.close().await {
			debug!(target = "signlink.session", error = %err, "close failed");
		}
		if let Some(reader) = link.reader {
			reader.abort();
		}

		let abandoned = link.connection.abandon_all();
		info!(target = "signlink.session", endpoint = %self.endpoint, abandoned, "disconnected from server");
	}

	/// Asks the service for the single active camera slot.
	///
	/// Returns once the signal is written; the acknowledgement is only logged.
	pub async fn announce_camera(&self) {
		self.signal(ClientEvent::CameraConnect).await;
	}

	/// Gives the camera slot back. Same delivery rules as `announce_camera`.
	pub async fn revoke_camera(&self) {
		self.signal(ClientEvent::CameraDisconnect).await;
	}

	/// Uploads one encoded frame and waits for its label.
	pub async fn send_frame(&self, encoded: impl Into<String>) -> Result<String> {
		self.request(ClientEvent::Frame { data: encoded.into() }).await
	}

	/// Sends one chat message and waits for its answer.
	pub async fn send_message(&self, text: impl Into<String>) -> Result<String> {
		self.request(ClientEvent::Message { message: text.into() }).await
	}

	async fn request(&self, event: ClientEvent) -> Result<String> {
		let Some(connection) = self.connection() else {
			debug!(target = "signlink.session", event = event.name(), "session not connected; dropping");
			return Err(Error::NotConnected);
		};
		connection.request(event).await
	}

	async fn signal(&self, event: ClientEvent) {
		let name = event.name();
		let Some(connection) = self.connection() else {
			debug!(target = "signlink.session", event = name, "session not connected; dropping");
			return;
		};

		let pending = match connection.send(event).await {
			Ok(pending) => pending,
			Err(err) => {
				debug!(target = "signlink.session", event = name, error = %err, "signal not sent");
				return;
			}
		};

		tokio::spawn(async move {
			match pending.recv().await {
				Ok(message) => {
					let ack = classify_camera_ack(&message);
					if ack == CameraAck::Other {
						debug!(target = "signlink.session", event = name, %message, "signal acknowledged");
					} else {
						info!(target = "signlink.session", event = name, ?ack, %message, "signal acknowledged");
					}
				}
				Err(err) => debug!(target = "signlink.session", event = name, error = %err, "signal not acknowledged"),
			}
		});
	}

	fn connection(&self) -> Option<Arc<Connection>> {
		let inner = self.inner.lock();
		match (inner.state, inner.link.as_ref()) {
			(SessionState::Connected, Some(link)) => Some(Arc::clone(&link.connection)),
			_ => None,
		}
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		if let Some(link) = self.inner.lock().link.take() {
			if let Some(reader) = link.reader {
				reader.abort();
			}
			link.connection.abandon_all();
		}
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("endpoint", &self.endpoint)
			.field("state", &self.state())
			.finish()
	}
}

/// Clears the link if the closed connection is still the current one.
fn on_remote_close(inner: &Mutex<Inner>, connection: &Arc<Connection>) {
	let mut inner = inner.lock();
	let current = inner.link.as_ref().is_some_and(|link| Arc::ptr_eq(&link.connection, connection));
	if current {
		inner.link = None;
		inner.state = SessionState::Disconnected;
		info!(target = "signlink.session", "disconnected from server");
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use signlink_protocol::{NOT_ACTIVE_SOCKET, NOW_ACTIVE_SOCKET};

	use super::*;
	use crate::fake_transport::{FakeDialer, FakeTransportController};

	async fn connected_session() -> (Arc<Session>, FakeTransportController) {
		let dialer = Arc::new(FakeDialer::new());
		let controller = dialer.queue();
		let session = Arc::new(Session::with_dialer("ws://fake/ws", dialer));
		session.connect().await.unwrap();
		(session, controller)
	}

	#[tokio::test]
	async fn connect_transitions_to_connected() {
		let (session, _controller) = connected_session().await;
		assert_eq!(session.state(), SessionState::Connected);
		assert!(session.is_connected());
	}

	#[tokio::test]
	async fn connect_twice_is_a_noop() {
		let dialer = Arc::new(FakeDialer::new());
		let _controller = dialer.queue();
		let session = Session::with_dialer("ws://fake/ws", Arc::clone(&dialer) as Arc<dyn Dialer>);

		session.connect().await.unwrap();
		session.connect().await.unwrap();

		assert_eq!(dialer.dial_count(), 1);
		assert!(session.is_connected());
	}

	#[tokio::test]
	async fn failed_dial_leaves_session_disconnected() {
		let session = Session::with_dialer("ws://fake/ws", Arc::new(FakeDialer::new()));

		assert!(session.connect().await.is_err());
		assert_eq!(session.state(), SessionState::Disconnected);
	}

	#[tokio::test]
	async fn sends_while_disconnected_are_dropped() {
		let dialer = Arc::new(FakeDialer::new());
		let controller = dialer.queue();
		let session = Session::with_dialer("ws://fake/ws", dialer);

		assert!(matches!(session.send_frame("data:image/png;base64,AA").await, Err(Error::NotConnected)));
		assert!(matches!(session.send_message("hello").await, Err(Error::NotConnected)));
		session.announce_camera().await;
		session.revoke_camera().await;
		session.disconnect().await;

		assert!(controller.try_sent().is_empty());
	}

	#[tokio::test]
	async fn send_frame_round_trip() {
		let (session, controller) = connected_session().await;

		let send = tokio::spawn({
			let session = Arc::clone(&session);
			async move { session.send_frame("data:image/png;base64,AAAA").await }
		});

		let request = controller.next_sent().await.unwrap();
		assert_eq!(request.event, "frame");
		assert_eq!(request.data.as_ref().unwrap()["data"], "data:image/png;base64,AAAA");
		controller.reply_to(&request, NOT_ACTIVE_SOCKET);

		assert_eq!(send.await.unwrap().unwrap(), NOT_ACTIVE_SOCKET);
		assert_eq!(session.pending_replies(), 0);
	}

	#[tokio::test]
	async fn chat_reply_on_frame_channel_is_not_delivered() {
		let (session, controller) = connected_session().await;

		let send = tokio::spawn({
			let session = Arc::clone(&session);
			async move { session.send_message("What is used for backend?").await }
		});

		let request = controller.next_sent().await.unwrap();
		controller.inject_reply(signlink_protocol::ReplyChannel::Response, request.id, "A");
		controller.reply_to(&request, "Flask");

		assert_eq!(send.await.unwrap().unwrap(), "Flask");
	}

	#[tokio::test]
	async fn announce_camera_does_not_wait_for_ack() {
		let (session, controller) = connected_session().await;

		session.announce_camera().await;

		let request = controller.next_sent().await.unwrap();
		assert_eq!(request.event, "cameracon");
		assert!(request.data.is_none());
		assert_eq!(session.pending_replies(), 1);

		controller.reply_to(&request, NOW_ACTIVE_SOCKET);
		tokio::time::timeout(Duration::from_secs(1), async {
			while session.pending_replies() > 0 {
				tokio::task::yield_now().await;
			}
		})
		.await
		.unwrap();
	}

	#[tokio::test]
	async fn disconnect_revokes_camera_and_closes() {
		let (session, controller) = connected_session().await;

		session.disconnect().await;

		let sent = controller.try_sent();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].event, "cameradisc");
		assert!(controller.is_closed());
		assert_eq!(session.state(), SessionState::Disconnected);

		session.disconnect().await;
		assert!(controller.try_sent().is_empty());
	}

	#[tokio::test]
	async fn disconnect_fails_pending_sends() {
		let (session, controller) = connected_session().await;

		let send = tokio::spawn({
			let session = Arc::clone(&session);
			async move { session.send_frame("data:image/png;base64,AA").await }
		});
		controller.next_sent().await.unwrap();

		session.disconnect().await;
		assert!(matches!(send.await.unwrap(), Err(Error::ChannelClosed)));
	}

	#[tokio::test]
	async fn remote_close_returns_to_disconnected() {
		let (session, controller) = connected_session().await;

		let send = tokio::spawn({
			let session = Arc::clone(&session);
			async move { session.send_message("hello").await }
		});
		controller.next_sent().await.unwrap();
		controller.close_remote();

		assert!(matches!(send.await.unwrap(), Err(Error::ChannelClosed)));
		tokio::time::timeout(Duration::from_secs(1), async {
			while session.is_connected() {
				tokio::task::yield_now().await;
			}
		})
		.await
		.unwrap();
	}

	#[tokio::test]
	async fn reconnect_after_disconnect_uses_a_fresh_connection() {
		let dialer = Arc::new(FakeDialer::new());
		let first = dialer.queue();
		let second = dialer.queue();
		let session = Arc::new(Session::with_dialer("ws://fake/ws", dialer));

		session.connect().await.unwrap();
		session.disconnect().await;
		session.connect().await.unwrap();

		let send = tokio::spawn({
			let session = Arc::clone(&session);
			async move { session.send_frame("data:image/png;base64,BB").await }
		});
		let request = second.next_event("frame").await.unwrap();
		assert_eq!(request.id, 0);
		second.reply_to(&request, "B");

		assert_eq!(send.await.unwrap().unwrap(), "B");
		assert!(first.is_closed());
	}
}
