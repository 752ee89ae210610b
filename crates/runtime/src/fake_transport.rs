//! In-memory transport for testing correlation and session behavior.
//!
//! Stands in for the recognition service: tests inspect what the client
//! emitted and inject replies, notices or a remote close.
//!
//! # Example
//!
//! ```ignore
//! let dialer = Arc::new(FakeDialer::new());
//! let controller = dialer.queue();
//! let session = Session::with_dialer("ws://fake", dialer);
//! session.connect().await?;
//!
//! let fut = session.send_frame("data:image/png;base64,AAAA");
//! let request = controller.next_sent().await.unwrap();
//! controller.reply_to(&request, "A");
//! assert_eq!(fut.await?, "A");
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use signlink_protocol::{MESSAGE_EVENT, Reply, ReplyChannel, Request};
use tokio::sync::{Notify, mpsc};

use crate::error::{Error, Result};
use crate::transport::{BoxFuture, Dialer, Transport, TransportParts, TransportReceiver};

/// Builder for fake transport instances.
#[derive(Default)]
pub struct FakeTransportBuilder {}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self {}
	}

	/// Builds the transport parts and the controller that drives them.
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let outbox = Arc::new(Outbox::default());

		let sender = FakeTransportSender { outbox: Arc::clone(&outbox) };
		let receiver = FakeTransportReceiver { inbound_rx, message_tx };

		let controller = FakeTransportController {
			inbound_tx: Mutex::new(Some(inbound_tx)),
			outbox,
		};

		let parts = TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		};

		(parts, controller)
	}
}

#[derive(Default)]
struct Outbox {
	sent: Mutex<VecDeque<Value>>,
	notify: Notify,
	closed: AtomicBool,
}

/// Server side of a fake transport.
pub struct FakeTransportController {
	inbound_tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
	outbox: Arc<Outbox>,
}

impl FakeTransportController {
	/// Injects a raw JSON value as if the service sent it.
	pub fn inject(&self, message: Value) {
		if let Some(tx) = self.inbound_tx.lock().as_ref() {
			let _ = tx.send(message);
		}
	}

	pub fn inject_reply(&self, channel: ReplyChannel, id: u32, message: &str) {
		self.inject_envelope(&Reply::new(channel, Some(id), message));
	}

	/// Injects an unsolicited event without an id.
	pub fn inject_notice(&self, message: &str) {
		self.inject_envelope(&Reply::new(ReplyChannel::Response, None, message));
	}

	/// Answers `request` on the channel the service would use for it.
	pub fn reply_to(&self, request: &Request, message: &str) {
		let channel = if request.event == MESSAGE_EVENT {
			ReplyChannel::ChatResponse
		} else {
			ReplyChannel::Response
		};
		self.inject_reply(channel, request.id, message);
	}

	fn inject_envelope(&self, reply: &Reply) {
		if let Ok(value) = serde_json::to_value(reply) {
			self.inject(value);
		}
	}

	/// Drops the inbound side, as if the service closed the connection.
	pub fn close_remote(&self) {
		self.inbound_tx.lock().take();
	}

	/// Takes every request emitted so far.
	pub fn try_sent(&self) -> Vec<Request> {
		self.outbox
			.sent
			.lock()
			.drain(..)
			.filter_map(|value| serde_json::from_value(value).ok())
			.collect()
	}

	/// Waits for the next emitted request.
	pub async fn next_sent(&self) -> Option<Request> {
		loop {
			let notified = self.outbox.notify.notified();
			if let Some(value) = self.outbox.sent.lock().pop_front() {
				return serde_json::from_value(value).ok();
			}
			notified.await;
		}
	}

	/// Waits for the next emitted request named `event`, skipping others.
	pub async fn next_event(&self, event: &str) -> Option<Request> {
		loop {
			let request = self.next_sent().await?;
			if request.event == event {
				return Some(request);
			}
		}
	}

	/// Whether the client closed its write half.
	pub fn is_closed(&self) -> bool {
		self.outbox.closed.load(Ordering::SeqCst)
	}
}

struct FakeTransportSender {
	outbox: Arc<Outbox>,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			if self.outbox.closed.load(Ordering::SeqCst) {
				return Err(Error::Transport("fake transport closed".to_string()));
			}
			self.outbox.sent.lock().push_back(message);
			self.outbox.notify.notify_waiters();
			Ok(())
		})
	}

	fn close(&mut self) -> BoxFuture<'_, Result<()>> {
		self.outbox.closed.store(true, Ordering::SeqCst);
		Box::pin(async { Ok(()) })
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<Value>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			while let Some(message) = self.inbound_rx.recv().await {
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}

/// Dialer handing out queued fake transports in order.
#[derive(Default)]
pub struct FakeDialer {
	queued: Mutex<VecDeque<TransportParts>>,
	dials: AtomicUsize,
}

impl FakeDialer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Queues one connection and returns its controller.
	pub fn queue(&self) -> FakeTransportController {
		let (parts, controller) = FakeTransportBuilder::new().build();
		self.queued.lock().push_back(parts);
		controller
	}

	/// Number of dial attempts so far, including failed ones.
	pub fn dial_count(&self) -> usize {
		self.dials.load(Ordering::SeqCst)
	}
}

impl Dialer for FakeDialer {
	fn dial<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<TransportParts>> {
		self.dials.fetch_add(1, Ordering::SeqCst);
		let parts = self.queued.lock().pop_front();
		Box::pin(async move { parts.ok_or_else(|| Error::Transport(format!("no fake connection queued for {endpoint}"))) })
	}
}

#[cfg(test)]
mod tests {
	use signlink_protocol::ClientEvent;

	use super::*;
	use crate::connection::Connection;

	#[tokio::test]
	async fn test_fake_transport_send_capture() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Arc::new(Connection::new(parts));

		let conn_clone = Arc::clone(&connection);
		tokio::spawn(async move {
			conn_clone.run().await;
		});

		let pending = connection.send(ClientEvent::Message { message: "What is used for backend?".into() }).await.unwrap();

		let sent = controller.next_sent().await.unwrap();
		assert_eq!(sent.event, "message");
		assert_eq!(sent.id, 0);
		assert_eq!(sent.data.as_ref().unwrap()["message"], "What is used for backend?");

		controller.reply_to(&sent, "Flask");
		assert_eq!(pending.recv().await.unwrap(), "Flask");
	}

	#[tokio::test]
	async fn test_fake_transport_multiple_requests_correlation() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Arc::new(Connection::new(parts));

		let conn_clone = Arc::clone(&connection);
		tokio::spawn(async move {
			conn_clone.run().await;
		});

		let conn1 = Arc::clone(&connection);
		let conn2 = Arc::clone(&connection);
		let fut1 = tokio::spawn(async move { conn1.request(ClientEvent::Frame { data: "first".into() }).await });
		let fut2 = tokio::spawn(async move { conn2.request(ClientEvent::Frame { data: "second".into() }).await });

		let a = controller.next_sent().await.unwrap();
		let b = controller.next_sent().await.unwrap();

		// Respond in reverse order; each future must still get its own reply.
		controller.reply_to(&b, &format!("label for {}", b.data.as_ref().unwrap()["data"]));
		controller.reply_to(&a, &format!("label for {}", a.data.as_ref().unwrap()["data"]));

		assert_eq!(fut1.await.unwrap().unwrap(), "label for \"first\"");
		assert_eq!(fut2.await.unwrap().unwrap(), "label for \"second\"");
	}

	#[tokio::test]
	async fn test_unsolicited_notice_leaves_pending_requests_alone() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Arc::new(Connection::new(parts));

		let conn_clone = Arc::clone(&connection);
		tokio::spawn(async move {
			conn_clone.run().await;
		});

		let pending = connection.send(ClientEvent::Frame { data: "frame".into() }).await.unwrap();
		let sent = controller.next_sent().await.unwrap();

		controller.inject_notice(signlink_protocol::NOW_ACTIVE_SOCKET);
		controller.reply_to(&sent, "A");

		assert_eq!(pending.recv().await.unwrap(), "A");
		assert_eq!(connection.pending_count(), 0);
	}

	#[tokio::test]
	async fn test_fake_dialer_hands_out_queued_connections() {
		let dialer = FakeDialer::new();
		let _controller = dialer.queue();

		assert!(dialer.dial("ws://fake").await.is_ok());
		let err = dialer.dial("ws://fake").await.err().unwrap();
		assert!(err.to_string().contains("no fake connection queued"));
		assert_eq!(dialer.dial_count(), 2);
	}

	#[tokio::test]
	async fn test_closed_sender_rejects_writes() {
		let (mut parts, controller) = FakeTransportBuilder::new().build();
		parts.sender.close().await.unwrap();

		assert!(controller.is_closed());
		assert!(parts.sender.send(serde_json::json!({})).await.is_err());
	}
}
