//! Transport layer: moves JSON envelopes over the duplex socket.
//!
//! A transport is split in two halves so the read loop can run in its own
//! task while requests are written from any caller:
//!
//! - [`Transport`] writes one JSON value per call.
//! - [`TransportReceiver`] reads until the peer closes and forwards every
//!   parsed value into the `message_rx` channel of [`TransportParts`].
//!
//! [`Dialer`] opens a fresh transport for an endpoint. [`WebSocketDialer`]
//! is the production implementation; tests use
//! [`FakeDialer`](crate::fake_transport::FakeDialer).

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Write half of a transport.
pub trait Transport: Send {
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>>;

	/// Closes the write half. Closing twice is allowed.
	fn close(&mut self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

/// Read half of a transport.
pub trait TransportReceiver: Send {
	/// Reads until the peer closes, forwarding parsed values.
	///
	/// Returning (with or without error) drops the forwarding sender, which
	/// ends the connection's dispatch loop.
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Both halves of an open transport plus the channel the read half feeds.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Opens transports for an endpoint.
pub trait Dialer: Send + Sync {
	fn dial<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<TransportParts>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport carrying one JSON envelope per text frame.
pub struct WebSocketTransport {
	sink: SplitSink<WsStream, Message>,
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl WebSocketTransport {
	/// Performs the WebSocket handshake with `url` (`ws://` or `wss://`).
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Value>)> {
		let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
		let (sink, stream) = ws.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		Ok((Self { sink, stream, message_tx }, message_rx))
	}

	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		TransportParts {
			sender: Box::new(WebSocketSender { sink: self.sink }),
			receiver: Box::new(WebSocketReceiver {
				stream: self.stream,
				message_tx: self.message_tx,
			}),
			message_rx,
		}
	}
}

struct WebSocketSender {
	sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketSender {
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink.send(Message::Text(text)).await?;
			Ok(())
		})
	}

	fn close(&mut self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			match self.sink.close().await {
				Ok(()) => Ok(()),
				Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
				Err(err) => Err(err.into()),
			}
		})
	}
}

struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl WebSocketReceiver {
	fn forward(&self, payload: &[u8]) -> bool {
		match serde_json::from_slice::<Value>(payload) {
			Ok(value) => self.message_tx.send(value).is_ok(),
			Err(err) => {
				warn!(target = "signlink.session", error = %err, "dropping unparseable frame");
				true
			}
		}
	}
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				let keep_going = match frame? {
					Message::Text(text) => self.forward(text.as_bytes()),
					Message::Binary(bytes) => self.forward(&bytes),
					Message::Close(frame) => {
						debug!(target = "signlink.session", ?frame, "peer sent close");
						false
					}
					_ => true,
				};
				if !keep_going {
					break;
				}
			}
			Ok(())
		})
	}
}

/// Dials WebSocket endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketDialer;

impl Dialer for WebSocketDialer {
	fn dial<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<TransportParts>> {
		Box::pin(async move {
			let (transport, message_rx) = WebSocketTransport::connect(endpoint).await?;
			Ok(transport.into_transport_parts(message_rx))
		})
	}
}
