//! Error types for the session layer.

use thiserror::Error;

/// Result alias used throughout `signlink-runtime`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// A send was attempted while no connection is open.
	#[error("session is not connected")]
	NotConnected,

	/// The connection went away before the reply arrived.
	#[error("connection closed before a reply arrived")]
	ChannelClosed,

	#[error("transport error: {0}")]
	Transport(String),

	#[error("websocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("serialization error: {0}")]
	Serde(#[from] serde_json::Error),

	/// The service sent something the client cannot match or read.
	#[error("protocol error: {0}")]
	Protocol(String),
}

