//! Event envelopes carried as JSON text frames.
//!
//! Every event travels in the same envelope:
//! ```json
//! { "event": "frame", "id": 7, "data": { "data": "data:image/png;base64,..." } }
//! ```
//!
//! The client assigns `id`; the service echoes it in the reply so each reply
//! can be matched with the request that caused it. Events the service pushes
//! on its own omit `id`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Event name of a camera frame upload.
pub const FRAME_EVENT: &str = "frame";
/// Event name of a chat message.
pub const MESSAGE_EVENT: &str = "message";
/// Event name announcing this client wants the camera slot.
pub const CAMERA_CONNECT_EVENT: &str = "cameracon";
/// Event name releasing the camera slot.
pub const CAMERA_DISCONNECT_EVENT: &str = "cameradisc";

/// Server channel a reply arrives on.
///
/// Frame uploads and camera control signals are answered on `response`,
/// chat messages on `chatResponse`. Keeping the two apart means a chat
/// answer can never be mistaken for a frame label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyChannel {
	Response,
	ChatResponse,
}

impl ReplyChannel {
	pub fn event_name(self) -> &'static str {
		match self {
			ReplyChannel::Response => "response",
			ReplyChannel::ChatResponse => "chatResponse",
		}
	}

	pub fn from_event_name(name: &str) -> Option<Self> {
		match name {
			"response" => Some(ReplyChannel::Response),
			"chatResponse" => Some(ReplyChannel::ChatResponse),
			_ => None,
		}
	}
}

impl std::fmt::Display for ReplyChannel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.event_name())
	}
}

/// Typed client-to-server event before it is given an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
	/// Encoded camera frame (a `data:image/png;base64,` URL).
	Frame { data: String },
	/// Chat text submitted by the user.
	Message { message: String },
	/// Ask for the single active camera slot.
	CameraConnect,
	/// Give the camera slot back.
	CameraDisconnect,
}

impl ClientEvent {
	pub fn name(&self) -> &'static str {
		match self {
			ClientEvent::Frame { .. } => FRAME_EVENT,
			ClientEvent::Message { .. } => MESSAGE_EVENT,
			ClientEvent::CameraConnect => CAMERA_CONNECT_EVENT,
			ClientEvent::CameraDisconnect => CAMERA_DISCONNECT_EVENT,
		}
	}

	/// Channel the service answers this event on.
	pub fn reply_channel(&self) -> ReplyChannel {
		match self {
			ClientEvent::Message { .. } => ReplyChannel::ChatResponse,
			_ => ReplyChannel::Response,
		}
	}

	/// Wraps the event in a wire envelope carrying `id`.
	pub fn into_request(self, id: u32) -> Request {
		let event = self.name().to_string();
		let data = match self {
			ClientEvent::Frame { data } => Some(json!({ "data": data })),
			ClientEvent::Message { message } => Some(json!({ "message": message })),
			ClientEvent::CameraConnect | ClientEvent::CameraDisconnect => None,
		};
		Request { event, id, data }
	}
}

/// Client-to-server envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	/// Event name (`frame`, `message`, `cameracon`, `cameradisc`)
	pub event: String,
	/// Correlation id echoed by the service in its reply
	pub id: u32,
	/// Event payload, absent for control signals
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

/// Server-to-client envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
	/// Event name (`response`, `chatResponse`, or anything the service pushes)
	pub event: String,
	/// Echoed correlation id; `None` for unsolicited events
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

impl Reply {
	/// Builds a reply envelope with a `{"message": ...}` payload.
	pub fn new(channel: ReplyChannel, id: Option<u32>, message: impl Into<String>) -> Self {
		Self {
			event: channel.event_name().to_string(),
			id,
			data: Some(json!({ "message": message.into() })),
		}
	}

	pub fn channel(&self) -> Option<ReplyChannel> {
		ReplyChannel::from_event_name(&self.event)
	}

	/// Reply text from the `message` payload key.
	pub fn message(&self) -> Option<&str> {
		self.data.as_ref()?.get("message")?.as_str()
	}
}
