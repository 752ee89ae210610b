//! Sentinel texts embedded in reply messages.
//!
//! The service signals control conditions through fixed strings in the same
//! `message` field that carries recognition labels and chat answers. These
//! strings must match the service byte for byte.

/// Frame reply sent to every client that does not hold the camera slot.
pub const NOT_ACTIVE_SOCKET: &str = "Please wait, you are not the active socket";
/// Frame reply when the recognized label repeats the previous one.
pub const ALREADY_IN_LIST: &str = "Already in list";
/// Any frame reply containing this marker is a processing failure.
pub const FRAME_FAILURE_MARKER: &str = "Failed";
/// Any chat reply containing this marker is a failure to answer.
pub const CHAT_FAILURE_MARKER: &str = "Failed to receive a response:";
/// Camera acknowledgement for the client that now holds the slot.
pub const NOW_ACTIVE_SOCKET: &str = "You are now the active socket";
/// Camera acknowledgement for a client put in the waiting queue.
pub const QUEUED_SOCKET: &str = "You are in the queue, waiting for your turn";

/// What a frame reply means for the camera view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameVerdict {
	/// Another client holds the camera slot.
	Throttled,
	/// Same label as last time; the service decides duplication.
	Duplicate,
	/// The service could not process the frame.
	Failed,
	/// A newly recognized label to show.
	Label(String),
}

/// Classifies a frame reply.
///
/// The throttle sentinel is an exact match, the failure marker a substring
/// match.
pub fn classify_frame_reply(reply: &str) -> FrameVerdict {
	if reply == NOT_ACTIVE_SOCKET {
		FrameVerdict::Throttled
	} else if reply == ALREADY_IN_LIST {
		FrameVerdict::Duplicate
	} else if reply.contains(FRAME_FAILURE_MARKER) {
		FrameVerdict::Failed
	} else {
		FrameVerdict::Label(reply.to_string())
	}
}

/// Returns `true` when a chat reply is a failure notice rather than an answer.
pub fn is_chat_failure(reply: &str) -> bool {
	reply.contains(CHAT_FAILURE_MARKER)
}

/// Acknowledgement of a camera control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraAck {
	Active,
	Queued,
	Other,
}

pub fn classify_camera_ack(reply: &str) -> CameraAck {
	match reply {
		NOW_ACTIVE_SOCKET => CameraAck::Active,
		QUEUED_SOCKET => CameraAck::Queued,
		_ => CameraAck::Other,
	}
}
