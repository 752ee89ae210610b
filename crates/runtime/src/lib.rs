//! Session layer for signlink.
//!
//! One long-lived duplex connection carries two independent
//! request/reply flows (frame uploads and chat messages) plus the camera
//! control signals. Each request gets a correlation id which the service
//! echoes, so concurrent requests of the same kind never swap replies.

pub mod connection;
pub mod error;
pub mod fake_transport;
pub mod session;
pub mod transport;

pub use connection::{Connection, PendingReply};
pub use error::{Error, Result};
pub use session::{Session, SessionState};
pub use transport::{Dialer, Transport, TransportParts, TransportReceiver, WebSocketDialer, WebSocketTransport};
