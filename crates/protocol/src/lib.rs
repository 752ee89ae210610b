//! Wire types for the signlink event channel.
//!
//! This crate contains the serde-serializable envelopes exchanged with the
//! recognition service over the duplex socket, plus the sentinel texts the
//! service embeds in otherwise free-text replies.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and reply classification
//! * 1:1 with the wire: event names and payload keys match what the service emits
//! * Stable: Changes only when the wire protocol changes
//!
//! Connection handling and request correlation live in `signlink-runtime`.

pub mod envelope;
pub mod sentinel;

pub use envelope::*;
pub use sentinel::*;
