//! Request/reply correlation on top of a transport.
//!
//! Every outgoing event gets a fresh id and a slot in the pending table.
//! The dispatch loop reads replies from the transport and completes the slot
//! whose id the reply echoes.
//!
//! # Message Flow
//!
//! 1. Caller calls [`Connection::send`] with a [`ClientEvent`]
//! 2. Connection assigns an id and stores a oneshot sender under it
//! 3. The envelope is serialized and written via the transport
//! 4. Caller awaits [`PendingReply::recv`]
//! 5. [`Connection::run`] receives the reply and looks up its id
//! 6. The slot is removed and the reply text sent through the oneshot
//!
//! A reply for an id nobody waits for any more (the caller timed out and
//! dropped its [`PendingReply`]) is logged and ignored. Replies on the wrong
//! channel for their id are protocol errors and are not delivered.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use signlink_protocol::{ClientEvent, Reply, ReplyChannel, Request};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

type Slots = Arc<Mutex<HashMap<u32, Slot>>>;

struct Slot {
	channel: ReplyChannel,
	tx: oneshot::Sender<Result<String>>,
}

/// One outstanding expectation of exactly one reply.
///
/// Dropping it before the reply arrives removes its slot, so a late reply is
/// ignored instead of being delivered to a later request.
pub struct PendingReply {
	id: u32,
	rx: oneshot::Receiver<Result<String>>,
	slots: Slots,
}

impl PendingReply {
	pub fn id(&self) -> u32 {
		self.id
	}

	/// Waits for the reply text.
	///
	/// Never resolves if the service never answers and the connection stays
	/// open.
	pub async fn recv(mut self) -> Result<String> {
		(&mut self.rx).await.map_err(|_| Error::ChannelClosed).and_then(|result| result)
	}
}

impl Drop for PendingReply {
	fn drop(&mut self) {
		self.slots.lock().remove(&self.id);
	}
}

/// Correlating connection over one transport.
pub struct Connection {
	/// Sequential request id counter
	last_id: AtomicU32,
	/// Pending reply slots keyed by request id
	slots: Slots,
	/// Write half; emits are serialized through this lock
	sender: AsyncMutex<Box<dyn Transport>>,
	/// Read half and its channel, taken by `run`
	inbound: Mutex<Option<(Box<dyn TransportReceiver>, mpsc::UnboundedReceiver<Value>)>>,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		Self {
			last_id: AtomicU32::new(0),
			slots: Arc::new(Mutex::new(HashMap::new())),
			sender: AsyncMutex::new(parts.sender),
			inbound: Mutex::new(Some((parts.receiver, parts.message_rx))),
		}
	}

	pub fn next_id(&self) -> u32 {
		self.last_id.fetch_add(1, Ordering::SeqCst)
	}

	/// Number of requests still waiting for a reply.
	pub fn pending_count(&self) -> usize {
		self.slots.lock().len()
	}

	/// Emits `event` and returns the handle its reply will arrive on.
	pub async fn send(&self, event: ClientEvent) -> Result<PendingReply> {
		let id = self.next_id();
		let (tx, rx) = oneshot::channel();
		self.slots.lock().insert(
			id,
			Slot {
				channel: event.reply_channel(),
				tx,
			},
		);
		let pending = PendingReply {
			id,
			rx,
			slots: Arc::clone(&self.slots),
		};

		debug!(target = "signlink.session", id, event = event.name(), "emit");
		self.emit(event.into_request(id)).await?;
		Ok(pending)
	}

	/// Emits `event` and waits for its reply.
	pub async fn request(&self, event: ClientEvent) -> Result<String> {
		self.send(event).await?.recv().await
	}

	/// Writes an envelope without registering a reply slot.
	pub async fn emit(&self, request: Request) -> Result<()> {
		let value = serde_json::to_value(&request)?;
		self.sender.lock().await.send(value).await
	}

	pub async fn close(&self) -> Result<()> {
		self.sender.lock().await.close().await
	}

	/// Fails every pending reply with [`Error::ChannelClosed`].
	///
	/// Returns how many requests were abandoned.
	pub fn abandon_all(&self) -> usize {
		let drained: Vec<Slot> = self.slots.lock().drain().map(|(_, slot)| slot).collect();
		let count = drained.len();
		for slot in drained {
			let _ = slot.tx.send(Err(Error::ChannelClosed));
		}
		count
	}

	/// Runs the read loop until the transport closes.
	///
	/// Spawn this once per connection. Every reply still pending when the
	/// loop ends is abandoned.
	pub async fn run(&self) {
		let Some((receiver, mut message_rx)) = self.inbound.lock().take() else {
			warn!(target = "signlink.session", "connection read loop already started");
			return;
		};

		let transport_handle = tokio::spawn(receiver.run());

		while let Some(value) = message_rx.recv().await {
			match serde_json::from_value::<Reply>(value.clone()) {
				Ok(reply) => {
					if let Err(e) = self.dispatch(reply) {
						warn!(target = "signlink.session", error = %e, "dropping reply");
					}
				}
				Err(e) => {
					error!(target = "signlink.session", error = %e, message = %value, "failed to parse reply");
				}
			}
		}

		match transport_handle.await {
			Ok(Ok(())) => debug!(target = "signlink.session", "transport closed"),
			Ok(Err(e)) => warn!(target = "signlink.session", error = %e, "transport failed"),
			Err(e) => debug!(target = "signlink.session", error = %e, "transport task ended"),
		}

		let abandoned = self.abandon_all();
		if abandoned > 0 {
			debug!(target = "signlink.session", abandoned, "abandoned pending replies");
		}
	}

	/// Routes one reply to its waiting request.
	fn dispatch(&self, reply: Reply) -> Result<()> {
		let Some(id) = reply.id else {
			info!(
				target = "signlink.session",
				event = %reply.event,
				message = reply.message().unwrap_or_default(),
				"server notice"
			);
			return Ok(());
		};

		let slot = match self.slots.lock().entry(id) {
			Entry::Vacant(_) => {
				debug!(target = "signlink.session", id, event = %reply.event, "reply for a request nobody waits on");
				return Ok(());
			}
			Entry::Occupied(entry) => {
				if reply.channel() != Some(entry.get().channel) {
					return Err(Error::Protocol(format!(
						"reply for id={id} arrived on {}, expected {}",
						reply.event,
						entry.get().channel
					)));
				}
				entry.remove()
			}
		};

		let result = reply
			.message()
			.map(str::to_owned)
			.ok_or_else(|| Error::Protocol(format!("reply for id={id} has no message text")));

		// Receiver may already be gone; that is the caller's business.
		let _ = slot.tx.send(result);
		Ok(())
	}
}
