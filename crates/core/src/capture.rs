//! Periodic frame capture for the camera view.
//!
//! A [`FrameCaptureLoop`] acquires a camera, then every interval draws the
//! current frame, encodes it as a PNG data URL and sends it through the
//! shared [`Session`]. Sends are spawned, so a slow reply never delays the
//! next tick; each reply updates the [`CaptureView`] published to observers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use signlink_protocol::{FrameVerdict, classify_frame_reply};
use signlink_runtime::Session;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::media::{Dimensions, DrawingSurface, MediaDevices, VideoSource};

const PNG_DATA_URL_PREFIX: &str = "data:image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
	#[default]
	Idle,
	Acquiring,
	Capturing,
	Stopped,
}

impl fmt::Display for CaptureState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CaptureState::Idle => write!(f, "idle"),
			CaptureState::Acquiring => write!(f, "acquiring"),
			CaptureState::Capturing => write!(f, "capturing"),
			CaptureState::Stopped => write!(f, "stopped"),
		}
	}
}

/// What the camera view shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureView {
	/// Recognized labels, oldest first.
	pub items: Vec<String>,
	/// True while the latest frame reply said another client holds the camera.
	pub throttled: bool,
}

impl CaptureView {
	fn apply(&mut self, verdict: FrameVerdict) {
		match verdict {
			FrameVerdict::Throttled => self.throttled = true,
			FrameVerdict::Duplicate | FrameVerdict::Failed => self.throttled = false,
			FrameVerdict::Label(label) => {
				self.throttled = false;
				self.items.push(label);
			}
		}
	}
}

#[derive(Default)]
struct Inner {
	state: CaptureState,
	source: Option<Box<dyn VideoSource>>,
	timer: Option<JoinHandle<()>>,
}

impl Inner {
	/// Stops the timer and the camera. Returns the state before stopping.
	fn halt(&mut self) -> CaptureState {
		if let Some(timer) = self.timer.take() {
			timer.abort();
		}
		if let Some(mut source) = self.source.take() {
			source.stop_tracks();
		}
		std::mem::replace(&mut self.state, CaptureState::Stopped)
	}
}

struct Shared {
	inner: Mutex<Inner>,
	view: watch::Sender<CaptureView>,
}

/// Camera view driver: acquisition, periodic capture and teardown.
pub struct FrameCaptureLoop {
	session: Arc<Session>,
	interval: Duration,
	shared: Arc<Shared>,
}

impl FrameCaptureLoop {
	pub fn new(session: Arc<Session>, interval: Duration) -> Self {
		let (view, _) = watch::channel(CaptureView::default());
		Self {
			session,
			interval,
			shared: Arc::new(Shared {
				inner: Mutex::new(Inner::default()),
				view,
			}),
		}
	}

	pub fn state(&self) -> CaptureState {
		self.shared.inner.lock().state
	}

	/// Snapshot of the current view.
	pub fn view(&self) -> CaptureView {
		self.shared.view.borrow().clone()
	}

	pub fn observe(&self) -> watch::Receiver<CaptureView> {
		self.shared.view.subscribe()
	}

	/// Acquires a camera from `devices` and starts the capture timer.
	///
	/// Returns `false` when capture did not start: the camera could not be
	/// acquired (logged, state back to `Idle`), the interval is zero, the
	/// loop was not idle, or it was torn down while acquiring.
	pub async fn start(&self, devices: &dyn MediaDevices) -> bool {
		{
			let mut inner = self.shared.inner.lock();
			if inner.state != CaptureState::Idle {
				warn!(target = "signlink.capture", state = %inner.state, "start called on a loop that is not idle");
				return false;
			}
			if self.interval.is_zero() {
				error!(target = "signlink.capture", "capture interval must be non-zero");
				return false;
			}
			inner.state = CaptureState::Acquiring;
		}

		let mut source = match devices.open_camera().await {
			Ok(source) => source,
			Err(err) => {
				error!(target = "signlink.capture", error = %err, "error accessing camera");
				self.abandon_acquisition();
				return false;
			}
		};

		let dimensions = match source.loaded_metadata().await {
			Ok(dimensions) if !dimensions.is_empty() => dimensions,
			Ok(dimensions) => {
				error!(target = "signlink.capture", %dimensions, "camera reported no usable dimensions");
				source.stop_tracks();
				self.abandon_acquisition();
				return false;
			}
			Err(err) => {
				error!(target = "signlink.capture", error = %err, "camera metadata never loaded");
				source.stop_tracks();
				self.abandon_acquisition();
				return false;
			}
		};

		let mut inner = self.shared.inner.lock();
		if inner.state != CaptureState::Acquiring {
			debug!(target = "signlink.capture", state = %inner.state, "torn down while acquiring; releasing camera");
			source.stop_tracks();
			return false;
		}

		inner.source = Some(source);
		inner.state = CaptureState::Capturing;
		inner.timer = Some(tokio::spawn(run_timer(
			Arc::clone(&self.shared),
			Arc::clone(&self.session),
			self.interval,
			dimensions,
		)));

		info!(target = "signlink.capture", %dimensions, interval_ms = self.interval.as_millis() as u64, "capture started");
		true
	}

	fn abandon_acquisition(&self) {
		let mut inner = self.shared.inner.lock();
		if inner.state == CaptureState::Acquiring {
			inner.state = CaptureState::Idle;
		}
	}

	/// Stops capture, releases the camera, revokes the camera slot and closes
	/// the session.
	///
	/// Safe to call at any point, any number of times. Only the first call
	/// signals the service.
	pub async fn teardown(&self) {
		let previous = self.shared.inner.lock().halt();
		if previous == CaptureState::Stopped {
			debug!(target = "signlink.capture", "capture already torn down");
			return;
		}

		self.session.revoke_camera().await;
		self.session.disconnect().await;
		info!(target = "signlink.capture", from = %previous, "capture torn down");
	}
}

impl Drop for FrameCaptureLoop {
	fn drop(&mut self) {
		self.shared.inner.lock().halt();
	}
}

impl fmt::Debug for FrameCaptureLoop {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FrameCaptureLoop")
			.field("state", &self.state())
			.field("interval", &self.interval)
			.finish()
	}
}

/// Timer task. Dropping it aborts every send still waiting for a reply.
async fn run_timer(shared: Arc<Shared>, session: Arc<Session>, period: Duration, dimensions: Dimensions) {
	let mut surface = DrawingSurface::new();
	surface.resize(dimensions);

	let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	let mut sends = JoinSet::new();

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				if let Some(payload) = capture_frame(&shared, &mut surface) {
					sends.spawn(send_frame(Arc::clone(&shared), Arc::clone(&session), payload));
				}
			}
			Some(_) = sends.join_next(), if !sends.is_empty() => {}
		}
	}
}

fn capture_frame(shared: &Shared, surface: &mut DrawingSurface) -> Option<String> {
	let frame = {
		let mut inner = shared.inner.lock();
		if inner.state != CaptureState::Capturing {
			return None;
		}
		inner.source.as_mut()?.grab_frame()
	};

	match frame {
		Ok(frame) => surface.draw(&frame),
		Err(err) => {
			debug!(target = "signlink.capture", error = %err, "no frame to capture");
			return None;
		}
	}

	let payload = surface.to_data_url();
	if !payload.starts_with(PNG_DATA_URL_PREFIX) {
		debug!(target = "signlink.capture", "surface did not encode as png; skipping tick");
		return None;
	}
	Some(payload)
}

async fn send_frame(shared: Arc<Shared>, session: Arc<Session>, payload: String) {
	let started = Instant::now();
	match session.send_frame(payload).await {
		Ok(reply) => {
			debug!(target = "signlink.capture", elapsed_ms = started.elapsed().as_millis() as u64, reply = %reply, "frame answered");
			let verdict = classify_frame_reply(&reply);
			shared.view.send_modify(|view| view.apply(verdict));
		}
		Err(err) => {
			debug!(target = "signlink.capture", error = %err, "frame not answered");
		}
	}
}
