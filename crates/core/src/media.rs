//! Camera access and frame encoding.
//!
//! [`MediaDevices`] opens a camera and hands back a [`VideoSource`]. The
//! capture loop waits for the source's metadata, sizes a [`DrawingSurface`]
//! to match, then on every tick draws the current frame and encodes the
//! surface as a data URL.
//!
//! [`StillImageCamera`] is a camera backed by pre-encoded PNG frames. It
//! cycles through them in order and is what the command-line front-end and
//! the tests use.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use signlink_runtime::transport::BoxFuture;

use crate::error::{Error, Result};

/// MIME type of every frame sent to the service.
pub const PNG_MIME: &str = "image/png";
/// Data URL of a surface with nothing drawn on it.
pub const EMPTY_DATA_URL: &str = "data:,";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
	pub width: u32,
	pub height: u32,
}

impl Dimensions {
	pub fn new(width: u32, height: u32) -> Self {
		Self { width, height }
	}

	pub fn is_empty(&self) -> bool {
		self.width == 0 || self.height == 0
	}
}

impl fmt::Display for Dimensions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}x{}", self.width, self.height)
	}
}

/// One encoded frame as delivered by a video source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
	pub dimensions: Dimensions,
	pub mime: String,
	pub bytes: Vec<u8>,
}

impl VideoFrame {
	pub fn png(dimensions: Dimensions, bytes: Vec<u8>) -> Self {
		Self {
			dimensions,
			mime: PNG_MIME.to_string(),
			bytes,
		}
	}
}

/// Opens camera streams.
pub trait MediaDevices: Send + Sync {
	fn open_camera(&self) -> BoxFuture<'_, Result<Box<dyn VideoSource>>>;
}

/// A live camera stream.
pub trait VideoSource: Send {
	/// Resolves once the stream reports usable dimensions.
	fn loaded_metadata(&mut self) -> BoxFuture<'_, Result<Dimensions>>;

	/// The frame currently showing.
	fn grab_frame(&mut self) -> Result<VideoFrame>;

	/// Stops every track of the stream. Stopping twice is allowed.
	fn stop_tracks(&mut self);
}

/// Off-screen surface a frame is drawn onto before encoding.
#[derive(Debug, Default)]
pub struct DrawingSurface {
	dimensions: Option<Dimensions>,
	frame: Option<VideoFrame>,
}

impl DrawingSurface {
	pub fn new() -> Self {
		Self::default()
	}

	/// Resizes the surface, clearing what was drawn.
	pub fn resize(&mut self, dimensions: Dimensions) {
		self.dimensions = Some(dimensions);
		self.frame = None;
	}

	pub fn dimensions(&self) -> Option<Dimensions> {
		self.dimensions
	}

	/// Draws `frame` over the whole surface, replacing what was there.
	///
	/// The encoded frame is kept as is; the surface keeps its own dimensions.
	pub fn draw(&mut self, frame: &VideoFrame) {
		self.frame = Some(frame.clone());
	}

	/// Encodes the surface as a `data:` URL.
	///
	/// An unsized, zero-sized or blank surface encodes as [`EMPTY_DATA_URL`].
	pub fn to_data_url(&self) -> String {
		match (self.dimensions, &self.frame) {
			(Some(dimensions), Some(frame)) if !dimensions.is_empty() && !frame.bytes.is_empty() => {
				format!("data:{};base64,{}", frame.mime, STANDARD.encode(&frame.bytes))
			}
			_ => EMPTY_DATA_URL.to_string(),
		}
	}
}

/// Camera that plays back a fixed list of frames in a loop.
#[derive(Debug, Clone)]
pub struct StillImageCamera {
	frames: Arc<Vec<VideoFrame>>,
	stopped: Arc<AtomicBool>,
}

impl StillImageCamera {
	pub fn new(frames: Vec<VideoFrame>) -> Self {
		Self {
			frames: Arc::new(frames),
			stopped: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn frame_count(&self) -> usize {
		self.frames.len()
	}

	/// Whether the last opened stream had its tracks stopped.
	pub fn tracks_stopped(&self) -> bool {
		self.stopped.load(Ordering::SeqCst)
	}
}

impl MediaDevices for StillImageCamera {
	fn open_camera(&self) -> BoxFuture<'_, Result<Box<dyn VideoSource>>> {
		Box::pin(async move {
			if self.frames.is_empty() {
				return Err(Error::MediaUnavailable("no frames to play back".to_string()));
			}
			self.stopped.store(false, Ordering::SeqCst);
			let source: Box<dyn VideoSource> = Box::new(StillImageSource {
				frames: Arc::clone(&self.frames),
				stopped: Arc::clone(&self.stopped),
				cursor: 0,
			});
			Ok(source)
		})
	}
}

struct StillImageSource {
	frames: Arc<Vec<VideoFrame>>,
	stopped: Arc<AtomicBool>,
	cursor: usize,
}

impl VideoSource for StillImageSource {
	fn loaded_metadata(&mut self) -> BoxFuture<'_, Result<Dimensions>> {
		let dimensions = self.frames.first().map(|frame| frame.dimensions);
		Box::pin(async move { dimensions.ok_or_else(|| Error::MediaUnavailable("stream has no frames".to_string())) })
	}

	fn grab_frame(&mut self) -> Result<VideoFrame> {
		if self.stopped.load(Ordering::SeqCst) {
			return Err(Error::MediaUnavailable("tracks stopped".to_string()));
		}
		let frame = self.frames[self.cursor % self.frames.len()].clone();
		self.cursor = (self.cursor + 1) % self.frames.len();
		Ok(frame)
	}

	fn stop_tracks(&mut self) {
		self.stopped.store(true, Ordering::SeqCst);
	}
}
