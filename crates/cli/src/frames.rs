//! Still-image camera backed by a directory of PNG files.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use signlink::{Dimensions, StillImageCamera, VideoFrame};
use tracing::debug;

use crate::error::{CliError, Result};

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Reads width and height from the IHDR chunk of an encoded PNG.
pub fn png_dimensions(bytes: &[u8]) -> anyhow::Result<Dimensions> {
	if bytes.len() < 24 || &bytes[..8] != PNG_SIGNATURE {
		bail!("not a PNG file");
	}
	if &bytes[12..16] != b"IHDR" {
		bail!("PNG does not start with an IHDR chunk");
	}

	let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
	let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
	Ok(Dimensions::new(width, height))
}

/// Loads every `.png` file of `dir`, sorted by file name.
pub fn load_frames(dir: &Path) -> Result<Vec<VideoFrame>> {
	let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
		.with_context(|| format!("reading frames directory {}", dir.display()))?
		.filter_map(|entry| entry.ok().map(|entry| entry.path()))
		.filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")))
		.collect();
	paths.sort();

	let mut frames = Vec::with_capacity(paths.len());
	for path in paths {
		let bytes = std::fs::read(&path).with_context(|| format!("reading frame {}", path.display()))?;
		let dimensions = png_dimensions(&bytes).with_context(|| format!("decoding frame {}", path.display()))?;
		debug!(target = "signlink.cli", path = %path.display(), %dimensions, "loaded frame");
		frames.push(VideoFrame::png(dimensions, bytes));
	}

	if frames.is_empty() {
		return Err(CliError::NoFrames { path: dir.to_path_buf() });
	}
	Ok(frames)
}

pub fn still_camera(dir: &Path) -> Result<StillImageCamera> {
	Ok(StillImageCamera::new(load_frames(dir)?))
}
