//! Client configuration.
//!
//! Read from a JSON file with camelCase keys. Every field has a default, so
//! an empty object (or no file at all) is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:5000/ws";
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_CHAT_TIMEOUT_MS: u64 = 20_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
	/// WebSocket endpoint of the recognition service.
	pub endpoint: String,
	/// Period between two captured frames.
	#[serde(deserialize_with = "positive_millis")]
	pub capture_interval_ms: u64,
	/// How long a chat submission waits for its answer.
	#[serde(deserialize_with = "positive_millis")]
	pub chat_timeout_ms: u64,
}

fn positive_millis<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
	let millis = u64::deserialize(deserializer)?;
	if millis == 0 {
		return Err(serde::de::Error::custom("durations must be at least 1 ms"));
	}
	Ok(millis)
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			endpoint: DEFAULT_ENDPOINT.to_string(),
			capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
			chat_timeout_ms: DEFAULT_CHAT_TIMEOUT_MS,
		}
	}
}

impl ClientConfig {
	/// Loads the configuration at `path`.
	///
	/// A missing file yields the defaults; a file that is not valid JSON for
	/// this shape is an [`Error::Config`].
	pub fn load(path: &Path) -> Result<Self> {
		let text = match std::fs::read_to_string(path) {
			Ok(text) => text,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				tracing::debug!(target = "signlink.config", path = %path.display(), "no config file; using defaults");
				return Ok(Self::default());
			}
			Err(err) => return Err(err.into()),
		};

		serde_json::from_str(&text).map_err(|source| Error::Config {
			path: path.to_path_buf(),
			source,
		})
	}

	pub fn capture_interval(&self) -> Duration {
		Duration::from_millis(self.capture_interval_ms)
	}

	pub fn chat_timeout(&self) -> Duration {
		Duration::from_millis(self.chat_timeout_ms)
	}
}
