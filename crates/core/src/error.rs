//! Errors surfaced by the views and the coordinator.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Session(#[from] signlink_runtime::Error),

	/// The camera could not be opened or produced no usable frame.
	#[error("camera unavailable: {0}")]
	MediaUnavailable(String),

	#[error("invalid config file {}: {source}", path.display())]
	Config {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}
