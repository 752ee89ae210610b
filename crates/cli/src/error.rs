use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Client(#[from] signlink::Error),

	#[error("no PNG frames in {}", path.display())]
	NoFrames { path: PathBuf },

	#[error("could not reach the service at {endpoint}")]
	Unreachable { endpoint: String },

	#[error("camera capture did not start")]
	CaptureNotStarted,

	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
