//! Rendering of transcripts and camera view changes.

use clap::ValueEnum;
use serde::Serialize;
use signlink::{CaptureView, ChatEntry};

use crate::error::Result;

/// Output format for command results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// JSON output
	Json,
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
		}
	}
}

pub fn render_transcript(entries: &[ChatEntry], format: OutputFormat) -> Result<String> {
	match format {
		OutputFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
		OutputFormat::Text => Ok(entries
			.iter()
			.map(|entry| match entry {
				ChatEntry::User(text) => format!("you: {text}"),
				ChatEntry::Bot(text) => format!("bot: {text}"),
			})
			.collect::<Vec<_>>()
			.join("\n")),
	}
}

/// One observable change between two camera views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewChange {
	Item(String),
	Throttled(bool),
}

pub fn view_changes(before: &CaptureView, after: &CaptureView) -> Vec<ViewChange> {
	let mut changes = Vec::new();
	if before.throttled != after.throttled {
		changes.push(ViewChange::Throttled(after.throttled));
	}
	changes.extend(after.items.iter().skip(before.items.len()).cloned().map(ViewChange::Item));
	changes
}

pub fn render_change(change: &ViewChange, format: OutputFormat) -> Result<String> {
	match format {
		OutputFormat::Json => Ok(serde_json::to_string(change)?),
		OutputFormat::Text => Ok(match change {
			ViewChange::Item(label) => format!("sign: {label}"),
			ViewChange::Throttled(true) => "waiting: another camera is active".to_string(),
			ViewChange::Throttled(false) => "active: this camera is being recognized".to_string(),
		}),
	}
}
