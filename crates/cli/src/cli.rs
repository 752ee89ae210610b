use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use signlink::ClientConfig;

use crate::error::Result;
use crate::output::OutputFormat;

/// Config file read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "signlink.json";

#[derive(Parser, Debug)]
#[command(name = "signlink")]
#[command(about = "Talk to the sign language recognition service from the command line")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Client config file (JSON)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Service endpoint, overrides the config file
	#[arg(long, global = true, value_name = "URL")]
	pub endpoint: Option<String>,

	/// Capture period in milliseconds, overrides the config file
	#[arg(long, global = true, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
	pub interval_ms: Option<u64>,

	/// Chat answer timeout in milliseconds, overrides the config file
	#[arg(long, global = true, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
	pub timeout_ms: Option<u64>,

	/// Output format
	#[arg(short, long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Ask the chatbot one or more questions and print the transcript
	Chat {
		/// Questions, submitted in order
		#[arg(required = true)]
		texts: Vec<String>,
	},

	/// Stream still frames from a directory and print recognized signs
	#[command(alias = "cam")]
	Camera {
		/// Directory of PNG frames, played back in file name order
		#[arg(long, value_name = "DIR")]
		frames: PathBuf,

		/// Stop after this many seconds (default: until Ctrl-C)
		#[arg(long, value_name = "SECS")]
		duration_secs: Option<u64>,
	},
}

impl Cli {
	/// Loads the config file and applies the command-line overrides.
	pub fn client_config(&self) -> Result<ClientConfig> {
		let path = self.config.as_deref().unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
		let mut config = ClientConfig::load(path)?;

		if let Some(endpoint) = &self.endpoint {
			config.endpoint = endpoint.clone();
		}
		if let Some(interval_ms) = self.interval_ms {
			config.capture_interval_ms = interval_ms;
		}
		if let Some(timeout_ms) = self.timeout_ms {
			config.chat_timeout_ms = timeout_ms;
		}
		Ok(config)
	}
}
