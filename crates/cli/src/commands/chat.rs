use signlink::{ChatEntry, ClientConfig, LifecycleCoordinator};
use tracing::info;

use crate::error::{CliError, Result};
use crate::output::{OutputFormat, render_transcript};

/// Submits `texts` in order through a fresh chat view and returns the
/// transcript. The session is closed before returning.
pub async fn run(config: ClientConfig, texts: &[String]) -> Result<Vec<ChatEntry>> {
	let coordinator = LifecycleCoordinator::new(config);
	let chat = coordinator.enter_chat().await;
	if !coordinator.session().is_connected() {
		coordinator.on_unload().await;
		return Err(CliError::Unreachable {
			endpoint: coordinator.session().endpoint().to_string(),
		});
	}

	for text in texts {
		let outcome = chat.submit(text).await;
		info!(target = "signlink.cli", ?outcome, "submitted");
	}

	let transcript = chat.transcript();
	coordinator.on_unload().await;
	Ok(transcript)
}

pub async fn execute(config: ClientConfig, texts: &[String], format: OutputFormat) -> Result<()> {
	let transcript = run(config, texts).await?;
	println!("{}", render_transcript(&transcript, format)?);
	Ok(())
}
