pub mod camera;
pub mod chat;

use std::time::Duration;

use crate::cli::{Cli, Commands};
use crate::error::Result;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let config = cli.client_config()?;
	match cli.command {
		Commands::Chat { texts } => chat::execute(config, &texts, cli.format).await,
		Commands::Camera { frames, duration_secs } => {
			camera::execute(config, &frames, duration_secs.map(Duration::from_secs), cli.format).await
		}
	}
}
