use std::path::Path;
use std::time::Duration;

use signlink::{CaptureState, CaptureView, ClientConfig, LifecycleCoordinator};
use tracing::{info, warn};

use crate::error::{CliError, Result};
use crate::frames;
use crate::output::{OutputFormat, render_change, view_changes};

/// Streams the frames of `frames_dir` until `duration` elapses or Ctrl-C,
/// printing every new sign and throttle change.
pub async fn execute(config: ClientConfig, frames_dir: &Path, duration: Option<Duration>, format: OutputFormat) -> Result<()> {
	let camera = frames::still_camera(frames_dir)?;
	info!(target = "signlink.cli", frames = camera.frame_count(), dir = %frames_dir.display(), "camera ready");

	let coordinator = LifecycleCoordinator::new(config);
	let mut view = coordinator.enter_camera(&camera).await;
	if !coordinator.session().is_connected() {
		coordinator.on_unload().await;
		return Err(CliError::Unreachable {
			endpoint: coordinator.session().endpoint().to_string(),
		});
	}
	if coordinator.capture_state() != Some(CaptureState::Capturing) {
		coordinator.on_unload().await;
		return Err(CliError::CaptureNotStarted);
	}

	let deadline = async {
		match duration {
			Some(duration) => tokio::time::sleep(duration).await,
			None => std::future::pending().await,
		}
	};
	tokio::pin!(deadline);
	let interrupt = tokio::signal::ctrl_c();
	tokio::pin!(interrupt);

	let mut shown = CaptureView::default();
	let result = loop {
		tokio::select! {
			changed = view.changed() => {
				if changed.is_err() {
					break Ok(());
				}
				let current = view.borrow_and_update().clone();
				let lines: Result<Vec<String>> = view_changes(&shown, &current).iter().map(|change| render_change(change, format)).collect();
				match lines {
					Ok(lines) => lines.iter().for_each(|line| println!("{line}")),
					Err(err) => break Err(err),
				}
				shown = current;
			}
			_ = &mut deadline => {
				info!(target = "signlink.cli", "capture duration elapsed");
				break Ok(());
			}
			signal = &mut interrupt => {
				if let Err(err) = signal {
					warn!(target = "signlink.cli", error = %err, "cannot listen for Ctrl-C");
				}
				info!(target = "signlink.cli", "interrupted");
				break Ok(());
			}
		}
	};

	coordinator.on_unload().await;
	result
}
