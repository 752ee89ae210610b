//! Capture cadence under paused time.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use signlink::{CaptureState, ClientConfig, Dimensions, LifecycleCoordinator, Session, StillImageCamera, VideoFrame};
use signlink_runtime::fake_transport::FakeDialer;
use tokio::time::Instant;

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake frame";

fn assert_between(elapsed: Duration, expected_ms: u64) {
	let expected = Duration::from_millis(expected_ms);
	assert!(elapsed >= expected && elapsed < expected + Duration::from_millis(50), "frame sent after {elapsed:?}, expected {expected:?}");
}

#[tokio::test(start_paused = true)]
async fn frames_leave_every_two_seconds() {
	let dialer = Arc::new(FakeDialer::new());
	let controller = dialer.queue();
	let session = Arc::new(Session::with_dialer("ws://fake", dialer));
	let coordinator = LifecycleCoordinator::with_session(ClientConfig::default(), session);
	let camera = StillImageCamera::new(vec![VideoFrame::png(Dimensions::new(640, 480), PNG_BYTES.to_vec())]);

	let started = Instant::now();
	coordinator.enter_camera(&camera).await;
	assert_eq!(coordinator.capture_state(), Some(CaptureState::Capturing));
	assert_eq!(controller.next_sent().await.unwrap().event, "cameracon");

	let first = controller.next_event("frame").await.unwrap();
	assert_between(started.elapsed(), 2000);
	let payload = first.data.as_ref().unwrap()["data"].as_str().unwrap().to_string();
	let encoded = payload.strip_prefix("data:image/png;base64,").unwrap();
	assert_eq!(STANDARD.decode(encoded).unwrap(), PNG_BYTES);

	let second = controller.next_event("frame").await.unwrap();
	assert_between(started.elapsed(), 4000);
	assert_ne!(first.id, second.id);

	coordinator.on_destroy().await;
	assert!(camera.tracks_stopped());
}
