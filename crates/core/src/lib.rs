//! Real-time session layer for the sign language recognition front-end.
//!
//! The camera view streams periodic frames to the recognition service and
//! shows the labels it returns; the chat view sends questions and shows the
//! answers. Both views share one duplex [`Session`] owned by the
//! [`LifecycleCoordinator`].
//!
//! ```ignore
//! let coordinator = LifecycleCoordinator::new(ClientConfig::default());
//! let chat = coordinator.enter_chat().await;
//! chat.submit("What is used for backend?").await;
//! coordinator.on_unload().await;
//! ```

pub mod capture;
pub mod chat;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod media;

pub use capture::{CaptureState, CaptureView, FrameCaptureLoop};
pub use chat::{ChatEntry, ChatExchange, SubmitOutcome};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use lifecycle::LifecycleCoordinator;
pub use media::{Dimensions, DrawingSurface, MediaDevices, StillImageCamera, VideoFrame, VideoSource};
pub use signlink_protocol::FrameVerdict;
pub use signlink_runtime::{Session, SessionState};
