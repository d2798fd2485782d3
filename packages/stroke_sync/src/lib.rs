//! Stroke synchronization core for a two-person shared whiteboard.
//!
//! One participant hosts a room, the other joins it, and the freehand strokes
//! drawn on either side are mirrored to both canvases. This crate holds the
//! parts that carry real concurrency and a wire contract; windows, fonts and
//! buttons live in whatever presentation layer drives it.
//!
//! # Data flow
//!
//! ```text
//! pointer samples ─► StrokeInterpolator ─► SharedDrawing ─► PeerClient ──┐
//!                                              ▲                         │ ws /ws
//!                                              │                         ▼
//!                       PeerClient ◄── relay ── SessionHost ◄────────────┘
//! ```
//!
//! Every wire message is a raw [`codec`] payload: the whole visible stroke
//! buffer, replacing whatever the receiver had before.
//!
//! # Example
//!
//! ```no_run
//! use stroke_sync::{FrameInput, Point, Session, SessionConfig, SessionRole};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut session = Session::new(SessionRole::Joiner, SessionConfig::default());
//!     if let Err(e) = session.enter().await {
//!         eprintln!("could not join room: {e}");
//!     }
//!
//!     // Called once per rendered frame by the presentation layer.
//!     session.frame(FrameInput {
//!         pointer: Point::new(120.0, 80.0),
//!         primary_down: true,
//!     });
//!
//!     session.leave().await;
//! }
//! ```

pub mod client;
pub mod codec;
mod drawing;
mod error;
pub mod host;
pub mod interpolate;
mod point;
mod registry;
pub mod session;

pub use client::{ClientConfig, PeerClient};
pub use drawing::SharedDrawing;
pub use error::SyncError;
pub use host::{HostConfig, HostState, SessionHost};
pub use interpolate::StrokeInterpolator;
pub use point::Point;
pub use registry::PeerId;
pub use session::{CanvasPhase, FrameInput, Session, SessionConfig, SessionRole};

/// Well-known route of the stroke stream on the host.
pub const WS_PATH: &str = "/ws";

/// Fixed port the host listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8000;
