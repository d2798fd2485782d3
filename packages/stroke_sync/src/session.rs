//! The surface a presentation layer drives once per frame.
//!
//! A [`Session`] ties the shared drawing, the interpolator, the client and
//! (for the hosting participant) the room host together. The hosting
//! participant also joins its own room over loopback, so both sides push and
//! receive strokes through the same path.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::{debug, info, warn};

use crate::client::{ClientConfig, PeerClient};
use crate::drawing::SharedDrawing;
use crate::error::SyncError;
use crate::host::{HostConfig, SessionHost};
use crate::interpolate::StrokeInterpolator;
use crate::point::Point;

/// Label shown in place of the host address on the hosting side.
pub const HOST_SELF_LABEL: &str = "You";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionRole {
    Host,
    Joiner,
}

/// Where the local participant is on the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanvasPhase {
    /// Entered the room, nothing drawn yet.
    Waiting,
    /// Drawing; the local buffer is pushed every frame.
    Drawing,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub host: HostConfig,
    pub client: ClientConfig,
    pub brush_radius: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            client: ClientConfig::default(),
            brush_radius: 10.0,
        }
    }
}

/// Input sampled by the presentation layer for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInput {
    pub pointer: Point,
    pub primary_down: bool,
}

pub struct Session {
    role: SessionRole,
    drawing: SharedDrawing,
    host: Option<SessionHost>,
    client: PeerClient,
    interpolator: StrokeInterpolator,
    phase: CanvasPhase,
}

impl Session {
    pub fn new(role: SessionRole, config: SessionConfig) -> Self {
        let drawing = SharedDrawing::new();
        let host = match role {
            SessionRole::Host => Some(SessionHost::new(drawing.clone(), config.host)),
            SessionRole::Joiner => None,
        };
        Self {
            role,
            client: PeerClient::new(drawing.clone(), config.client),
            drawing,
            host,
            interpolator: StrokeInterpolator::new(config.brush_radius),
            phase: CanvasPhase::Waiting,
        }
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn phase(&self) -> CanvasPhase {
        self.phase
    }

    pub fn drawing(&self) -> &SharedDrawing {
        &self.drawing
    }

    pub fn host(&self) -> Option<&SessionHost> {
        self.host.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn brush_radius(&self) -> f32 {
        self.interpolator.radius()
    }

    pub fn set_brush_radius(&mut self, radius: f32) {
        self.interpolator.set_radius(radius);
    }

    /// Open (host) or join (joiner) the room.
    ///
    /// A failure leaves the session offline but usable: frames still draw
    /// into the local buffer. When hosting, a failure at any step leaves the
    /// room closed.
    pub async fn enter(&mut self) -> Result<(), SyncError> {
        self.drawing.clear();
        self.phase = CanvasPhase::Waiting;

        if let Some(host) = self.host.as_mut() {
            let addr = host.start().await?;
            // Join our own room through the loopback of the bound family.
            let loopback = match addr.ip() {
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
            };
            let mut config = self.client.config().clone();
            config.host = loopback.to_string();
            config.port = addr.port();
            self.client = PeerClient::new(self.drawing.clone(), config);
        }

        let label = match self.client.connect().await {
            Ok(label) => label,
            Err(e) => {
                // A room its own host cannot reach is not left listening.
                if let Some(host) = self.host.as_mut() {
                    warn!("could not join own room, closing it: {}", e);
                    host.shutdown().await;
                }
                return Err(e);
            }
        };
        info!(role = ?self.role, host = %label, "entered room");
        Ok(())
    }

    /// What the UI shows as the room's host.
    pub fn host_label(&self) -> Option<String> {
        match self.role {
            SessionRole::Host => Some(HOST_SELF_LABEL.to_string()),
            SessionRole::Joiner => self.client.host_label().map(str::to_string),
        }
    }

    /// Advance one frame: interpolate the pointer into the buffer and, once
    /// drawing has started, push the buffer to the room.
    pub fn frame(&mut self, input: FrameInput) {
        if self.phase == CanvasPhase::Waiting {
            if !input.primary_down {
                self.interpolator.anchor(input.pointer);
                return;
            }
            debug!("first stroke, drawing started");
            self.phase = CanvasPhase::Drawing;
        }

        let points = self.interpolator.track(input.pointer, input.primary_down);
        self.drawing.append(&points);

        if let Err(e) = self.client.send_current_state() {
            debug!("stroke update not sent: {}", e);
        }
    }

    /// Wipe the local canvas. The peer sees it through the next update.
    pub fn clear(&self) {
        self.drawing.clear();
    }

    /// Leave the room: close it when hosting, disconnect, and reset the
    /// canvas.
    pub async fn leave(&mut self) {
        self.client.disconnect();
        if let Some(host) = self.host.as_mut() {
            host.shutdown().await;
        }
        self.drawing.clear();
        self.phase = CanvasPhase::Waiting;
    }
}
