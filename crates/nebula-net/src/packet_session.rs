//! Frame-oriented sessions.
//!
//! [`PacketSession`] adapts a [`PacketHandler`], which only ever sees complete
//! frames, into a [`SessionHandler`] that works on the raw receive window.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::SessionError;
use crate::framing::slice_frames;
use crate::session::{Session, SessionHandler};

/// Content callbacks for a session speaking the framed protocol.
pub trait PacketHandler: Send + Sync + 'static {
    fn on_connected(&self, _session: &Arc<Session>, _peer: SocketAddr) {}

    /// One complete frame, header included. An error disconnects.
    fn on_packet(&self, session: &Arc<Session>, frame: &[u8]) -> Result<(), SessionError>;

    fn on_sent(&self, _session: &Arc<Session>, _len: usize) {}

    fn on_disconnected(&self, _session: &Arc<Session>, _peer: SocketAddr) {}
}

/// Slices frames out of the receive window and forwards each to `H`.
pub struct PacketSession<H> {
    handler: H,
}

impl<H: PacketHandler> PacketSession<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: PacketHandler> SessionHandler for PacketSession<H> {
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.handler.on_connected(session, peer);
    }

    fn on_received(&self, session: &Arc<Session>, window: &[u8]) -> Result<usize, SessionError> {
        let config = session.config().frame_config();
        slice_frames(window, &config, |frame| self.handler.on_packet(session, frame))
    }

    fn on_sent(&self, session: &Arc<Session>, len: usize) {
        self.handler.on_sent(session, len);
    }

    fn on_disconnected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.handler.on_disconnected(session, peer);
    }
}
