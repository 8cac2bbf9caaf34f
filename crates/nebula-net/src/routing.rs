//! Packet dispatch: protocol id → decoder + handler.
//!
//! Content code registers each [`Packet`] type once, at startup, together with
//! the handler that consumes it. [`PacketRouter::dispatch`] reads the protocol
//! id from a complete frame, decodes it with the registered type and invokes
//! the handler with the caller's context.

use std::collections::HashMap;

use crate::error::PacketError;
use crate::framing::{FrameHeader, HEADER_SIZE};
use crate::packet::Packet;

type Route<C> = Box<dyn Fn(&C, &[u8]) -> Result<(), PacketError> + Send + Sync>;

/// Routes frames to typed handlers by protocol id.
///
/// `C` is whatever context the handlers need (usually the receiving session
/// or the content object wrapping it).
pub struct PacketRouter<C: ?Sized> {
    routes: HashMap<u16, Route<C>>,
}

impl<C: ?Sized> PacketRouter<C> {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register `P` with the handler that consumes decoded packets.
    ///
    /// Registering the same protocol id twice replaces the earlier route.
    pub fn register<P, F>(&mut self, handler: F)
    where
        P: Packet + 'static,
        F: Fn(&C, P) + Send + Sync + 'static,
    {
        let route: Route<C> = Box::new(move |ctx, frame| {
            let packet = P::read(frame)?;
            handler(ctx, packet);
            Ok(())
        });
        if self.routes.insert(P::PROTOCOL, route).is_some() {
            tracing::warn!(protocol = P::PROTOCOL, "replaced existing packet route");
        }
    }

    /// Decode `frame` and hand it to its registered handler.
    ///
    /// Returns `Ok(false)` if no handler is registered for the frame's
    /// protocol id; the frame is dropped. Decode failures are returned.
    pub fn dispatch(&self, ctx: &C, frame: &[u8]) -> Result<bool, PacketError> {
        let header = FrameHeader::parse(frame).ok_or(PacketError::Truncated {
            needed: HEADER_SIZE,
            remaining: frame.len(),
        })?;

        match self.routes.get(&header.protocol) {
            Some(route) => {
                route(ctx, frame)?;
                Ok(true)
            }
            None => {
                tracing::warn!(
                    protocol = header.protocol,
                    "no handler registered, dropping packet"
                );
                Ok(false)
            }
        }
    }

    /// Whether a handler is registered for `protocol`.
    pub fn contains(&self, protocol: u16) -> bool {
        self.routes.contains_key(&protocol)
    }

    /// Iterate over registered protocol ids (useful for startup logging).
    pub fn registered_protocols(&self) -> impl Iterator<Item = u16> + '_ {
        self.routes.keys().copied()
    }
}

impl<C: ?Sized> Default for PacketRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}
