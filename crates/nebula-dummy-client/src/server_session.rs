//! Handling of server → client messages on dummy sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use nebula_net::{PacketHandler, PacketRouter, Session, SessionError};
use nebula_protocol::{
    SBroadcastEnterGame, SBroadcastLeaveGame, SBroadcastMove, SChat, SPlayerList,
};

/// Message counters summed over every dummy session.
#[derive(Debug, Default)]
pub struct TrafficStats {
    pub player_lists: AtomicU64,
    pub enters: AtomicU64,
    pub leaves: AtomicU64,
    pub chats: AtomicU64,
    pub moves: AtomicU64,
}

impl TrafficStats {
    pub fn total(&self) -> u64 {
        [
            &self.player_lists,
            &self.enters,
            &self.leaves,
            &self.chats,
            &self.moves,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::Relaxed))
        .sum()
    }
}

/// Router plus counters shared by all dummy sessions.
pub struct ClientContext {
    pub stats: Arc<TrafficStats>,
    router: PacketRouter<Arc<Session>>,
}

impl ClientContext {
    pub fn new() -> Arc<Self> {
        let stats = Arc::new(TrafficStats::default());
        Arc::new(Self {
            router: server_router(&stats),
            stats,
        })
    }
}

fn server_router(stats: &Arc<TrafficStats>) -> PacketRouter<Arc<Session>> {
    let mut router = PacketRouter::new();

    let s = Arc::clone(stats);
    router.register(move |session: &Arc<Session>, packet: SPlayerList| {
        s.player_lists.fetch_add(1, Ordering::Relaxed);
        let me = packet.players.iter().find(|p| p.is_self).map(|p| p.player_id);
        tracing::debug!(session = %session.id(), players = packet.players.len(), ?me, "player list");
    });

    let s = Arc::clone(stats);
    router.register(move |session: &Arc<Session>, packet: SBroadcastEnterGame| {
        s.enters.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(session = %session.id(), player = packet.player_id, "player entered");
    });

    let s = Arc::clone(stats);
    router.register(move |session: &Arc<Session>, packet: SBroadcastLeaveGame| {
        s.leaves.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(session = %session.id(), player = packet.player_id, "player left");
    });

    let s = Arc::clone(stats);
    router.register(move |session: &Arc<Session>, packet: SChat| {
        s.chats.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(session = %session.id(), player = packet.player_id, chat = %packet.chat, "chat");
    });

    let s = Arc::clone(stats);
    router.register(move |_: &Arc<Session>, _: SBroadcastMove| {
        s.moves.fetch_add(1, Ordering::Relaxed);
    });

    router
}

/// [`PacketHandler`] for one dummy connection to the server.
pub struct ServerSession {
    ctx: Arc<ClientContext>,
}

impl ServerSession {
    pub fn new(ctx: Arc<ClientContext>) -> Self {
        Self { ctx }
    }
}

impl PacketHandler for ServerSession {
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr) {
        tracing::debug!(session = %session.id(), %peer, "connected to server");
    }

    fn on_packet(&self, session: &Arc<Session>, frame: &[u8]) -> Result<(), SessionError> {
        self.ctx.router.dispatch(session, frame)?;
        Ok(())
    }

    fn on_disconnected(&self, session: &Arc<Session>, peer: SocketAddr) {
        tracing::info!(session = %session.id(), %peer, "server connection closed");
    }
}
