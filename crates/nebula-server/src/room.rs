//! The single game room every client joins.
//!
//! All room mutations run as jobs on a [`JobQueue`], so at most one thread
//! touches room state at a time. Broadcasts are encoded once and collected in
//! a pending list; [`GameRoom::flush`] hands that list to every player as one
//! batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use nebula_net::{JobQueue, JobTimer, Packet, SendBufferAllocator, Session, SessionId, TickSource};
use nebula_protocol::{
    PlayerEntry, SBroadcastEnterGame, SBroadcastLeaveGame, SBroadcastMove, SChat, SPlayerList,
};
use parking_lot::Mutex;

/// Spawn position for new players.
pub const SPAWN_POSITION: [f32; 3] = [0.0, 0.0, 0.0];

struct Player {
    session: Arc<Session>,
    pos: [f32; 3],
}

struct RoomState {
    players: BTreeMap<SessionId, Player>,
    pending: Vec<Bytes>,
    alloc: SendBufferAllocator,
}

impl RoomState {
    /// Encode `packet` and queue it for the next flush.
    fn broadcast<P: Packet>(&mut self, packet: &P) {
        match packet.write(&mut self.alloc) {
            Ok(segment) => self.pending.push(segment),
            Err(e) => tracing::warn!(protocol = P::PROTOCOL, error = %e, "broadcast encode failed"),
        }
    }
}

pub struct GameRoom {
    jobs: JobQueue,
    // Only locked from room jobs, which the queue already serializes.
    state: Mutex<RoomState>,
}

impl GameRoom {
    pub fn new(send_chunk_size: usize) -> Arc<Self> {
        Arc::new(Self {
            jobs: JobQueue::new(),
            state: Mutex::new(RoomState {
                players: BTreeMap::new(),
                pending: Vec::new(),
                alloc: SendBufferAllocator::with_chunk_size(send_chunk_size),
            }),
        })
    }

    /// Add `session` as a player at [`SPAWN_POSITION`].
    ///
    /// The newcomer gets the current player list directly; everyone is told
    /// about the newcomer on the next flush.
    pub fn enter(self: &Arc<Self>, session: Arc<Session>) {
        let room = Arc::clone(self);
        self.jobs.push(move || room.handle_enter(session));
    }

    pub fn leave(self: &Arc<Self>, id: SessionId) {
        let room = Arc::clone(self);
        self.jobs.push(move || room.handle_leave(id));
    }

    pub fn chat(self: &Arc<Self>, id: SessionId, chat: String) {
        let room = Arc::clone(self);
        self.jobs.push(move || room.handle_chat(id, chat));
    }

    pub fn move_player(self: &Arc<Self>, id: SessionId, pos: [f32; 3]) {
        let room = Arc::clone(self);
        self.jobs.push(move || room.handle_move(id, pos));
    }

    /// Send every pending broadcast to every player.
    pub fn flush(self: &Arc<Self>) {
        let room = Arc::clone(self);
        self.jobs.push(move || room.handle_flush());
    }

    pub fn player_count(&self) -> usize {
        self.state.lock().players.len()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.state.lock().players.contains_key(&id)
    }

    pub fn position(&self, id: SessionId) -> Option<[f32; 3]> {
        self.state.lock().players.get(&id).map(|player| player.pos)
    }

    /// Broadcast segments waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn handle_enter(&self, session: Arc<Session>) {
        let id = session.id();
        let mut state = self.state.lock();
        if state.players.contains_key(&id) {
            return;
        }

        let mut players: Vec<PlayerEntry> = state
            .players
            .iter()
            .map(|(other, player)| PlayerEntry {
                is_self: false,
                player_id: other.0,
                pos: player.pos,
            })
            .collect();
        players.push(PlayerEntry {
            is_self: true,
            player_id: id.0,
            pos: SPAWN_POSITION,
        });

        match (SPlayerList { players }).write(&mut state.alloc) {
            Ok(segment) => {
                if let Err(e) = session.send(segment) {
                    tracing::debug!(session = %id, error = %e, "player list not sent");
                }
            }
            Err(e) => tracing::warn!(session = %id, error = %e, "player list encode failed"),
        }

        state.players.insert(
            id,
            Player {
                session,
                pos: SPAWN_POSITION,
            },
        );
        state.broadcast(&SBroadcastEnterGame {
            player_id: id.0,
            pos: SPAWN_POSITION,
        });
        tracing::info!(session = %id, players = state.players.len(), "player entered");
    }

    fn handle_leave(&self, id: SessionId) {
        let mut state = self.state.lock();
        if state.players.remove(&id).is_none() {
            return;
        }
        state.broadcast(&SBroadcastLeaveGame { player_id: id.0 });
        tracing::info!(session = %id, players = state.players.len(), "player left");
    }

    fn handle_chat(&self, id: SessionId, chat: String) {
        let mut state = self.state.lock();
        if !state.players.contains_key(&id) {
            return;
        }
        state.broadcast(&SChat {
            player_id: id.0,
            chat,
        });
    }

    fn handle_move(&self, id: SessionId, pos: [f32; 3]) {
        let mut state = self.state.lock();
        let Some(player) = state.players.get_mut(&id) else {
            return;
        };
        player.pos = pos;
        state.broadcast(&SBroadcastMove {
            player_id: id.0,
            pos,
        });
    }

    fn handle_flush(&self) {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut state.pending);
        for (id, player) in &state.players {
            if let Err(e) = player.session.send_many(pending.iter().cloned()) {
                tracing::debug!(session = %id, error = %e, "flush skipped");
            }
        }
        tracing::trace!(
            segments = pending.len(),
            players = state.players.len(),
            "room flushed"
        );
    }
}

/// Flush `room` now and then every `interval` ticks of `timer`.
pub fn schedule_flush<C>(room: &Arc<GameRoom>, timer: &Arc<JobTimer<C>>, interval: u64)
where
    C: TickSource + 'static,
{
    let next_room = Arc::clone(room);
    let next_timer = Arc::clone(timer);
    timer.push_after(interval, move || {
        next_room.flush();
        schedule_flush(&next_room, &next_timer, interval);
    });
}
