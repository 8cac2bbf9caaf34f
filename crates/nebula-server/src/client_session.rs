//! Per-connection packet handling for game clients.

use std::net::SocketAddr;
use std::sync::Arc;

use nebula_net::{PacketHandler, PacketRouter, Session, SessionError};
use nebula_protocol::{CChat, CLeaveGame, CMove};

use crate::room::GameRoom;
use crate::session_manager::SessionManager;

/// State shared by every client session.
pub struct ServerContext {
    pub sessions: SessionManager,
    pub room: Arc<GameRoom>,
    router: PacketRouter<Arc<Session>>,
}

impl ServerContext {
    pub fn new(room: Arc<GameRoom>) -> Arc<Self> {
        Arc::new(Self {
            sessions: SessionManager::new(),
            router: client_router(&room),
            room,
        })
    }
}

/// Routes for every client → server message.
fn client_router(room: &Arc<GameRoom>) -> PacketRouter<Arc<Session>> {
    let mut router = PacketRouter::new();

    let chat_room = Arc::clone(room);
    router.register(move |session: &Arc<Session>, packet: CChat| {
        chat_room.chat(session.id(), packet.chat);
    });

    let move_room = Arc::clone(room);
    router.register(move |session: &Arc<Session>, packet: CMove| {
        move_room.move_player(session.id(), packet.pos);
    });

    router.register(|session: &Arc<Session>, _: CLeaveGame| {
        tracing::debug!(session = %session.id(), "client asked to leave");
        session.disconnect();
    });

    router
}

/// [`PacketHandler`] for one connected game client.
pub struct ClientSession {
    ctx: Arc<ServerContext>,
}

impl ClientSession {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }
}

impl PacketHandler for ClientSession {
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr) {
        tracing::info!(session = %session.id(), %peer, "client connected");
        self.ctx.sessions.add(session);
        self.ctx.room.enter(Arc::clone(session));
    }

    fn on_packet(&self, session: &Arc<Session>, frame: &[u8]) -> Result<(), SessionError> {
        self.ctx.router.dispatch(session, frame)?;
        Ok(())
    }

    fn on_disconnected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.ctx.sessions.remove(session.id());
        self.ctx.room.leave(session.id());
        tracing::info!(session = %session.id(), %peer, "client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebula_net::{
        FrameHeader, HEADER_SIZE, Listener, ListenerConfig, Packet, PacketSession,
        SendBufferAllocator, SessionHandler, SessionId,
    };
    use nebula_protocol::{SBroadcastEnterGame, SBroadcastLeaveGame, SChat, SPlayerList};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn server() -> (Listener, Arc<ServerContext>) {
        let ctx = ServerContext::new(GameRoom::new(4096));
        let factory_ctx = Arc::clone(&ctx);
        let config = ListenerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            accept_pool: 2,
            ..ListenerConfig::default()
        };
        let listener = Listener::bind(config, move || {
            Arc::new(PacketSession::new(ClientSession::new(Arc::clone(&factory_ctx))))
                as Arc<dyn SessionHandler>
        })
        .await
        .unwrap();
        (listener, ctx)
    }

    async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
        let mut frame = vec![0u8; HEADER_SIZE];
        tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut frame))
            .await
            .expect("timed out waiting for frame")
            .unwrap();
        let header = FrameHeader::parse(&frame).unwrap();
        frame.resize(header.size as usize, 0);
        stream.read_exact(&mut frame[HEADER_SIZE..]).await.unwrap();
        frame
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    async fn join(addr: SocketAddr) -> (TcpStream, u64) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let list = SPlayerList::read(&read_frame(&mut stream).await).unwrap();
        let me = list.players.iter().find(|p| p.is_self).unwrap().player_id;
        (stream, me)
    }

    #[test]
    fn test_router_covers_client_messages() {
        let ctx = ServerContext::new(GameRoom::new(4096));
        let mut ids: Vec<u16> = ctx.router.registered_protocols().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![CChat::PROTOCOL, CLeaveGame::PROTOCOL, CMove::PROTOCOL]);
    }

    #[tokio::test]
    async fn test_chat_reaches_other_player() {
        let (listener, ctx) = server().await;
        let addr = listener.local_addr();

        let (mut alice, alice_id) = join(addr).await;
        let (mut bob, bob_id) = join(addr).await;
        wait_until(|| ctx.room.player_count() == 2).await;
        assert_eq!(ctx.sessions.len(), 2);

        let mut alloc = SendBufferAllocator::with_chunk_size(4096);
        let chat = CChat {
            chat: "hello bob".to_string(),
        }
        .write(&mut alloc)
        .unwrap();
        alice.write_all(&chat).await.unwrap();
        wait_until(|| ctx.room.pending_len() == 3).await;
        ctx.room.flush();

        let enter = SBroadcastEnterGame::read(&read_frame(&mut bob).await).unwrap();
        assert_eq!(enter.player_id, alice_id);
        let enter = SBroadcastEnterGame::read(&read_frame(&mut bob).await).unwrap();
        assert_eq!(enter.player_id, bob_id);
        let relayed = SChat::read(&read_frame(&mut bob).await).unwrap();
        assert_eq!(relayed.player_id, alice_id);
        assert_eq!(relayed.chat, "hello bob");

        listener.shutdown().await;
        ctx.sessions.disconnect_all();
    }

    #[tokio::test]
    async fn test_leave_packet_disconnects_and_broadcasts() {
        let (listener, ctx) = server().await;
        let addr = listener.local_addr();

        let (mut alice, _) = join(addr).await;
        let (mut bob, bob_id) = join(addr).await;
        wait_until(|| ctx.room.player_count() == 2).await;
        ctx.room.flush();
        read_frame(&mut alice).await;
        read_frame(&mut alice).await;

        let mut alloc = SendBufferAllocator::with_chunk_size(4096);
        bob.write_all(&CLeaveGame.write(&mut alloc).unwrap())
            .await
            .unwrap();
        wait_until(|| ctx.room.player_count() == 1).await;
        assert!(ctx.sessions.find(SessionId(bob_id)).is_none());

        ctx.room.flush();
        let left = SBroadcastLeaveGame::read(&read_frame(&mut alice).await).unwrap();
        assert_eq!(left.player_id, bob_id);

        listener.shutdown().await;
        ctx.sessions.disconnect_all();
    }

    #[tokio::test]
    async fn test_malformed_packet_disconnects() {
        let (listener, ctx) = server().await;
        let (mut stream, _) = join(listener.local_addr()).await;
        wait_until(|| ctx.room.player_count() == 1).await;

        // CChat whose string length runs past the frame.
        stream.write_all(&[6, 0, 1, 0, 50, 0]).await.unwrap();
        wait_until(|| ctx.room.player_count() == 0).await;
        assert!(ctx.sessions.is_empty());

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_protocol_is_dropped() {
        let (listener, ctx) = server().await;
        let (mut stream, me) = join(listener.local_addr()).await;
        wait_until(|| ctx.room.player_count() == 1).await;

        stream.write_all(&[4, 0, 99, 0]).await.unwrap();
        let mut alloc = SendBufferAllocator::with_chunk_size(4096);
        let chat = CChat {
            chat: "still here".to_string(),
        }
        .write(&mut alloc)
        .unwrap();
        stream.write_all(&chat).await.unwrap();
        wait_until(|| ctx.room.pending_len() == 2).await;
        assert!(ctx.sessions.find(SessionId(me)).is_some());

        listener.shutdown().await;
        ctx.sessions.disconnect_all();
    }
}
