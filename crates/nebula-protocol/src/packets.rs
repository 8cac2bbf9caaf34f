//! Message structs and their wire encodings.

use bytes::Bytes;
use nebula_net::{
    DEFAULT_RESERVE, Packet, PacketError, PacketReader, PacketWriter, SendBufferAllocator,
    encode_frame,
};

use crate::PacketId;

/// Position triple shared by several messages.
fn put_position(w: &mut PacketWriter<'_>, pos: [f32; 3]) -> Result<(), PacketError> {
    for axis in pos {
        w.put_f32(axis)?;
    }
    Ok(())
}

fn get_position(r: &mut PacketReader<'_>) -> Result<[f32; 3], PacketError> {
    Ok([r.get_f32()?, r.get_f32()?, r.get_f32()?])
}

/// Chat line sent by a client.
#[derive(Debug, Clone, PartialEq)]
pub struct CChat {
    pub chat: String,
}

impl Packet for CChat {
    const PROTOCOL: u16 = PacketId::CChat.id();

    fn read(frame: &[u8]) -> Result<Self, PacketError> {
        let mut r = PacketReader::new(frame, Self::PROTOCOL)?;
        let packet = Self {
            chat: r.get_string()?,
        };
        r.finish()?;
        Ok(packet)
    }

    fn write(&self, alloc: &mut SendBufferAllocator) -> Result<Bytes, PacketError> {
        encode_frame(alloc, Self::PROTOCOL, DEFAULT_RESERVE, |w| w.put_str(&self.chat))
    }
}

/// Chat line relayed to every player in the room.
#[derive(Debug, Clone, PartialEq)]
pub struct SChat {
    pub player_id: u64,
    pub chat: String,
}

impl Packet for SChat {
    const PROTOCOL: u16 = PacketId::SChat.id();

    fn read(frame: &[u8]) -> Result<Self, PacketError> {
        let mut r = PacketReader::new(frame, Self::PROTOCOL)?;
        let packet = Self {
            player_id: r.get_u64()?,
            chat: r.get_string()?,
        };
        r.finish()?;
        Ok(packet)
    }

    fn write(&self, alloc: &mut SendBufferAllocator) -> Result<Bytes, PacketError> {
        encode_frame(alloc, Self::PROTOCOL, DEFAULT_RESERVE, |w| {
            w.put_u64(self.player_id)?;
            w.put_str(&self.chat)
        })
    }
}

/// A player joined the room.
#[derive(Debug, Clone, PartialEq)]
pub struct SBroadcastEnterGame {
    pub player_id: u64,
    pub pos: [f32; 3],
}

impl Packet for SBroadcastEnterGame {
    const PROTOCOL: u16 = PacketId::SBroadcastEnterGame.id();

    fn read(frame: &[u8]) -> Result<Self, PacketError> {
        let mut r = PacketReader::new(frame, Self::PROTOCOL)?;
        let packet = Self {
            player_id: r.get_u64()?,
            pos: get_position(&mut r)?,
        };
        r.finish()?;
        Ok(packet)
    }

    fn write(&self, alloc: &mut SendBufferAllocator) -> Result<Bytes, PacketError> {
        encode_frame(alloc, Self::PROTOCOL, DEFAULT_RESERVE, |w| {
            w.put_u64(self.player_id)?;
            put_position(w, self.pos)
        })
    }
}

/// Client asks to leave the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CLeaveGame;

impl Packet for CLeaveGame {
    const PROTOCOL: u16 = PacketId::CLeaveGame.id();

    fn read(frame: &[u8]) -> Result<Self, PacketError> {
        PacketReader::new(frame, Self::PROTOCOL)?.finish()?;
        Ok(Self)
    }

    fn write(&self, alloc: &mut SendBufferAllocator) -> Result<Bytes, PacketError> {
        encode_frame(alloc, Self::PROTOCOL, nebula_net::HEADER_SIZE, |_| Ok(()))
    }
}

/// A player left the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SBroadcastLeaveGame {
    pub player_id: u64,
}

impl Packet for SBroadcastLeaveGame {
    const PROTOCOL: u16 = PacketId::SBroadcastLeaveGame.id();

    fn read(frame: &[u8]) -> Result<Self, PacketError> {
        let mut r = PacketReader::new(frame, Self::PROTOCOL)?;
        let packet = Self {
            player_id: r.get_u64()?,
        };
        r.finish()?;
        Ok(packet)
    }

    fn write(&self, alloc: &mut SendBufferAllocator) -> Result<Bytes, PacketError> {
        encode_frame(alloc, Self::PROTOCOL, DEFAULT_RESERVE, |w| {
            w.put_u64(self.player_id)
        })
    }
}

/// One row of [`SPlayerList`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerEntry {
    /// Set on the row describing the receiving player.
    pub is_self: bool,
    pub player_id: u64,
    pub pos: [f32; 3],
}

/// Everyone currently in the room, sent to a player on entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SPlayerList {
    pub players: Vec<PlayerEntry>,
}

impl Packet for SPlayerList {
    const PROTOCOL: u16 = PacketId::SPlayerList.id();

    fn read(frame: &[u8]) -> Result<Self, PacketError> {
        let mut r = PacketReader::new(frame, Self::PROTOCOL)?;
        let count = r.get_len()?;
        let mut players = Vec::with_capacity(count.min(r.remaining()));
        for _ in 0..count {
            players.push(PlayerEntry {
                is_self: r.get_bool()?,
                player_id: r.get_u64()?,
                pos: get_position(&mut r)?,
            });
        }
        r.finish()?;
        Ok(Self { players })
    }

    fn write(&self, alloc: &mut SendBufferAllocator) -> Result<Bytes, PacketError> {
        encode_frame(alloc, Self::PROTOCOL, DEFAULT_RESERVE, |w| {
            w.put_len(self.players.len())?;
            for player in &self.players {
                w.put_bool(player.is_self)?;
                w.put_u64(player.player_id)?;
                put_position(w, player.pos)?;
            }
            Ok(())
        })
    }
}

/// Client reports its new position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CMove {
    pub pos: [f32; 3],
}

impl Packet for CMove {
    const PROTOCOL: u16 = PacketId::CMove.id();

    fn read(frame: &[u8]) -> Result<Self, PacketError> {
        let mut r = PacketReader::new(frame, Self::PROTOCOL)?;
        let packet = Self {
            pos: get_position(&mut r)?,
        };
        r.finish()?;
        Ok(packet)
    }

    fn write(&self, alloc: &mut SendBufferAllocator) -> Result<Bytes, PacketError> {
        encode_frame(alloc, Self::PROTOCOL, DEFAULT_RESERVE, |w| {
            put_position(w, self.pos)
        })
    }
}

/// A player moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SBroadcastMove {
    pub player_id: u64,
    pub pos: [f32; 3],
}

impl Packet for SBroadcastMove {
    const PROTOCOL: u16 = PacketId::SBroadcastMove.id();

    fn read(frame: &[u8]) -> Result<Self, PacketError> {
        let mut r = PacketReader::new(frame, Self::PROTOCOL)?;
        let packet = Self {
            player_id: r.get_u64()?,
            pos: get_position(&mut r)?,
        };
        r.finish()?;
        Ok(packet)
    }

    fn write(&self, alloc: &mut SendBufferAllocator) -> Result<Bytes, PacketError> {
        encode_frame(alloc, Self::PROTOCOL, DEFAULT_RESERVE, |w| {
            w.put_u64(self.player_id)?;
            put_position(w, self.pos)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebula_net::FrameHeader;

    fn alloc() -> SendBufferAllocator {
        SendBufferAllocator::with_chunk_size(64 * 1024)
    }

    #[test]
    fn test_chat_layout() {
        let frame = CChat {
            chat: "hi".to_string(),
        }
        .write(&mut alloc())
        .unwrap();
        // header, u16 length, utf-8 bytes
        assert_eq!(&frame[..], &[8, 0, 1, 0, 2, 0, b'h', b'i']);
    }

    #[test]
    fn test_move_layout() {
        let frame = SBroadcastMove {
            player_id: 3,
            pos: [1.0, 2.0, 3.0],
        }
        .write(&mut alloc())
        .unwrap();
        let header = FrameHeader::parse(&frame).unwrap();
        assert_eq!(header.size, 4 + 8 + 12);
        assert_eq!(header.protocol, 8);
        assert_eq!(&frame[4..12], &3u64.to_le_bytes());
        assert_eq!(&frame[12..16], &1.0f32.to_le_bytes());
    }

    #[test]
    fn test_leave_game_is_header_only() {
        let frame = CLeaveGame.write(&mut alloc()).unwrap();
        assert_eq!(&frame[..], &[4, 0, 4, 0]);
        assert_eq!(CLeaveGame::read(&frame).unwrap(), CLeaveGame);
    }

    #[test]
    fn test_player_list_decodes_rows() {
        let list = SPlayerList {
            players: vec![
                PlayerEntry {
                    is_self: true,
                    player_id: 1,
                    pos: [0.0, 0.0, 0.0],
                },
                PlayerEntry {
                    is_self: false,
                    player_id: 2,
                    pos: [5.5, -1.0, 9.0],
                },
            ],
        };
        let frame = list.write(&mut alloc()).unwrap();
        assert_eq!(frame.len(), 4 + 2 + 2 * (1 + 8 + 12));
        assert_eq!(SPlayerList::read(&frame).unwrap(), list);
    }

    #[test]
    fn test_list_count_larger_than_payload_is_rejected() {
        // Claims 50 rows but carries none.
        let frame = [6u8, 0, 6, 0, 50, 0];
        assert!(matches!(
            SPlayerList::read(&frame),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn test_extra_bytes_after_fields_rejected() {
        // SBroadcastLeaveGame is 12 bytes; this one declares and carries 14.
        let mut frame = vec![14u8, 0, 5, 0];
        frame.extend_from_slice(&7u64.to_le_bytes());
        frame.extend_from_slice(&[1, 2]);
        assert_eq!(
            SBroadcastLeaveGame::read(&frame),
            Err(PacketError::TrailingBytes { remaining: 2 })
        );

        let leave = [6u8, 0, 4, 0, 0, 0];
        assert_eq!(
            CLeaveGame::read(&leave),
            Err(PacketError::TrailingBytes { remaining: 2 })
        );
    }

    #[test]
    fn test_wrong_protocol_rejected() {
        let frame = CChat {
            chat: "x".to_string(),
        }
        .write(&mut alloc())
        .unwrap();
        assert!(matches!(
            SChat::read(&frame),
            Err(PacketError::ProtocolMismatch {
                expected: 2,
                found: 1
            })
        ));
    }
}
