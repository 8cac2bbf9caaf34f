//! Chat/room message set shared by the server and dummy client.
//!
//! Every message implements [`nebula_net::Packet`]. `C_*` messages travel
//! client → server, `S_*` messages server → client.

mod packets;

pub use packets::{
    CChat, CLeaveGame, CMove, PlayerEntry, SBroadcastEnterGame, SBroadcastLeaveGame,
    SBroadcastMove, SChat, SPlayerList,
};

/// Protocol ids carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketId {
    CChat = 1,
    SChat = 2,
    SBroadcastEnterGame = 3,
    CLeaveGame = 4,
    SBroadcastLeaveGame = 5,
    SPlayerList = 6,
    CMove = 7,
    SBroadcastMove = 8,
}

impl PacketId {
    pub const ALL: [PacketId; 8] = [
        PacketId::CChat,
        PacketId::SChat,
        PacketId::SBroadcastEnterGame,
        PacketId::CLeaveGame,
        PacketId::SBroadcastLeaveGame,
        PacketId::SPlayerList,
        PacketId::CMove,
        PacketId::SBroadcastMove,
    ];

    pub const fn id(self) -> u16 {
        self as u16
    }

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|packet| packet.id() == id)
    }
}

impl From<PacketId> for u16 {
    fn from(id: PacketId) -> Self {
        id.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip() {
        for id in PacketId::ALL {
            assert_eq!(PacketId::from_id(id.id()), Some(id));
        }
        assert_eq!(PacketId::from_id(0), None);
        assert_eq!(PacketId::from_id(9), None);
    }

    #[test]
    fn test_ids_are_stable() {
        assert_eq!(u16::from(PacketId::CChat), 1);
        assert_eq!(u16::from(PacketId::SPlayerList), 6);
        assert_eq!(u16::from(PacketId::SBroadcastMove), 8);
    }
}
