//! Room server on top of `nebula-net`: every client joins one shared room
//! whose chat and movement are relayed to all players.

pub mod client_session;
pub mod room;
pub mod session_manager;

pub use client_session::{ClientSession, ServerContext};
pub use room::{GameRoom, SPAWN_POSITION, schedule_flush};
pub use session_manager::SessionManager;
