//! Asynchronous TCP connection engine: sessions, framing, accept/connect and
//! the serialized-execution primitives game logic builds on.

pub mod connector;
pub mod error;
pub mod framing;
pub mod job_queue;
pub mod job_timer;
pub mod listener;
pub mod lock;
pub mod packet;
pub mod packet_session;
pub mod platform;
pub mod recv_buffer;
pub mod routing;
pub mod send_buffer;
pub mod session;

pub use connector::{Connector, ConnectorConfig};
pub use error::{FrameError, PacketError, SendBufferError, SessionError};
pub use framing::{FrameConfig, FrameHeader, HEADER_SIZE, MAX_FRAME_SIZE, slice_frames};
pub use job_queue::{Job, JobQueue};
pub use job_timer::{JobTimer, ManualClock, MonotonicClock, TickSource};
pub use listener::{Listener, ListenerConfig, SessionFactory};
pub use lock::{Lock, ReadGuard, SpinPolicy, WriteGuard};
pub use packet::{DEFAULT_RESERVE, Packet, PacketReader, PacketWriter, encode_frame};
pub use packet_session::{PacketHandler, PacketSession};
pub use platform::{SocketConfig, configure_stream, create_listener, resolve};
pub use recv_buffer::RecvBuffer;
pub use routing::PacketRouter;
pub use send_buffer::SendBufferAllocator;
pub use session::{IdGenerator, Session, SessionConfig, SessionHandler, SessionId, SessionState};
