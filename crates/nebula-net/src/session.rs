//! One TCP connection: lifecycle, receive loop and send loop.
//!
//! A [`Session`] owns its socket once [`Session::start`] hands it over. Two
//! tasks then drive it:
//!
//! - the receive task reads into a [`RecvBuffer`], offers the unread window to
//!   [`SessionHandler::on_received`] and advances the read cursor by whatever
//!   the handler consumed;
//! - the send task waits until [`Session::send`] queues data, drains the whole
//!   queue into one vectored write, reports it through
//!   [`SessionHandler::on_sent`] and repeats while new data keeps arriving.
//!
//! Every failure on either side ends in [`Session::disconnect`], which runs
//! its shutdown sequence exactly once.
//!
//! ```text
//! Created ──start──► Started ──disconnect──► Disconnecting ──io tasks done──► Disconnected
//!    └───────────────────────disconnect (never started)──────────────────────────┘
//! ```

use std::fmt;
use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, watch};

use crate::error::SessionError;
use crate::framing::{FrameConfig, MAX_FRAME_SIZE};
use crate::packet::Packet;
use crate::platform::{SocketConfig, configure_stream};
use crate::recv_buffer::RecvBuffer;
use crate::send_buffer::SendBufferAllocator;

/// Identifier of a session, unique per [`IdGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Atomic generator for monotonically increasing [`SessionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`SessionId`].
    pub fn next_id(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no socket attached yet.
    Created,
    /// Socket attached, receive and send tasks running.
    Started,
    /// Disconnect requested, I/O tasks winding down.
    Disconnecting,
    /// Both I/O tasks have exited and the socket is closed.
    Disconnected,
}

/// Per-session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Fixed capacity of the receive buffer. Default: 65536.
    pub recv_buffer_size: usize,
    /// Largest frame accepted from the peer, header included. Default: 65535.
    pub max_frame_size: usize,
    /// Options applied to the socket on start.
    pub socket: SocketConfig,
}

impl SessionConfig {
    /// Framing limits for this session.
    ///
    /// A frame must fit the receive buffer in one piece, so the maximum frame
    /// size is clamped to the buffer capacity.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size.min(self.recv_buffer_size),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 64 * 1024,
            max_frame_size: MAX_FRAME_SIZE,
            socket: SocketConfig::default(),
        }
    }
}

/// Callbacks through which content code observes a session.
///
/// Callbacks run on the session's I/O tasks and should not block; long work
/// belongs on a [`JobQueue`](crate::JobQueue).
pub trait SessionHandler: Send + Sync + 'static {
    /// The session has started and is ready to send.
    fn on_connected(&self, _session: &Arc<Session>, _peer: SocketAddr) {}

    /// New data arrived. `window` is every byte received and not yet
    /// consumed; return how many leading bytes were fully consumed.
    ///
    /// Returning an error, or a count larger than `window`, disconnects.
    fn on_received(&self, session: &Arc<Session>, window: &[u8]) -> Result<usize, SessionError>;

    /// `len` bytes were written to the socket.
    fn on_sent(&self, _session: &Arc<Session>, _len: usize) {}

    /// The session is disconnecting. Called once, never for a session that
    /// was not started.
    fn on_disconnected(&self, _session: &Arc<Session>, _peer: SocketAddr) {}
}

#[derive(Default)]
struct SendQueue {
    pending: Vec<Bytes>,
    in_flight: bool,
}

/// One TCP connection and its I/O tasks.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    handler: Arc<dyn SessionHandler>,
    state: watch::Sender<SessionState>,
    disconnected: AtomicBool,
    peer_addr: OnceLock<SocketAddr>,
    send_queue: Mutex<SendQueue>,
    send_ready: Notify,
    io_tasks: AtomicUsize,
}

impl Session {
    /// Create a session in the [`SessionState::Created`] state.
    pub fn new(id: SessionId, config: SessionConfig, handler: Arc<dyn SessionHandler>) -> Arc<Self> {
        Arc::new(Self {
            id,
            config,
            handler,
            state: watch::Sender::new(SessionState::Created),
            disconnected: AtomicBool::new(false),
            peer_addr: OnceLock::new(),
            send_queue: Mutex::new(SendQueue::default()),
            send_ready: Notify::new(),
            io_tasks: AtomicUsize::new(0),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the session is started and not yet disconnecting.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Started
    }

    /// Remote address, known once the session has been started.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr.get().copied()
    }

    /// Attach `stream`, fire `on_connected` and spawn the I/O tasks.
    ///
    /// Must be called from within a Tokio runtime, exactly once.
    pub fn start(self: &Arc<Self>, stream: TcpStream) -> Result<(), SessionError> {
        let peer = stream.peer_addr()?;
        configure_stream(&stream, &self.config.socket)?;
        let _ = self.peer_addr.set(peer);

        let started = self.state.send_if_modified(|state| {
            if *state == SessionState::Created {
                *state = SessionState::Started;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(match self.state() {
                SessionState::Started => SessionError::AlreadyStarted,
                _ => SessionError::Disconnected,
            });
        }

        self.io_tasks.store(2, Ordering::Release);
        tracing::debug!(session = %self.id, %peer, "session started");
        self.handler.on_connected(self, peer);

        let (reader, writer) = stream.into_split();
        tokio::spawn(Arc::clone(self).recv_loop(reader));
        tokio::spawn(Arc::clone(self).send_loop(writer));
        Ok(())
    }

    /// Queue `segment` for sending.
    ///
    /// Segments go out in call order. If no flush is in flight the send task
    /// is woken; otherwise the running flush picks the segment up.
    pub fn send(&self, segment: Bytes) -> Result<(), SessionError> {
        self.send_many([segment])
    }

    /// Queue several segments at once, in iteration order.
    pub fn send_many(&self, segments: impl IntoIterator<Item = Bytes>) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Created => return Err(SessionError::NotStarted),
            SessionState::Started => {}
            SessionState::Disconnecting | SessionState::Disconnected => {
                return Err(SessionError::Disconnected);
            }
        }

        let mut queue = self.send_queue.lock();
        let before = queue.pending.len();
        queue.pending.extend(segments);
        if queue.pending.len() == before {
            return Ok(());
        }
        if !queue.in_flight {
            queue.in_flight = true;
            drop(queue);
            self.send_ready.notify_one();
        }
        Ok(())
    }

    /// Encode `packet` with `alloc` and queue it.
    pub fn send_packet<P: Packet>(
        &self,
        packet: &P,
        alloc: &mut SendBufferAllocator,
    ) -> Result<(), SessionError> {
        let segment = packet.write(alloc)?;
        self.send(segment)
    }

    /// Close the session. Only the first call has any effect.
    ///
    /// A started session fires `on_disconnected` and moves to
    /// [`SessionState::Disconnecting`]; its I/O tasks then shut the socket
    /// down and the state becomes [`SessionState::Disconnected`].
    pub fn disconnect(self: &Arc<Self>) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }

        let previous = self.state.send_replace(SessionState::Disconnecting);
        if previous == SessionState::Created {
            self.state.send_replace(SessionState::Disconnected);
            return;
        }

        if let Some(peer) = self.peer_addr() {
            tracing::info!(session = %self.id, %peer, "session disconnected");
            self.handler.on_disconnected(self, peer);
        }
    }

    /// Wait until the session has fully disconnected.
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|state| *state == SessionState::Disconnected)
            .await;
    }

    async fn recv_loop(self: Arc<Self>, mut reader: OwnedReadHalf) {
        let mut buffer = RecvBuffer::new(self.config.recv_buffer_size);
        let mut state = self.state.subscribe();

        let result: Result<(), SessionError> = loop {
            buffer.compact();
            if buffer.free_size() == 0 {
                break Err(SessionError::RecvBufferFull {
                    capacity: buffer.capacity(),
                });
            }

            let read = tokio::select! {
                read = reader.read(buffer.write_segment()) => Some(read),
                _ = wait_closing(&mut state) => None,
            };

            let n = match read {
                None => break Ok(()),
                Some(Ok(0)) => {
                    tracing::debug!(session = %self.id, "peer closed the connection");
                    break Ok(());
                }
                Some(Ok(n)) => n,
                Some(Err(e)) => break Err(e.into()),
            };

            if let Err(e) = self.process_received(&mut buffer, n) {
                break Err(e);
            }
        };

        if let Err(e) = result {
            tracing::warn!(session = %self.id, error = %e, "receive failed");
        }
        self.disconnect();
        self.io_task_finished();
    }

    fn process_received(
        self: &Arc<Self>,
        buffer: &mut RecvBuffer,
        n: usize,
    ) -> Result<(), SessionError> {
        if !buffer.on_write(n) {
            return Err(SessionError::RecvBufferFull {
                capacity: buffer.capacity(),
            });
        }

        let available = buffer.data_size();
        let consumed = self.handler.on_received(self, buffer.read_segment())?;
        if consumed > available || !buffer.on_read(consumed) {
            return Err(SessionError::OverConsumed {
                consumed,
                available,
            });
        }
        Ok(())
    }

    async fn send_loop(self: Arc<Self>, mut writer: OwnedWriteHalf) {
        let mut state = self.state.subscribe();

        let result: Result<(), SessionError> = loop {
            let woken = tokio::select! {
                _ = self.send_ready.notified() => true,
                _ = wait_closing(&mut state) => false,
            };
            if !woken {
                break Ok(());
            }
            if let Err(e) = self.flush(&mut writer, &mut state).await {
                break Err(e);
            }
        };

        if let Err(e) = result {
            tracing::warn!(session = %self.id, error = %e, "send failed");
        }
        self.disconnect();
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(session = %self.id, error = %e, "socket shutdown failed");
        }
        self.io_task_finished();
    }

    /// Write queued segments until the queue is observed empty.
    async fn flush(
        self: &Arc<Self>,
        writer: &mut OwnedWriteHalf,
        state: &mut watch::Receiver<SessionState>,
    ) -> Result<(), SessionError> {
        loop {
            let batch = {
                let mut queue = self.send_queue.lock();
                if queue.pending.is_empty() {
                    queue.in_flight = false;
                    return Ok(());
                }
                std::mem::take(&mut queue.pending)
            };
            let total: usize = batch.iter().map(Bytes::len).sum();

            tokio::select! {
                written = write_all_vectored(writer, &batch) => written?,
                _ = wait_closing(state) => return Ok(()),
            }

            tracing::trace!(session = %self.id, segments = batch.len(), bytes = total, "flushed");
            self.handler.on_sent(self, total);
        }
    }

    fn io_task_finished(&self) {
        if self.io_tasks.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.send_replace(SessionState::Disconnected);
            tracing::debug!(session = %self.id, "session closed");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("peer_addr", &self.peer_addr())
            .finish()
    }
}

/// Resolve once the session leaves [`SessionState::Started`].
async fn wait_closing(state: &mut watch::Receiver<SessionState>) {
    let _ = state
        .wait_for(|state| *state != SessionState::Started)
        .await;
}

/// Write every byte of `batch`, in order, using vectored writes.
async fn write_all_vectored(writer: &mut OwnedWriteHalf, batch: &[Bytes]) -> io::Result<()> {
    let mut index = 0;
    let mut offset = 0;

    loop {
        while index < batch.len() && offset == batch[index].len() {
            index += 1;
            offset = 0;
        }
        if index == batch.len() {
            return Ok(());
        }

        let slices: Vec<IoSlice<'_>> = std::iter::once(&batch[index][offset..])
            .chain(batch[index + 1..].iter().map(|segment| &segment[..]))
            .map(IoSlice::new)
            .collect();

        let mut written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }

        while written > 0 {
            let rest = batch[index].len() - offset;
            if written < rest {
                offset += written;
                written = 0;
            } else {
                written -= rest;
                index += 1;
                offset = 0;
            }
        }
    }
}
