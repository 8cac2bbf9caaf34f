//! Accepting side: a pool of concurrent accept slots feeding new sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::platform::create_listener;
use crate::session::{IdGenerator, Session, SessionConfig, SessionHandler};

/// First pause after a failed accept.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
/// Longest pause between failed accepts.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Builds the handler for each new session.
pub type SessionFactory = Arc<dyn Fn() -> Arc<dyn SessionHandler> + Send + Sync>;

/// Configuration for [`Listener`].
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to. Default: `0.0.0.0:7777`.
    pub bind_addr: SocketAddr,
    /// Kernel accept backlog. Default: 10.
    pub backlog: u32,
    /// Number of accept operations kept outstanding at once. Default: 10.
    pub accept_pool: usize,
    /// Configuration for every accepted session.
    pub session: SessionConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7777)),
            backlog: 10,
            accept_pool: 10,
            session: SessionConfig::default(),
        }
    }
}

/// Bound listening socket with its accept slots running.
///
/// Dropping the listener stops accepting; sessions already started live on.
pub struct Listener {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    slots: JoinSet<()>,
    id_gen: Arc<IdGenerator>,
}

impl Listener {
    /// Bind `config.bind_addr` and start `config.accept_pool` accept slots.
    ///
    /// `factory` is invoked once per accepted connection.
    pub async fn bind<F>(config: ListenerConfig, factory: F) -> std::io::Result<Self>
    where
        F: Fn() -> Arc<dyn SessionHandler> + Send + Sync + 'static,
    {
        let listener = Arc::new(create_listener(
            config.bind_addr,
            &config.session.socket,
            config.backlog,
        )?);
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            backlog = config.backlog,
            accept_pool = config.accept_pool,
            "listening"
        );

        let factory: SessionFactory = Arc::new(factory);
        let id_gen = Arc::new(IdGenerator::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session_config = Arc::new(config.session);

        let mut slots = JoinSet::new();
        for slot in 0..config.accept_pool.max(1) {
            slots.spawn(accept_slot(
                slot,
                Arc::clone(&listener),
                Arc::clone(&factory),
                Arc::clone(&id_gen),
                Arc::clone(&session_config),
                shutdown_rx.clone(),
            ));
        }

        Ok(Self {
            local_addr,
            shutdown_tx,
            slots,
            id_gen,
        })
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Generator issuing ids to accepted sessions.
    pub fn id_generator(&self) -> &Arc<IdGenerator> {
        &self.id_gen
    }

    /// Stop all accept slots and wait for them to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        while self.slots.join_next().await.is_some() {}
        tracing::info!(addr = %self.local_addr, "listener stopped");
    }
}

/// Pause applied after consecutive accept failures, doubling up to a cap.
///
/// Errors such as EMFILE fail immediately on every retry, so a slot must
/// wait before re-arming.
#[derive(Debug)]
struct AcceptBackoff {
    next: Duration,
}

impl AcceptBackoff {
    fn new() -> Self {
        Self {
            next: ACCEPT_BACKOFF_MIN,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(ACCEPT_BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.next = ACCEPT_BACKOFF_MIN;
    }
}

/// Sleep for `delay` unless shutdown is signalled first.
///
/// Returns `false` when the slot should stop.
async fn pause_unless_shutdown(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
    }
}

/// One outstanding accept, re-armed after every completion.
async fn accept_slot(
    slot: usize,
    listener: Arc<TcpListener>,
    factory: SessionFactory,
    id_gen: Arc<IdGenerator>,
    config: Arc<SessionConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = AcceptBackoff::new();
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(slot, error = %e, retry_in = ?delay, "accept failed");
                        if !pause_unless_shutdown(delay, &mut shutdown_rx).await {
                            break;
                        }
                        continue;
                    }
                };
                backoff.reset();

                let session = Session::new(id_gen.next_id(), (*config).clone(), factory());
                match session.start(stream) {
                    Ok(()) => tracing::info!(session = %session.id(), %peer, slot, "accepted connection"),
                    Err(e) => tracing::warn!(%peer, error = %e, "failed to start accepted session"),
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    tracing::trace!(slot, "accept slot stopped");
}
