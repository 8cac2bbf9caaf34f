//! Dialing side: concurrent connects, one session per successful attempt.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpSocket;
use tokio::task::JoinSet;

use crate::listener::SessionFactory;
use crate::session::{IdGenerator, Session, SessionConfig, SessionHandler};

/// Configuration for [`Connector`].
#[derive(Debug, Clone, Default)]
pub struct ConnectorConfig {
    /// Configuration for every dialed session.
    pub session: SessionConfig,
}

/// Opens outbound sessions using a handler factory.
pub struct Connector {
    config: ConnectorConfig,
    factory: SessionFactory,
    id_gen: IdGenerator,
}

impl Connector {
    /// Create a connector; `factory` is invoked once per successful connect.
    pub fn new<F>(config: ConnectorConfig, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn SessionHandler> + Send + Sync + 'static,
    {
        Self {
            config,
            factory: Arc::new(factory),
            id_gen: IdGenerator::new(),
        }
    }

    /// Issue `count` concurrent connects to `addr`.
    ///
    /// Each attempt owns its socket. Successful attempts are started as
    /// sessions and returned; failures are logged and not retried.
    pub async fn connect(&self, addr: SocketAddr, count: usize) -> Vec<Arc<Session>> {
        let mut attempts = JoinSet::new();
        for attempt in 0..count {
            attempts.spawn(async move {
                let socket = if addr.is_ipv6() {
                    TcpSocket::new_v6()
                } else {
                    TcpSocket::new_v4()
                }?;
                let stream = socket.connect(addr).await?;
                Ok::<_, std::io::Error>((attempt, stream))
            });
        }

        let mut sessions = Vec::with_capacity(count);
        while let Some(joined) = attempts.join_next().await {
            let (attempt, stream) = match joined {
                Ok(Ok(connected)) => connected,
                Ok(Err(e)) => {
                    tracing::warn!(%addr, error = %e, "connect failed");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(%addr, error = %e, "connect task aborted");
                    continue;
                }
            };

            let session = Session::new(
                self.id_gen.next_id(),
                self.config.session.clone(),
                (self.factory)(),
            );
            match session.start(stream) {
                Ok(()) => {
                    tracing::info!(session = %session.id(), %addr, attempt, "connected");
                    sessions.push(session);
                }
                Err(e) => tracing::warn!(%addr, error = %e, "failed to start dialed session"),
            }
        }
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Counting {
        connected: AtomicUsize,
        received: Mutex<Vec<u8>>,
    }

    impl SessionHandler for Arc<Counting> {
        fn on_connected(&self, _session: &Arc<Session>, _peer: SocketAddr) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }

        fn on_received(&self, _session: &Arc<Session>, window: &[u8]) -> Result<usize, SessionError> {
            self.received.lock().extend_from_slice(window);
            Ok(window.len())
        }
    }

    fn connector(counting: &Arc<Counting>) -> Connector {
        let counting = Arc::clone(counting);
        Connector::new(ConnectorConfig::default(), move || {
            Arc::new(Arc::clone(&counting)) as Arc<dyn SessionHandler>
        })
    }

    #[tokio::test]
    async fn test_connect_opens_requested_sessions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counting = Arc::new(Counting::default());

        let accept = tokio::spawn(async move {
            let mut streams = Vec::new();
            for _ in 0..3 {
                streams.push(listener.accept().await.unwrap().0);
            }
            streams
        });

        let sessions = connector(&counting).connect(addr, 3).await;
        let mut streams = accept.await.unwrap();

        assert_eq!(sessions.len(), 3);
        assert_eq!(counting.connected.load(Ordering::SeqCst), 3);
        for session in &sessions {
            assert_eq!(session.peer_addr(), Some(addr));
        }

        streams[0].write_all(b"hi").await.unwrap();
        for _ in 0..200 {
            if counting.received.lock().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(&counting.received.lock()[..], b"hi");
    }

    #[tokio::test]
    async fn test_failed_connects_are_skipped() {
        // Bind then drop to find a port with nothing listening.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let counting = Arc::new(Counting::default());

        let sessions = connector(&counting).connect(addr, 2).await;
        assert!(sessions.is_empty());
        assert_eq!(counting.connected.load(Ordering::SeqCst), 0);
    }
}
