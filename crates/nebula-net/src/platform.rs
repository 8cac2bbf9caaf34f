//! Socket creation and per-connection socket options.
//!
//! [`SocketConfig`] collects the options applied to every accepted or dialed
//! stream (TCP_NODELAY, keepalive) and to listening sockets (SO_REUSEADDR,
//! dual-stack IPv6). Listening sockets are built through `socket2` so the
//! accept backlog can be chosen explicitly.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener, TcpStream};

/// TCP socket options applied to every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm. Default: true.
    pub tcp_nodelay: bool,
    /// Enable TCP keepalive. Default: true.
    pub keepalive_enabled: bool,
    /// Idle time before the first keepalive probe. Default: 60s.
    pub keepalive_idle: Duration,
    /// Keepalive probe interval. Default: 10s.
    pub keepalive_interval: Duration,
    /// Probes before the connection is declared dead. Default: 3.
    pub keepalive_retries: u32,
    /// Enable `SO_REUSEADDR` on listening sockets. Default: true except on Windows.
    pub reuse_addr: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            keepalive_enabled: true,
            keepalive_idle: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(10),
            keepalive_retries: 3,
            reuse_addr: !cfg!(target_os = "windows"),
        }
    }
}

/// Apply `config` to a connected stream.
pub fn configure_stream(stream: &TcpStream, config: &SocketConfig) -> io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    if config.keepalive_enabled {
        let sock_ref = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(config.keepalive_idle)
            .with_interval(config.keepalive_interval);

        // Retry count is not configurable on macOS.
        #[cfg(any(target_os = "linux", target_os = "windows"))]
        let keepalive = keepalive.with_retries(config.keepalive_retries);

        sock_ref.set_tcp_keepalive(&keepalive)?;
    }

    Ok(())
}

/// Bind a listening socket on `addr` with an explicit accept `backlog`.
///
/// IPv6 addresses are bound dual-stack so IPv4 peers can connect too.
pub fn create_listener(
    addr: SocketAddr,
    config: &SocketConfig,
    backlog: u32,
) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    if config.reuse_addr {
        socket.set_reuse_address(true)?;
    }
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    TcpListener::from_std(socket.into())
}

/// Resolve `host:port` to the first matching socket address.
pub async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {host}:{port}"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_listener(config: &SocketConfig) -> (TcpListener, SocketAddr) {
        let listener = create_listener("127.0.0.1:0".parse().unwrap(), config, 10).unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_tcp_nodelay_is_set() {
        let config = SocketConfig::default();
        let (_listener, addr) = loopback_listener(&config).await;

        let client = TcpStream::connect(addr).await.unwrap();
        configure_stream(&client, &config).unwrap();

        assert!(client.nodelay().unwrap(), "TCP_NODELAY should be enabled");
    }

    #[tokio::test]
    async fn test_nodelay_disabled_when_configured() {
        let config = SocketConfig {
            tcp_nodelay: false,
            ..Default::default()
        };
        let (_listener, addr) = loopback_listener(&SocketConfig::default()).await;

        let client = TcpStream::connect(addr).await.unwrap();
        configure_stream(&client, &config).unwrap();

        assert!(!client.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_keepalive_is_configured() {
        let config = SocketConfig {
            keepalive_idle: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(5),
            ..Default::default()
        };
        let (_listener, addr) = loopback_listener(&config).await;

        let client = TcpStream::connect(addr).await.unwrap();
        configure_stream(&client, &config).unwrap();

        assert!(SockRef::from(&client).keepalive().unwrap());
    }

    #[tokio::test]
    async fn test_listener_accepts_several_pending_connections() {
        let config = SocketConfig::default();
        let (listener, addr) = loopback_listener(&config).await;

        let _c1 = TcpStream::connect(addr).await.unwrap();
        let _c2 = TcpStream::connect(addr).await.unwrap();

        let (s1, _) = listener.accept().await.unwrap();
        let (s2, _) = listener.accept().await.unwrap();
        configure_stream(&s1, &config).unwrap();
        configure_stream(&s2, &config).unwrap();
    }

    #[tokio::test]
    async fn test_ipv6_listener_when_available() {
        let config = SocketConfig::default();
        match create_listener("[::1]:0".parse().unwrap(), &config, 10) {
            Ok(listener) => {
                let addr = listener.local_addr().unwrap();
                assert!(TcpStream::connect(addr).await.is_ok());
            }
            Err(_) => eprintln!("IPv6 not available, skipping test"),
        }
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addr = resolve("127.0.0.1", 7777).await.unwrap();
        assert_eq!(addr, "127.0.0.1:7777".parse().unwrap());
    }

    #[test]
    fn test_reuse_addr_platform_default() {
        let config = SocketConfig::default();
        assert_eq!(config.reuse_addr, !cfg!(target_os = "windows"));
    }
}
