//! Load generator: opens many sessions to the room server and keeps them
//! chatting and moving.

mod server_session;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use nebula_config::{CliArgs, Config};
use nebula_net::{
    Connector, PacketSession, SendBufferAllocator, Session, SessionHandler, resolve,
};
use nebula_protocol::{CChat, CMove};
use rand::Rng;
use tokio::time::MissedTickBehavior;

use crate::server_session::{ClientContext, ServerSession};

/// A chat line goes out every this many move ticks.
const CHAT_EVERY: u64 = 4;

#[derive(Debug, thiserror::Error)]
enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no session could connect to {0}")]
    NoSessions(String),
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config_dir = args.config_dir();

    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {e}");
            Config::default()
        }
    };
    config.apply_cli_overrides(&args);

    nebula_log::init_logging(
        Some(&config_dir.join("logs")),
        config.debug.log_to_file,
        Some(&config),
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "dummy client stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), ClientError> {
    let addr = resolve(&config.client.host, config.client.port).await?;
    let ctx = ClientContext::new();

    let factory_ctx = Arc::clone(&ctx);
    let connector = Connector::new(config.client.connector_config(), move || {
        Arc::new(PacketSession::new(ServerSession::new(Arc::clone(&factory_ctx))))
            as Arc<dyn SessionHandler>
    });

    let mut sessions = connector.connect(addr, config.client.sessions).await;
    if sessions.is_empty() {
        return Err(ClientError::NoSessions(addr.to_string()));
    }
    tracing::info!(
        %addr,
        connected = sessions.len(),
        requested = config.client.sessions,
        "dummy sessions up"
    );

    let mut alloc = SendBufferAllocator::with_chunk_size(config.room.send_chunk_size);
    let mut interval = tokio::time::interval(config.client.send_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                ticks += 1;
                sessions.retain(|session| session.is_connected());
                if sessions.is_empty() {
                    tracing::warn!("all sessions closed");
                    break;
                }
                send_round(&sessions, &mut alloc, ticks);
                if ticks % 20 == 0 {
                    tracing::info!(
                        sessions = sessions.len(),
                        received = ctx.stats.total(),
                        "traffic"
                    );
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("shutting down");
                break;
            }
        }
    }

    for session in &sessions {
        session.disconnect();
    }
    for session in &sessions {
        session.closed().await;
    }
    Ok(())
}

/// One move per session, plus a chat line every [`CHAT_EVERY`] rounds.
fn send_round(sessions: &[Arc<Session>], alloc: &mut SendBufferAllocator, tick: u64) {
    for session in sessions {
        let sent = session
            .send_packet(&CMove { pos: random_position() }, alloc)
            .and_then(|()| {
                if tick % CHAT_EVERY == 0 {
                    let chat = CChat {
                        chat: format!("Hello from {}", session.id()),
                    };
                    session.send_packet(&chat, alloc)
                } else {
                    Ok(())
                }
            });
        if let Err(e) = sent {
            tracing::debug!(session = %session.id(), error = %e, "send skipped");
        }
    }
}

fn random_position() -> [f32; 3] {
    let mut rng = rand::rng();
    [
        rng.random_range(-50.0..50.0),
        0.0,
        rng.random_range(-50.0..50.0),
    ]
}
