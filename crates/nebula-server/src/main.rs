//! Dedicated room server: accepts game clients and relays their chat and
//! movement to everyone in the room.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use nebula_config::{CliArgs, Config, ConfigError};
use nebula_net::{JobTimer, Listener, PacketSession, SessionHandler};
use nebula_server::{ClientSession, GameRoom, ServerContext, schedule_flush};
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
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
            tracing::error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), ServerError> {
    let listener_config = config.server.listener_config()?;

    let timer = Arc::new(JobTimer::new());
    let room = GameRoom::new(config.room.send_chunk_size);
    schedule_flush(&room, &timer, config.room.flush_interval_ticks);

    let ctx = ServerContext::new(room);
    let factory_ctx = Arc::clone(&ctx);
    let listener = Listener::bind(listener_config, move || {
        Arc::new(PacketSession::new(ClientSession::new(Arc::clone(&factory_ctx))))
            as Arc<dyn SessionHandler>
    })
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tick = config.room.timer_tick();
    let driver_timer = Arc::clone(&timer);
    let driver = tokio::spawn(async move { driver_timer.run(tick, shutdown_rx).await });

    tracing::info!(addr = %listener.local_addr(), "server ready");
    tokio::signal::ctrl_c().await?;

    tracing::info!(sessions = ctx.sessions.len(), "shutting down");
    listener.shutdown().await;
    ctx.sessions.disconnect_all();
    let _ = shutdown_tx.send(true);
    if let Err(e) = driver.await {
        tracing::warn!(error = %e, "timer task failed");
    }
    Ok(())
}
