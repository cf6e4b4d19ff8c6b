//! WhatsApp MCP bridge server.
//!
//! Persists the linked account's message stream into a local SQLite
//! archive, fans message events out to registered webhooks, and serves MCP
//! tool calls over Streamable HTTP. Configuration comes from environment
//! variables; authentication state lives under `./data`.

use std::io::Write;

use chrono::Local;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use whatsapp_mcp::{app, config::Config, paths, protocol};

/// Writes every log line to stderr and, when available, the rolling
/// `whatsapp.log` in the data directory.
struct TeeWriter {
    file: Option<std::fs::File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = std::io::stderr().write(buf)?;
        if let Some(file) = &mut self.file {
            let _ = file.write_all(&buf[..written]);
        }
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        if let Some(file) = &mut self.file {
            file.flush()?;
        }
        Ok(())
    }
}

fn init_logging() {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths::WHATSAPP_LOG_PATH)
        .ok();

    let level = match std::env::var("LOG_LEVEL")
        .unwrap_or_default()
        .to_uppercase()
        .as_str()
    {
        "DEBUG" => "debug",
        "WARN" => "warn",
        "ERROR" => "error",
        _ => "info",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(TeeWriter {
            file: log_file,
        })))
        .init();
}

fn main() {
    if let Err(e) = paths::ensure_data_directories() {
        eprintln!("Failed to create data directories: {e}");
        std::process::exit(1);
    }
    init_logging();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to build tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env();
    info!("Log level: {}", config.log_level);
    info!("Timezone: {}", config.timezone);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let (port, events) = protocol::attach().await?;

    info!("WhatsApp MCP running. Press Ctrl+C to stop.");
    app::run(config, port, events, cancel).await
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to install SIGTERM handler: {e}");
                        let _ = ctrl_c.await;
                        cancel.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("Shutdown signal received");
        cancel.cancel();
    });
}
