mod api;
mod gateway;
#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use warelay_channels::whatsapp::{self, WhatsAppChannel};
use warelay_core::config::{self, Config};
use warelay_providers::webhook::WebhookResponder;

#[derive(Parser)]
#[command(
    name = "warelay",
    version,
    about = "warelay: WhatsApp to webhook relay"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair (if needed) and start relaying messages.
    Start,
    /// Show the effective configuration and whether a session is stored.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let notice = missing_config_notice(&cli.config);
    let mut cfg = config::load(&cli.config)?;
    cfg.apply_env_overrides()?;

    match cli.command {
        Commands::Start => {
            let _guard = init_logging(&cfg)?;
            if let Some(notice) = notice {
                tracing::info!("{notice}");
            }
            cfg.validate()?;

            let session_dir = cfg.session_dir();
            if whatsapp::session_exists(&session_dir) {
                tracing::info!("resuming stored WhatsApp session");
            } else {
                tracing::info!("no stored session, a pairing code will be issued");
            }

            let channel = Arc::new(WhatsAppChannel::new(cfg.whatsapp.clone(), session_dir));
            let responder = Arc::new(WebhookResponder::from_config(&cfg.webhook)?);

            println!("warelay: starting relay...");
            let gw = gateway::Gateway::new(channel, responder, &cfg);
            gw.run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for ctrl-c: {e}");
                    std::future::pending::<()>().await;
                }
            })
            .await?;
        }
        Commands::Status => print_status(&cli.config, &cfg),
    }

    Ok(())
}

/// Reported once logging is up, since `config::load` runs before it.
fn missing_config_notice(path: &str) -> Option<String> {
    if Path::new(path).exists() {
        None
    } else {
        Some(format!("Config file not found at {path}, using defaults"))
    }
}

/// Stdout plus a daily-rotated file under `{data_dir}/logs`.
///
/// `RUST_LOG` wins over `relay.log_level`. The returned guard must live
/// until exit so buffered file output is flushed.
fn init_logging(cfg: &Config) -> anyhow::Result<WorkerGuard> {
    let logs_dir = cfg.logs_dir();
    std::fs::create_dir_all(&logs_dir)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.relay.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::daily(&logs_dir, "warelay.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    Ok(guard)
}

fn print_status(config_path: &str, cfg: &Config) {
    println!("warelay status\n");
    println!(
        "Config: {config_path}{}",
        if Path::new(config_path).exists() {
            ""
        } else {
            " (not found, using defaults)"
        }
    );
    println!("Name: {}", cfg.relay.name);
    println!("Data dir: {}", cfg.data_dir().display());
    println!();

    println!("  webhook: {} (timeout {}s)", cfg.webhook.url, cfg.webhook.timeout_secs);
    println!(
        "  whatsapp: {}",
        if whatsapp::session_exists(&cfg.session_dir()) {
            "paired"
        } else {
            "not paired (run `warelay start` and scan the QR code)"
        }
    );
    if cfg.whatsapp.allowed_users.is_empty() {
        println!("  allowed users: everyone");
    } else {
        println!("  allowed users: {}", cfg.whatsapp.allowed_users.join(", "));
    }
    println!(
        "  reconnect: {}s base delay, {} attempts",
        cfg.reconnect.base_delay_secs, cfg.reconnect.max_attempts
    );
    if cfg.api.enabled {
        println!(
            "  api: http://{}:{} (auth {})",
            cfg.api.host,
            cfg.api.port,
            if cfg.api.api_key.is_empty() {
                "disabled"
            } else {
                "enabled"
            }
        );
    } else {
        println!("  api: disabled");
    }

    if let Err(e) = cfg.validate() {
        println!();
        println!("  config problem: {e}");
    }
}
