use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shield::config::{BackendKind, ShieldConfig};
use shield::{Limiter, RedisLimiter};

/// Deadline for releasing limiter resources on exit.
const CLOSE_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "shield", version, about = "Sliding-window rate limiter")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "SHIELD_CONFIG")]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run admissions for an identifier and print each outcome
    Check {
        identifier: String,
        /// Number of admissions to attempt
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Show how many events are inside an identifier's window (Redis only)
    Inspect { identifier: String },
    /// Clear an identifier's window (Redis only)
    Reset { identifier: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ShieldConfig::load(cli.config.as_deref()).context("loading configuration")?;
    info!(
        limit = config.limiter.limit,
        window = ?config.limiter.window,
        backend = ?config.backend.kind,
        "Configuration loaded"
    );

    match cli.command {
        Command::Check { identifier, count } => {
            if identifier.is_empty() {
                bail!("identifier must not be empty");
            }
            let limiter = config.build_limiter().await?;
            let result = check(&limiter, &identifier, count, config.backend.request_timeout()).await;

            if let Err(e) = limiter.close(CLOSE_DEADLINE).await {
                warn!(error = %e, "Limiter did not close cleanly");
            }
            result
        }
        Command::Inspect { identifier } => {
            let limiter = redis_limiter(&config).await?;
            let count = limiter.inspect(&identifier).await?;
            println!("{}", serde_json::json!({ "key": limiter.key_for(&identifier), "events": count }));
            Ok(())
        }
        Command::Reset { identifier } => {
            let limiter = redis_limiter(&config).await?;
            let existed = limiter.reset(&identifier).await?;
            println!("{}", serde_json::json!({ "key": limiter.key_for(&identifier), "existed": existed }));
            Ok(())
        }
    }
}

async fn check(
    limiter: &Arc<dyn Limiter>,
    identifier: &str,
    count: u32,
    deadline: Duration,
) -> anyhow::Result<()> {
    for _ in 0..count {
        let outcome = limiter.allow_within(identifier, deadline).await?;
        println!("{}", serde_json::to_string(&outcome)?);
    }
    Ok(())
}

async fn redis_limiter(config: &ShieldConfig) -> anyhow::Result<RedisLimiter> {
    if config.backend.kind != BackendKind::Redis {
        bail!("inspect and reset require the redis backend");
    }
    let url = config
        .backend
        .redis_url
        .as_deref()
        .context("redis backend requires redis_url")?;

    let limiter = RedisLimiter::connect(url, config.limiter)
        .await?
        .with_prefix(config.backend.key_prefix.clone());
    Ok(limiter)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Outcomes go to stdout; keep logs on stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
