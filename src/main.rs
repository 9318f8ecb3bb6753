//! IB Engine - event replay driver
//!
//! Reads [`IbEvent`]s as JSON lines (from `--events <file>` or stdin), feeds
//! them through [`IbService`] and prints one JSON outcome per line.
//!
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌──────────────┐    ┌──────────┐
//! │  Events  │───▶│ IbService │───▶│ Chain / Plan │───▶│  Wallet  │
//! │ (JSONL)  │    │ (dispatch)│    │ / Calculator │    │  Ledger  │
//! └──────────┘    └───────────┘    └──────────────┘    └──────────┘
//! ```
//!
//! Without `postgres_url` in the config everything lives in memory for the
//! duration of the run.

use anyhow::Context;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use ib_engine::config::AppConfig;
use ib_engine::logging::init_logging;
use ib_engine::{
    IbEvent, IbService, InMemoryMainWallet, MemoryStore, PgMainWallet, PgStore, ServiceStores,
};

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn get_events_path() -> Option<String> {
    get_arg(&["--events"])
}

#[derive(Debug, Default)]
struct ReplayStats {
    handled: u64,
    rejected: u64,
    malformed: u64,
}

async fn build_stores(config: &AppConfig) -> anyhow::Result<ServiceStores> {
    match &config.postgres_url {
        Some(url) => {
            let store = Arc::new(PgStore::connect(url).await?);
            store.init_schema().await?;
            let main_wallet = Arc::new(PgMainWallet::new(store.pool().clone()));
            Ok(ServiceStores {
                directory: store.clone(),
                plans: store.clone(),
                ledger: store,
                main_wallet,
            })
        }
        None => {
            info!("No postgres_url configured, using in-memory store");
            Ok(ServiceStores::memory(
                Arc::new(MemoryStore::new()),
                Arc::new(InMemoryMainWallet::new()),
            ))
        }
    }
}

async fn replay<R: AsyncBufRead + Unpin>(
    service: &IbService,
    reader: R,
) -> anyhow::Result<ReplayStats> {
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: IbEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "Malformed event skipped");
                stats.malformed += 1;
                continue;
            }
        };

        let kind = event.kind();
        let output = match service.handle(event).await {
            Ok(outcome) => {
                stats.handled += 1;
                json!({ "line": line_no, "event": kind, "ok": true, "outcome": outcome })
            }
            Err(e) => {
                stats.rejected += 1;
                json!({
                    "line": line_no,
                    "event": kind,
                    "ok": false,
                    "code": e.code(),
                    "error": e.to_string(),
                })
            }
        };
        println!("{}", output);
    }

    Ok(stats)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config =
        AppConfig::load(&env).with_context(|| format!("loading config for env '{}'", env))?;
    let _log_guard = init_logging(&app_config);

    info!(
        build = env!("IB_ENGINE_BUILD_REV"),
        "Starting IB engine in {} mode",
        env
    );

    let stores = build_stores(&app_config).await?;
    let service = IbService::new(&app_config, stores);

    let stats = match get_events_path() {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("opening events file {}", path))?;
            replay(&service, BufReader::new(file)).await?
        }
        None => replay(&service, BufReader::new(tokio::io::stdin())).await?,
    };

    info!(
        handled = stats.handled,
        rejected = stats.rejected,
        malformed = stats.malformed,
        "Replay finished"
    );
    Ok(())
}
