//! 🚀 esx-cli — the front door. Parses flags, loads config, sets up logging, wires ctrl-c
//! to the cancellation token, and lets the library do the scrolling. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 📜 Export documents from an Elasticsearch index to NDJSON.
#[derive(Debug, Parser)]
#[command(name = "esx", version, about)]
struct Args {
    /// Config file (TOML). Env vars with the ESX_ prefix are merged underneath it.
    #[arg(default_value = "esx.toml")]
    config: PathBuf,

    /// Output file, overriding [output].file_name
    #[arg(short, long)]
    output: Option<String>,

    /// Stop after this many documents
    #[arg(long)]
    max_docs: Option<u64>,

    /// Gzip the output
    #[arg(long)]
    gzip: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // -- a missing default file is fine (env-only config); a missing explicit one is still
    // -- reported by figment when required keys don't show up
    let config_file = args
        .config
        .try_exists()
        .with_context(|| format!("💀 Could not check whether '{}' exists", args.config.display()))?
        .then_some(args.config.as_path());

    let mut app_config = esx::app_config::load_config(config_file)
        .context("💀 Couldn't load the configuration. Take a look at the file and the ESX_* env vars.")?;
    if let Some(output) = args.output {
        app_config.output.file_name = output;
    }
    if args.max_docs.is_some() {
        app_config.output.max_docs = args.max_docs;
    }
    if args.gzip {
        app_config.output.gzip = true;
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 ctrl-c: aborting the export and releasing the scroll");
            on_ctrl_c.cancel();
        }
    });

    match esx::run(app_config, cancel).await {
        Ok(summary) => {
            info!(
                "✅ {} docs exported ({} matched) in {} pages of {}",
                summary.emitted, summary.total_matches, summary.pages, summary.page_size
            );
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            let mut looks_like_connectivity = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause = cause.to_string();
                if cause.contains("error sending request")
                    || cause.contains("onnection refused")
                    || cause.contains("tcp connect error")
                    || cause.contains("dns error")
                {
                    looks_like_connectivity = true;
                }
            }
            if looks_like_connectivity {
                error!(
                    "🔧 hint: Elasticsearch doesn't seem to be reachable. Check [elasticsearch].url, \
                     and if it runs in Docker, `docker ps` is a good place to start. ☕"
                );
            }
            std::process::exit(1);
        }
    }
}
