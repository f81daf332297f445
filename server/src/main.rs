use anyhow::Context;
use clap::Parser;
use devicecore::TiePolicy;
use log::info;
use service::config::ServerConfig;
use service::handle::SpecService;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;

mod api;
mod service;

#[derive(Parser)]
#[command(author, version, about = "Device detection-rate ingestion and ranking server")]
struct Args {
    /// Load the server config from YAML (overrides the flags below)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
    /// Persist records to this JSON-lines file instead of memory
    #[arg(long)]
    data_file: Option<PathBuf>,
    #[arg(long, default_value_t = 2_000)]
    store_timeout_ms: u64,
    /// How equal rates are ranked: shared or ordinal
    #[arg(long, default_value = "shared", value_parser = parse_tie_policy)]
    tie_policy: TiePolicy,
}

fn parse_tie_policy(value: &str) -> Result<TiePolicy, String> {
    match value {
        "shared" => Ok(TiePolicy::Shared),
        "ordinal" => Ok(TiePolicy::Ordinal),
        other => Err(format!("unknown tie policy `{other}` (expected shared or ordinal)")),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = if let Some(path) = args.config {
        ServerConfig::load(path)?
    } else {
        ServerConfig::from_args(
            args.bind,
            args.data_file,
            args.store_timeout_ms,
            args.tie_policy,
        )?
    };

    let service = SpecService::from_config(&config)?;
    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating server runtime")?;

    runtime.block_on(async {
        let (addr, server) = warp::serve(api::routes(service.clone()))
            .try_bind_with_graceful_shutdown(config.bind, async {
                if let Err(err) = signal::ctrl_c().await {
                    log::error!("waiting for Ctrl+C failed: {}", err);
                }
            })
            .with_context(|| format!("binding {}", config.bind))?;
        info!(
            "listening on {} (store {:?}, tie policy {:?}, store timeout {:?})",
            addr,
            config.store,
            config.tie_policy,
            config.store_timeout()
        );
        server.await;
        Ok::<(), anyhow::Error>(())
    })?;

    let metrics = service.metrics().snapshot();
    info!(
        "shutdown: ingested {} rejected {} rank queries {} ({} misses)",
        metrics.ingested, metrics.rejected, metrics.rank_queries, metrics.rank_misses
    );
    Ok(())
}
