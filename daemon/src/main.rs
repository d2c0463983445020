//! Typhoon daemon: mirrors the Typhoon contract into a local LMDB store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use typhoon_chain::{RpcChainReader, RpcReaderConfig};
use typhoon_reconciler::{
    init_logging, resolve_token_decimals, ReconcilerConfig, ReconcilerHandle, ReconcilerMetrics,
    Scheduler, SchedulerSettings, ShutdownController,
};
use typhoon_rpc::{ApiServer, ApiState};
use typhoon_store_lmdb::environment::DEFAULT_MAP_SIZE;
use typhoon_store_lmdb::{check_data_dir, check_integrity, LmdbStore};

#[derive(Parser)]
#[command(name = "typhoon-daemon", about = "Typhoon chain-to-mirror reconciliation daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base; CLI
    /// flags and env vars override them.
    #[arg(long, env = "TYPHOON_CONFIG")]
    config: Option<PathBuf>,

    /// Node endpoint; ws:// or wss:// uses a socket with HTTP fallback.
    #[arg(long, env = "TYPHOON_RPC_URL")]
    rpc_url: Option<String>,

    #[arg(long, env = "TYPHOON_HTTP_FALLBACK_URL")]
    http_fallback_url: Option<String>,

    #[arg(long, env = "TYPHOON_CONTRACT_ADDRESS")]
    contract_address: Option<String>,

    #[arg(long, env = "TYPHOON_PAYMENT_TOKEN_ADDRESS")]
    payment_token_address: Option<String>,

    /// Skip reading decimals() from the payment token.
    #[arg(long, env = "TYPHOON_TOKEN_DECIMALS")]
    token_decimals: Option<u8>,

    #[arg(long, env = "TYPHOON_START_BLOCK")]
    start_block: Option<u64>,

    #[arg(long, env = "TYPHOON_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    #[arg(long, env = "TYPHOON_MAX_BLOCK_RANGE")]
    max_block_range: Option<u64>,

    #[arg(long, env = "TYPHOON_CONFIRMATIONS")]
    confirmations: Option<u64>,

    #[arg(long, env = "TYPHOON_RPC_TIMEOUT_MS")]
    rpc_timeout_ms: Option<u64>,

    #[arg(long, env = "TYPHOON_BACKOFF_INITIAL_MS")]
    backoff_initial_ms: Option<u64>,

    #[arg(long, env = "TYPHOON_BACKOFF_MAX_MS")]
    backoff_max_ms: Option<u64>,

    #[arg(long, env = "TYPHOON_GUARD_CAPACITY")]
    guard_capacity: Option<usize>,

    #[arg(long, env = "TYPHOON_MAX_LAG_BLOCKS")]
    max_lag_blocks: Option<u64>,

    /// Data directory for the mirror store.
    #[arg(long, env = "TYPHOON_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, env = "TYPHOON_API_PORT")]
    api_port: Option<u16>,

    /// "human" or "json".
    #[arg(long, env = "TYPHOON_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "TYPHOON_LOG_LEVEL")]
    log_level: Option<String>,

    /// Leave the reconciler stopped until POST /reconciler/start.
    #[arg(long, env = "TYPHOON_NO_AUTOSTART")]
    no_autostart: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Clone, Copy, PartialEq, Eq, Debug)]
enum Command {
    /// Run the reconciler and the HTTP API until SIGINT/SIGTERM.
    Run,
    /// Validate the merged configuration and print it as TOML.
    CheckConfig,
}

impl Cli {
    /// Layer flags and env vars over `base`.
    fn merge_into(&self, base: ReconcilerConfig) -> ReconcilerConfig {
        let mut c = base;
        if let Some(v) = &self.rpc_url {
            c.rpc_url = v.clone();
        }
        if self.http_fallback_url.is_some() {
            c.http_fallback_url = self.http_fallback_url.clone();
        }
        if self.contract_address.is_some() {
            c.contract_address = self.contract_address.clone();
        }
        if self.payment_token_address.is_some() {
            c.payment_token_address = self.payment_token_address.clone();
        }
        if self.token_decimals.is_some() {
            c.token_decimals = self.token_decimals;
        }
        c.start_block = self.start_block.unwrap_or(c.start_block);
        c.poll_interval_ms = self.poll_interval_ms.unwrap_or(c.poll_interval_ms);
        c.max_block_range = self.max_block_range.unwrap_or(c.max_block_range);
        c.confirmations = self.confirmations.unwrap_or(c.confirmations);
        c.rpc_timeout_ms = self.rpc_timeout_ms.unwrap_or(c.rpc_timeout_ms);
        c.backoff_initial_ms = self.backoff_initial_ms.unwrap_or(c.backoff_initial_ms);
        c.backoff_max_ms = self.backoff_max_ms.unwrap_or(c.backoff_max_ms);
        c.guard_capacity = self.guard_capacity.unwrap_or(c.guard_capacity);
        c.max_lag_blocks = self.max_lag_blocks.unwrap_or(c.max_lag_blocks);
        if let Some(v) = &self.data_dir {
            c.data_dir = v.clone();
        }
        c.api_port = self.api_port.unwrap_or(c.api_port);
        if let Some(v) = &self.log_format {
            c.log_format = v.clone();
        }
        if let Some(v) = &self.log_level {
            c.log_level = v.clone();
        }
        if self.no_autostart {
            c.autostart = false;
        }
        c
    }

    fn load_config(&self) -> anyhow::Result<ReconcilerConfig> {
        let base = match &self.config {
            Some(path) => {
                let path = path.to_string_lossy();
                ReconcilerConfig::from_toml_file(&path)
                    .with_context(|| format!("loading config {path}"))?
            }
            None => ReconcilerConfig::default(),
        };
        Ok(self.merge_into(base))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_logging(config.log_format()?, &config.log_level)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;
    config.validate().context("invalid configuration")?;

    match cli.command {
        Command::CheckConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

async fn run(config: ReconcilerConfig) -> anyhow::Result<()> {
    check_data_dir(&config.data_dir).map_err(anyhow::Error::msg)?;
    let store = Arc::new(
        LmdbStore::open(&config.data_dir, DEFAULT_MAP_SIZE).context("opening mirror store")?,
    );
    let integrity = check_integrity(&store)?;
    if !integrity.is_healthy() {
        bail!("mirror store failed integrity check: {}", integrity.errors.join("; "));
    }

    let contract = config.contract()?;
    let chain = Arc::new(RpcChainReader::connect(&RpcReaderConfig {
        rpc_url: config.rpc_url.clone(),
        http_fallback_url: config.http_fallback_url.clone(),
        contract,
        confirmations: config.confirmations,
        call_timeout: config.rpc_timeout(),
    })?);
    let decimals = resolve_token_decimals(&config, store.as_ref(), chain.as_ref()).await?;

    tracing::info!(
        %contract,
        rpc_url = %config.rpc_url,
        data_dir = %config.data_dir.display(),
        api_port = config.api_port,
        decimals,
        "starting Typhoon daemon"
    );

    let metrics = Arc::new(ReconcilerMetrics::new()?);
    let settings = SchedulerSettings::from_config(&config);
    let handle = Arc::new(ReconcilerHandle::new(Scheduler::new(
        store, chain, settings, metrics,
    )));
    if config.autostart {
        handle.start().await;
    }

    let shutdown = ShutdownController::new();
    let mut api_shutdown = shutdown.subscribe();
    let server = ApiServer::new(config.api_port);
    let api_state = Arc::new(ApiState::new(Arc::clone(&handle), decimals));
    let mut api_task = tokio::spawn(async move {
        server
            .serve(api_state, async move {
                let _ = api_shutdown.recv().await;
            })
            .await
    });

    let api_exit = tokio::select! {
        _ = shutdown.wait_for_signal() => None,
        result = &mut api_task => Some(result),
    };

    tracing::info!("shutdown requested, stopping reconciler");
    handle.stop().await;

    let api_result = match api_exit {
        Some(result) => result,
        None => api_task.await,
    };
    match api_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => bail!("API server failed: {e}"),
        Err(e) => bail!("API server task panicked: {e}"),
    }

    tracing::info!("Typhoon daemon exited cleanly");
    Ok(())
}
