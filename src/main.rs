//! txinclude - include one configured transaction on an EVM chain
//!
//! Signs the transaction from `[transaction]`, keeps it submitted until it is
//! included, and stops cleanly on Ctrl-C or SIGTERM.

use alloy::consensus::TxEip1559;
use alloy::primitives::utils::format_ether;
use alloy::primitives::TxKind;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use txinclude::config::Settings;
use txinclude::metrics::{self, MetricsServer, PrometheusObserver};
use txinclude::tx::{IsthmusCostOracle, Signer};
use txinclude::{Budget, Persistent, PkSigner, ReliableEl, RpcEl, TxBudget, UnincludedTx};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting txinclude v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    let block_time = settings.include.block_time();

    let rpc = RpcEl::new(&settings.rpc.url, settings.rpc.request_timeout())?;
    let chain_id = rpc.chain_id().await.context("Failed to fetch chain id")?;

    let key = std::env::var(&settings.wallet.private_key_env).with_context(|| {
        format!("Private key variable {} is not set", settings.wallet.private_key_env)
    })?;
    let signer = PkSigner::from_hex(key.trim(), chain_id)?;
    let start_nonce = rpc
        .pending_nonce(signer.address())
        .await
        .context("Failed to fetch pending nonce")?;
    info!(
        "Sending from {} on chain {} starting at nonce {}",
        signer.address(),
        chain_id,
        start_nonce
    );

    let cancel = CancellationToken::new();

    // Budget, with the OP Stack cost oracle when configured
    let budget = Arc::new(Budget::new(settings.include.budget()?));
    metrics::record_budget_balance(budget.balance());
    let mut tx_budget = TxBudget::new(budget.clone());
    if settings.include.op_stack_cost_oracle {
        let oracle = Arc::new(IsthmusCostOracle::new(rpc.clone(), block_time));
        if let Err(e) = oracle.refresh().await {
            warn!("Initial cost params unavailable: {}", e);
        }
        tokio::spawn({
            let oracle = oracle.clone();
            let cancel = cancel.clone();
            async move { oracle.run(cancel).await }
        });
        tx_budget = tx_budget.with_op_cost_oracle(oracle);
    }
    info!("Budget: {} ETH", format_ether(budget.balance()));

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let el = ReliableEl::new(Arc::new(rpc), block_time).with_observer(Arc::new(PrometheusObserver));
    let persistent = Persistent::new(signer, Arc::new(el), start_nonce).with_budget(tx_budget);

    let tx_config = &settings.transaction;
    let tx = UnincludedTx::from(TxEip1559 {
        chain_id,
        to: TxKind::Call(tx_config.to),
        value: tx_config.value()?,
        input: tx_config.data.clone(),
        gas_limit: tx_config.gas_limit,
        max_fee_per_gas: tx_config.max_fee_per_gas()?,
        max_priority_fee_per_gas: tx_config.max_priority_fee_per_gas()?,
        ..Default::default()
    });

    // Cancel on shutdown signal
    let signal_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping...");
            cancel.cancel();
        }
    });

    let result = persistent.include(tx, &cancel).await;

    cancel.cancel();
    signal_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    let included = result?;
    info!(
        "Transaction {} included in block {} (status {}, paid {} ETH)",
        included.receipt.transaction_hash,
        included.receipt.block_number,
        if included.receipt.status { "success" } else { "reverted" },
        format_ether(included.receipt.settled_cost())
    );
    info!("Remaining budget: {} ETH", format_ether(budget.balance()));
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,txinclude=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
