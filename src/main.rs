// DEX matcher node - entry point
// Assembles the context, recovers persisted state and serves until ctrl-c.

use dex_matcher::node::{MatcherContext, MemoryBlockchain, MemoryUtxPool, NoScriptRunner, SystemClock};
use dex_matcher::script::SMART_ACCOUNT_TRADING_FEATURE;
use dex_matcher::settings::MatcherSettings;
use dex_matcher::supervisor::Matcher;
use dex_matcher::KeyPair;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let settings = match MatcherSettings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let Some(seed_hex) = settings.matcher_seed_hex.clone() else {
        error!("MATCHER_SEED is required");
        std::process::exit(1);
    };
    let wallet = match KeyPair::from_hex_seed(&seed_hex) {
        Ok(wallet) => wallet,
        Err(err) => {
            error!(error = %err, "invalid MATCHER_SEED");
            std::process::exit(1);
        }
    };

    let db = match sled::open(&settings.data_dir) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, path = ?settings.data_dir, "cannot open data directory");
            std::process::exit(1);
        }
    };

    // Standalone mode: in-memory collaborators stand in for the node's UTX
    // pool, blockchain view and script engine.
    let blockchain = Arc::new(MemoryBlockchain::new(1));
    if let Some(height) = settings.smart_account_trading_height {
        blockchain.activate_feature(SMART_ACCOUNT_TRADING_FEATURE, height);
    }

    let ctx = match MatcherContext::new(
        settings,
        Arc::new(SystemClock),
        wallet,
        db,
        Arc::new(MemoryUtxPool::new()),
        blockchain,
        Arc::new(NoScriptRunner),
    ) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(error = %err, "failed to assemble matcher context");
            std::process::exit(1);
        }
    };

    info!(
        matcher = %ctx.wallet.public_key().address(),
        "matcher node started"
    );

    let matcher = Matcher::new(ctx.clone());
    let cleanup = matcher.spawn_cleanup_timer();

    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    info!("shutdown signal received, flushing state");
    cleanup.abort();
    if let Err(err) = ctx.db.flush() {
        error!(error = %err, "final flush failed");
    }
}
