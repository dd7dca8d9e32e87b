//! Application entry: wires config, wallet, RPC and relay clients into the
//! bundle engine, then submits a single memo bundle as a smoke test.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jito_bundler::config::Config;
use jito_bundler::engine::BundleEngine;
use jito_bundler::relay::JitoRelayClient;
use jito_bundler::rpc::{RpcAnchorSource, RpcLedgerClient};
use jito_bundler::tip_cache::TipFloorFeed;
use jito_bundler::types::CancelFlag;
use jito_bundler::wallet::WalletManager;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cfg = Config::load();
    cfg.validate()?;
    info!("Loaded config: {:?}", cfg);

    let wallet = Arc::new(WalletManager::from_config(&cfg)?);
    let anchors = Arc::new(RpcAnchorSource::new(cfg.rpc_endpoints.clone()));
    let ledger = Arc::new(RpcLedgerClient::new(cfg.rpc_endpoints[0].clone()));
    let relay = Arc::new(JitoRelayClient::new(cfg.block_engine_url.clone()));
    let tip_feed = Arc::new(TipFloorFeed::new(cfg.tip_feed_url.clone()));

    let engine = BundleEngine::new(wallet.clone(), anchors, relay, ledger, tip_feed, &cfg);

    let memo = spl_memo::build_memo(b"jito_bundler smoke test", &[&wallet.pubkey()]);
    let cancel = CancelFlag::new();

    match engine.submit_bundle(vec![memo], &cancel).await {
        Ok(report) => info!(
            bundle_id = %report.bundle_id,
            attempts = report.attempts,
            landed = report.confirmation.landed(),
            "bundle submission finished"
        ),
        Err(e) => error!(error = %e, "bundle submission failed"),
    }

    Ok(())
}

// SPL Memo helper
mod spl_memo {
    use solana_sdk::{
        instruction::{AccountMeta, Instruction},
        pubkey::Pubkey,
    };

    pub const MEMO_PROGRAM_ID: Pubkey =
        solana_sdk::pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

    pub fn build_memo(data: &[u8], signers: &[&Pubkey]) -> Instruction {
        let metas: Vec<AccountMeta> = signers
            .iter()
            .map(|&pk| AccountMeta::new_readonly(*pk, false))
            .collect();

        Instruction::new_with_bytes(MEMO_PROGRAM_ID, data, metas)
    }
}
