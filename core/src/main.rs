// Copyright 2025 Zelana Labs
// Licensed under the Apache License, Version 2.0

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use basis_config::BasisConfig;
use basis_tracker::config::{load_or_create_keypair, record_filter, tracker_id};
use basis_tracker::reconciler::{JsonDirSource, Reconciler, ReconcilerService, ServiceConfig};
use basis_tracker::storage::{RocksDbStore, SharedStore};
use basis_tracker::tracker::{StoreAnchorSink, Tracker, TrackerLedger};
use basis_tracker::now_ms;
use log::{error, info, warn};

const DEFAULT_KEYPAIR_PATH: &str = "./tracker.key";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Basis tracker starting...");

    let config = BasisConfig::global();

    let store: SharedStore = Arc::new(
        RocksDbStore::open(&config.database.path)
            .with_context(|| format!("Failed to open database at {}", config.database.path))?,
    );
    info!("Database opened at {}", config.database.path);

    let keypair_path = PathBuf::from(
        config
            .tracker
            .keypair_path
            .as_deref()
            .unwrap_or(DEFAULT_KEYPAIR_PATH),
    );
    let keypair = load_or_create_keypair(&keypair_path)?;
    let id = tracker_id(config, &keypair.public_key())?;

    let ledger = TrackerLedger::open(store.clone())?;

    let sink = Arc::new(StoreAnchorSink::new(store.clone()));
    let mut tracker = Tracker::new(keypair, id, ledger, sink);

    let filter = record_filter(config).context("Invalid reconciler configuration")?;
    let reconciler = Reconciler::open(
        store.clone(),
        JsonDirSource::new(&config.reconciler.chain_dir),
        filter,
        config.reconciler.start_height,
    )?;
    let reconciler = ReconcilerService::start(
        reconciler,
        ServiceConfig {
            poll_interval: Duration::from_millis(config.reconciler.poll_interval_ms),
            max_blocks_per_sync: config.reconciler.max_blocks_per_sync,
        },
    );
    info!("Reconciler watching {}", config.reconciler.chain_dir);

    let mut anchor_timer =
        tokio::time::interval(Duration::from_secs(config.tracker.anchor_interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = anchor_timer.tick() => {
                match tracker.publish_anchor(now_ms()) {
                    Ok(anchor) => info!(
                        "Anchored {} pairs at {}",
                        tracker.ledger().len(),
                        hex::encode(anchor.digest)
                    ),
                    Err(e) => error!("Anchor publication failed: {}", e),
                }

                let report = reconciler.current().solvency_report();
                info!(
                    "Solvency at {:?}: {} reserves, balance={} liabilities={}",
                    report.height,
                    report.reserves.len(),
                    report.total_balance,
                    report.total_liabilities
                );
                if report.insolvent > 0 {
                    warn!("{} reserves are under-collateralised", report.insolvent);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    reconciler.shutdown().await?;
    info!("Basis tracker stopped");
    Ok(())
}
