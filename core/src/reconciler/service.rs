use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use log::{error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::engine::{ReconcileError, Reconciler};
use super::index::IndexSnapshot;
use super::source::ChainSource;

#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub poll_interval: Duration,
    pub max_blocks_per_sync: u64,
}

/// Commands for the reconciler task
pub enum ReconcilerCommand {
    /// Sync immediately, replying with the number of blocks applied
    SyncNow(oneshot::Sender<Result<u64>>),
    /// Latest published snapshot
    Snapshot(oneshot::Sender<Arc<IndexSnapshot>>),
    Shutdown,
}

/// Async wrapper that owns the reconciler on its own task
pub struct ReconcilerService {
    command_tx: mpsc::Sender<ReconcilerCommand>,
    snapshots: Arc<ArcSwap<IndexSnapshot>>,
    handle: JoinHandle<()>,
}

async fn run_sync<C: ChainSource>(reconciler: &mut Reconciler<C>, max_blocks: u64) -> Result<u64> {
    match reconciler.sync(max_blocks).await {
        Ok(applied) => Ok(applied),
        Err(ReconcileError::Fetch { height, reason }) => {
            warn!("Fetch of block {} failed, will retry: {:#}", height, reason);
            Ok(0)
        }
        Err(e) => {
            error!("Reconciler error: {}", e);
            Err(e.into())
        }
    }
}

impl ReconcilerService {
    pub fn start<C>(mut reconciler: Reconciler<C>, config: ServiceConfig) -> Self
    where
        C: ChainSource + 'static,
    {
        let (command_tx, mut command_rx) = mpsc::channel::<ReconcilerCommand>(32);
        let snapshots = reconciler.snapshot_handle();

        let handle = tokio::spawn(async move {
            let mut poll = tokio::time::interval(config.poll_interval);
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    cmd = command_rx.recv() => {
                        match cmd {
                            Some(ReconcilerCommand::SyncNow(reply)) => {
                                let result = run_sync(&mut reconciler, config.max_blocks_per_sync).await;
                                let _ = reply.send(result);
                            }
                            Some(ReconcilerCommand::Snapshot(reply)) => {
                                let _ = reply.send(reconciler.snapshot());
                            }
                            Some(ReconcilerCommand::Shutdown) => {
                                break;
                            }
                            // every handle dropped
                            None => break,
                        }
                    }
                    _ = poll.tick() => {
                        let _ = run_sync(&mut reconciler, config.max_blocks_per_sync).await;
                    }
                }
            }
            info!("Reconciler stopped at watermark {:?}", reconciler.watermark());
        });

        Self {
            command_tx,
            snapshots,
            handle,
        }
    }

    pub async fn sync_now(&self) -> Result<u64> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(ReconcilerCommand::SyncNow(reply_tx))
            .await
            .context("reconciler service unavailable")?;
        reply_rx.await.context("reconciler service crashed")?
    }

    pub async fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(ReconcilerCommand::Snapshot(reply_tx))
            .await
            .context("reconciler service unavailable")?;
        reply_rx.await.context("reconciler service crashed")
    }

    /// Read the latest snapshot without going through the task
    pub fn current(&self) -> Arc<IndexSnapshot> {
        self.snapshots.load_full()
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.command_tx.send(ReconcilerCommand::Shutdown).await;
        self.handle.await.context("reconciler task panicked")
    }
}
