// Incremental ledger polling + the recurring task that drives it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::checkpoint::{CheckpointTracker, LedgerWindow};
use crate::error::SyncError;
use crate::event::{normalize_batch, Event, NormalizedBatch, RawRecord, RejectedRecord};
use crate::timeline::TimelineStore;
use crate::BoxFuture;

/// The ledger RPC calls the poller needs.
pub trait LedgerRpc: Send + Sync + 'static {
    fn latest_ledger_sequence(&self) -> BoxFuture<'_, Result<u32, SyncError>>;

    /// Chat events emitted in `window`, inclusive on both ends.
    fn get_events(&self, window: LedgerWindow)
        -> BoxFuture<'_, Result<Vec<RawRecord>, SyncError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub head: u32,
    pub window: LedgerWindow,
    pub events: Vec<Event>,
    pub rejected: Vec<RejectedRecord>,
}

pub struct IncrementalPoller {
    rpc: Arc<dyn LedgerRpc>,
    checkpoint: CheckpointTracker,
}

impl std::fmt::Debug for IncrementalPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalPoller")
            .field("checkpoint", &self.checkpoint)
            .finish_non_exhaustive()
    }
}

impl IncrementalPoller {
    pub fn new(rpc: Arc<dyn LedgerRpc>, back_window: u32) -> Self {
        Self {
            rpc,
            checkpoint: CheckpointTracker::new(back_window),
        }
    }

    pub fn checkpoint(&self) -> &CheckpointTracker {
        &self.checkpoint
    }

    /// Fetch and decode the events of one window. Does not touch the checkpoint.
    pub async fn poll(&self, window: LedgerWindow) -> Result<NormalizedBatch, SyncError> {
        let records = self.rpc.get_events(window).await?;
        Ok(normalize_batch(records))
    }

    /// One tick: resolve head, poll the checkpoint window, then advance.
    ///
    /// On error the checkpoint is left where it was so the next tick asks for
    /// the same range again.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, SyncError> {
        let head = self.rpc.latest_ledger_sequence().await?;
        let window = self.checkpoint.window(head);
        let batch = self.poll(window).await?;
        self.checkpoint.advance(head);

        Ok(PollOutcome {
            head,
            window,
            events: batch.events,
            rejected: batch.rejected,
        })
    }
}

/// Drive `poller` every `period` until `shutdown` fires or `epoch` moves past `my_epoch`.
///
/// A poll that completes after the epoch moved has its result dropped instead
/// of reaching the store; the session also aborts the task on stop.
pub(crate) async fn run_polling_loop(
    mut poller: IncrementalPoller,
    store: Arc<TimelineStore>,
    epoch: Arc<AtomicU64>,
    my_epoch: u64,
    period: Duration,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {}
        }
        if epoch.load(Ordering::SeqCst) != my_epoch {
            break;
        }

        match poller.poll_once().await {
            Ok(outcome) => {
                if epoch.load(Ordering::SeqCst) != my_epoch {
                    tracing::debug!(
                        from = outcome.window.from,
                        to = outcome.window.to,
                        "discarding poll result from a stopped session"
                    );
                    break;
                }
                if !outcome.rejected.is_empty() {
                    tracing::warn!(
                        rejected = outcome.rejected.len(),
                        "ledger events dropped during decode"
                    );
                }
                tracing::debug!(
                    from = outcome.window.from,
                    to = outcome.window.to,
                    events = outcome.events.len(),
                    "poll ok"
                );
                store.update(outcome.events);
            }
            Err(err) => {
                // Transient by assumption; the next tick retries the same window.
                tracing::warn!(
                    %err,
                    checkpoint = ?poller.checkpoint().current(),
                    "poll failed"
                );
            }
        }
    }

    tracing::debug!(epoch = my_epoch, "polling stopped");
}
