use std::sync::Arc;

use crate::error::SyncError;
use crate::event::{normalize_batch, NormalizedBatch, RawRecord};
use crate::BoxFuture;

/// Bulk query service holding recent chat records.
///
/// Implementations own transport and authentication; a payload in the wrong
/// shape should be reported as [`SyncError::SourceUnavailable`] (see
/// [`crate::wire::parse_history_response`]).
pub trait HistorySource: Send + Sync + 'static {
    fn fetch_records(&self) -> BoxFuture<'_, Result<Vec<RawRecord>, SyncError>>;
}

#[derive(Clone)]
pub struct HistoricalFetcher {
    source: Arc<dyn HistorySource>,
}

impl std::fmt::Debug for HistoricalFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoricalFetcher").finish_non_exhaustive()
    }
}

impl HistoricalFetcher {
    pub fn new(source: Arc<dyn HistorySource>) -> Self {
        Self { source }
    }

    /// One-shot fetch. Undecodable records are set aside in `rejected`.
    pub async fn fetch_history(&self) -> Result<NormalizedBatch, SyncError> {
        let records = self.source.fetch_records().await?;
        let total = records.len();
        let batch = normalize_batch(records);
        if !batch.rejected.is_empty() {
            tracing::warn!(
                total,
                rejected = batch.rejected.len(),
                "history records dropped during decode"
            );
        }
        tracing::info!(events = batch.events.len(), "history fetched");
        Ok(batch)
    }
}
