// Session lifecycle: history seed, polling task, submit surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::error::SubmitError;
use crate::event::Event;
use crate::history::{HistoricalFetcher, HistorySource};
use crate::poller::{run_polling_loop, IncrementalPoller, LedgerRpc};
use crate::relay::{Relay, SubmissionReceipt};
use crate::signer::WalletSigner;
use crate::submit::{ContractCallBuilder, Draft, SubmitPipeline, SubmitStage};
use crate::timeline::{Timeline, TimelineStore};

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct SessionServices {
    pub history: Arc<dyn HistorySource>,
    pub rpc: Arc<dyn LedgerRpc>,
    pub signer: Arc<dyn WalletSigner>,
    pub relay: Arc<dyn Relay>,
}

/// Who is posting: the user's wallet contract and signing key. Owned by the wallet collaborator; either field may be
/// absent until the user logs in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub contract_id: Option<String>,
    pub key_reference: Option<String>,
}

pub struct ChatSession {
    config: SyncConfig,
    identity: SessionIdentity,
    store: Arc<TimelineStore>,
    pipeline: SubmitPipeline,
    epoch: Arc<AtomicU64>,
    shutdown: Arc<Notify>,
    poll_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("identity", &self.identity)
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Seed the timeline from history, then start polling on the current runtime.
    ///
    /// A failed history fetch leaves the timeline empty; polling still starts
    /// and fills in the recent window.
    pub async fn start(
        config: SyncConfig,
        services: SessionServices,
        identity: SessionIdentity,
    ) -> Self {
        tracing::info!(
            back_window = config.back_window_ledgers,
            poll_interval_secs = config.poll_interval().as_secs(),
            "start_session"
        );

        let store = Arc::new(TimelineStore::new());
        match HistoricalFetcher::new(services.history.clone())
            .fetch_history()
            .await
        {
            Ok(batch) => store.seed(batch.events),
            Err(err) => tracing::warn!(%err, "history unavailable, starting empty"),
        }

        let pipeline = SubmitPipeline::new(
            ContractCallBuilder::new(
                config.chat_contract_id.clone(),
                config.contract_function.clone(),
            ),
            services.signer,
            services.relay,
        );

        let epoch = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(Notify::new());
        let poller = IncrementalPoller::new(services.rpc, config.back_window_ledgers);
        let poll_task = tokio::spawn(run_polling_loop(
            poller,
            store.clone(),
            epoch.clone(),
            0,
            config.poll_interval(),
            shutdown.clone(),
        ));

        Self {
            config,
            identity,
            store,
            pipeline,
            epoch,
            shutdown,
            poll_task: Some(poll_task),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn timeline(&self) -> watch::Receiver<Arc<Timeline>> {
        self.store.subscribe()
    }

    pub fn current(&self) -> Arc<Timeline> {
        self.store.current()
    }

    pub fn set_identity(&mut self, identity: SessionIdentity) {
        self.identity = identity;
    }

    /// Send `body` as the session identity.
    ///
    /// Success means the relay accepted the transaction; the message appears
    /// in the timeline once a later poll picks it up.
    pub async fn submit(&self, body: impl Into<String>) -> Result<SubmissionReceipt, SubmitError> {
        let draft = Draft {
            recipient_contract: self.identity.contract_id.clone(),
            body: body.into(),
            key_reference: self.identity.key_reference.clone(),
        };
        self.pipeline.submit(draft).await
    }

    /// Explorer link for the transaction that recorded `event`.
    pub fn explorer_url(&self, event: &Event) -> String {
        event.explorer_url(&self.config.explorer_tx_url)
    }

    pub fn submit_stage(&self) -> watch::Receiver<SubmitStage> {
        self.pipeline.subscribe_stage()
    }

    pub fn is_sending(&self) -> bool {
        self.pipeline.guard().is_in_flight()
    }

    pub fn is_running(&self) -> bool {
        self.poll_task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel polling. Idempotent.
    pub fn stop(&mut self) {
        let Some(task) = self.poll_task.take() else {
            return;
        };
        // Invalidate results of any poll still in flight, then cancel it so a
        // hung RPC call does not keep the task alive.
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.shutdown.notify_one();
        task.abort();
        tracing::info!("stop_session");
    }

    /// Like [`ChatSession::stop`], but waits for the polling task to exit.
    pub async fn shutdown(mut self) {
        let task = self.poll_task.take();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.shutdown.notify_one();
        if let Some(task) = task {
            task.abort();
            match task.await {
                Err(err) if !err.is_cancelled() => {
                    tracing::warn!(%err, "polling task ended abnormally");
                }
                _ => {}
            }
        }
        tracing::info!("stop_session");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.stop();
    }
}
