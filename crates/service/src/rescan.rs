use std::sync::Arc;
use std::time::SystemTime;

use catalog::{
    build_catalog, merge_locations, CatalogError, CatalogStore, ScanStats, SearchIndex,
};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::service::{CatalogState, ServiceError};

#[derive(Clone, Debug)]
pub enum ScanStatus {
    Idle,
    Scanning { started: SystemTime },
}

pub(crate) enum ScanRequest {
    Full,
    Merge(Vec<String>),
    Remove(String),
}

type ScanOutcome = Result<ScanStats, String>;

struct QueuedScan {
    request: ScanRequest,
    reply: oneshot::Sender<ScanOutcome>,
}

pub(crate) struct ScanContext {
    pub(crate) state: Arc<RwLock<CatalogState>>,
    pub(crate) store: CatalogStore,
    pub(crate) config: Arc<RwLock<ServiceConfig>>,
}

// All catalog mutation funnels through the one scanning task. Requests
// queued while a scan runs are drained together and served by the single
// scan that follows it.
#[derive(Clone)]
pub struct ScanCoordinator {
    tx: mpsc::UnboundedSender<QueuedScan>,
    status: Arc<RwLock<ScanStatus>>,
}

impl ScanCoordinator {
    pub(crate) fn spawn(ctx: ScanContext) -> ScanCoordinator {
        let (tx, rx) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(ScanStatus::Idle));
        let loop_status = Arc::clone(&status);
        tokio::spawn(async move {
            run(rx, loop_status, ctx).await;
        });
        ScanCoordinator { tx, status }
    }

    pub fn status(&self) -> ScanStatus {
        self.status.read().clone()
    }

    // Queue a request and wait for the batch it lands in to finish.
    pub(crate) async fn scan(&self, request: ScanRequest) -> Result<ScanStats, ServiceError> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(QueuedScan { request, reply })
            .map_err(|_| ServiceError::ScanQueueClosed)?;
        match done.await {
            Ok(Ok(stats)) => Ok(stats),
            Ok(Err(message)) => Err(ServiceError::Scan(message)),
            Err(_) => Err(ServiceError::ScanQueueClosed),
        }
    }

    pub(crate) fn schedule(&self, request: ScanRequest) {
        let (reply, _done) = oneshot::channel();
        if self.tx.send(QueuedScan { request, reply }).is_err() {
            warn!("Scan queue closed; request dropped");
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<QueuedScan>,
    status: Arc<RwLock<ScanStatus>>,
    ctx: ScanContext,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(queued) = rx.try_recv() {
            batch.push(queued);
        }
        let plan = fold_requests(batch.iter().map(|queued| &queued.request));

        *status.write() = ScanStatus::Scanning {
            started: SystemTime::now(),
        };
        let outcome = run_batch(&ctx, &plan).await;
        *status.write() = ScanStatus::Idle;

        match &outcome {
            Ok(stats) => info!(
                "Catalog scan finished: {} files seen, {} merged, {} skipped",
                stats.scanned, stats.added, stats.skipped
            ),
            Err(err) => warn!("Catalog scan failed: {}", err),
        }
        for queued in batch {
            let _ = queued.reply.send(outcome.clone());
        }
    }
}

struct ScanPlan {
    full: bool,
    removals: Vec<String>,
    merges: Vec<String>,
}

// A full rebuild subsumes queued merges and removals because it starts from
// the current location list, which the requesters already updated.
fn fold_requests<'a, I>(requests: I) -> ScanPlan
where
    I: IntoIterator<Item = &'a ScanRequest>,
{
    let mut plan = ScanPlan {
        full: false,
        removals: Vec::new(),
        merges: Vec::new(),
    };
    for request in requests {
        match request {
            ScanRequest::Full => plan.full = true,
            ScanRequest::Merge(roots) => {
                for root in roots {
                    if !plan.merges.contains(root) {
                        plan.merges.push(root.clone());
                    }
                }
            }
            ScanRequest::Remove(root) => {
                if !plan.removals.contains(root) {
                    plan.removals.push(root.clone());
                }
            }
        }
    }
    if plan.full {
        plan.merges.clear();
        plan.removals.clear();
    }
    plan
}

async fn run_batch(ctx: &ScanContext, plan: &ScanPlan) -> ScanOutcome {
    if !plan.removals.is_empty() {
        let mut state = ctx.state.write();
        for root in &plan.removals {
            let dropped = state.catalog.remove_location(root);
            info!("Unlinked location {}: {} songs removed", root, dropped);
        }
        state.index = SearchIndex::build(&state.catalog);
    }

    let stats = if plan.full {
        rebuild(ctx).await?
    } else if !plan.merges.is_empty() {
        merge_roots(ctx, plan.merges.clone()).await?
    } else {
        ScanStats::default()
    };

    let flat = ctx.state.read().catalog.flatten();
    if let Err(err) = ctx.store.save_snapshot(&flat) {
        warn!("Failed to persist catalog snapshot: {}", err);
    }
    Ok(stats)
}

// Scans off-lock into a fresh catalog, then swaps it in.
async fn rebuild(ctx: &ScanContext) -> ScanOutcome {
    let (locations, options) = {
        let config = ctx.config.read();
        (config.locations.clone(), config.scan_options())
    };
    let store = ctx.store.clone();
    let built =
        tokio::task::spawn_blocking(move || build_catalog(&locations, &options, &store)).await;
    match built {
        Ok(Ok((catalog, stats))) => {
            let index = SearchIndex::build(&catalog);
            let mut state = ctx.state.write();
            state.catalog = catalog;
            state.index = index;
            Ok(stats)
        }
        Ok(Err(err)) => Err(err.to_string()),
        Err(err) => Err(format!("scan worker failed: {}", err)),
    }
}

// Merges into a copy of the current catalog off-lock, then swaps. The
// coordinator is the only writer, so nothing can change under the copy.
async fn merge_roots(ctx: &ScanContext, roots: Vec<String>) -> ScanOutcome {
    let options = ctx.config.read().scan_options();
    let mut catalog = ctx.state.read().catalog.clone();
    let store = ctx.store.clone();
    let merged = tokio::task::spawn_blocking(move || {
        let stats = merge_locations(&mut catalog, &roots, &options, &store)?;
        Ok::<_, CatalogError>((catalog, stats))
    })
    .await;
    match merged {
        Ok(Ok((catalog, stats))) => {
            let index = SearchIndex::build(&catalog);
            let mut state = ctx.state.write();
            state.catalog = catalog;
            state.index = index;
            Ok(stats)
        }
        Ok(Err(err)) => Err(err.to_string()),
        Err(err) => Err(format!("scan worker failed: {}", err)),
    }
}
