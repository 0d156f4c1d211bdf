//! The dispatch loop: scan the tracker, dedup, and run items on a bounded pool.

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, warn};
use uuid::Uuid;

use super::dedup::{DedupCache, DispatchRecord};
use super::gate::{WorkGate, WorkGuard};
use super::labels::{LabelNames, LabelStateMachine};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::ledger::ProcessedLedger;
use crate::model::{ExecutionResult, ItemId, ProcessedTag, WorkItem};
use crate::notify::{ArtifactNotice, DownstreamNotifier};
use crate::telemetry::{dispatch, metrics};
use crate::tracker::{DEFAULT_PAGE_SIZE, DEFAULT_STATUS_TYPES, ListFilter, TrackerClient};

/// Concurrent executions when the caller does not say otherwise.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Time between scans when the caller does not say otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for one poller instance (one tracker team or workspace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Team or workspace key the labels and items live in.
    pub scope: String,
    pub labels: LabelNames,
    /// Only dispatch items from these projects. Empty allows all.
    pub project_ids: Vec<String>,
    /// Workflow state types passed to the tracker filter.
    pub status_types: Vec<String>,
    /// Items requested per scan.
    pub page_size: usize,
    pub poll_interval: Duration,
    /// Upper bound on simultaneous executions. Clamped to at least 1.
    pub max_concurrent: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            scope: String::new(),
            labels: LabelNames::default(),
            project_ids: Vec::new(),
            status_types: DEFAULT_STATUS_TYPES.iter().map(|s| s.to_string()).collect(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl PollerConfig {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    /// Check required fields and normalize the rest.
    pub fn validate(mut self) -> Result<Self> {
        if self.scope.trim().is_empty() {
            return Err(Error::Config("poller scope must not be empty".to_string()));
        }
        for (role, name) in [
            ("trigger", &self.labels.trigger),
            ("in_progress", &self.labels.in_progress),
            ("done", &self.labels.done),
            ("failed", &self.labels.failed),
        ] {
            if name.trim().is_empty() {
                return Err(Error::Config(format!("{role} label name must not be empty")));
            }
        }
        if self.labels.is_status(&self.labels.trigger) {
            return Err(Error::Config(format!(
                "trigger label {:?} collides with a status label",
                self.labels.trigger
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".to_string()));
        }
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        self.max_concurrent = self.max_concurrent.max(1);
        Ok(self)
    }

    fn allows_project(&self, project: Option<&str>) -> bool {
        self.project_ids.is_empty()
            || project.is_some_and(|p| self.project_ids.iter().any(|id| id == p))
    }

    fn list_filter(&self) -> ListFilter {
        ListFilter {
            scope: self.scope.clone(),
            label: self.labels.trigger.clone(),
            project_ids: self.project_ids.clone(),
            status_types: self.status_types.clone(),
            limit: self.page_size,
        }
    }
}

/// Where a poller is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    /// Resolving labels.
    Starting,
    Running,
    /// No new work accepted; waiting for in-flight executions.
    Draining,
    Stopped,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lifecycle::Created => "created",
            Lifecycle::Starting => "starting",
            Lifecycle::Running => "running",
            Lifecycle::Draining => "draining",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Everything the poller talks to besides its configuration.
pub struct Collaborators {
    pub tracker: Arc<dyn TrackerClient>,
    pub executor: Arc<dyn Executor>,
    pub ledger: Option<Arc<dyn ProcessedLedger>>,
    pub notifier: Option<Arc<dyn DownstreamNotifier>>,
    /// Span the loop and workers log under. Defaults to a `poller` span
    /// carrying the scope and trigger label.
    pub span: Option<Span>,
}

impl Collaborators {
    pub fn new(tracker: Arc<dyn TrackerClient>, executor: Arc<dyn Executor>) -> Self {
        Self {
            tracker,
            executor,
            ledger: None,
            notifier: None,
            span: None,
        }
    }

    pub fn ledger(mut self, ledger: Arc<dyn ProcessedLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn DownstreamNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

struct Shared {
    config: PollerConfig,
    tracker: Arc<dyn TrackerClient>,
    executor: Arc<dyn Executor>,
    notifier: Option<Arc<dyn DownstreamNotifier>>,
    dedup: DedupCache,
    pool: Arc<Semaphore>,
    gate: Arc<WorkGate>,
    lifecycle: Mutex<Lifecycle>,
    span: Span,
}

/// Polls a tracker for trigger-labeled items and dispatches each at most once.
///
/// Cheap to clone; clones share all state, so one clone can run
/// [`Poller::start`] while another calls [`Poller::drain`].
#[derive(Clone)]
pub struct Poller {
    shared: Arc<Shared>,
}

impl Poller {
    /// Validate `config` and hydrate the dedup cache from the ledger, if any.
    ///
    /// Makes no tracker calls.
    pub async fn new(config: PollerConfig, collaborators: Collaborators) -> Result<Self> {
        let config = config.validate()?;
        let Collaborators {
            tracker,
            executor,
            ledger,
            notifier,
            span,
        } = collaborators;

        let span = span.unwrap_or_else(|| {
            tracing::info_span!("poller", scope = %config.scope, label = %config.labels.trigger)
        });
        let dedup = DedupCache::hydrate(ledger).instrument(span.clone()).await;

        Ok(Self {
            shared: Arc::new(Shared {
                pool: Arc::new(Semaphore::new(config.max_concurrent)),
                config,
                tracker,
                executor,
                notifier,
                dedup,
                gate: WorkGate::new(),
                lifecycle: Mutex::new(Lifecycle::Created),
                span,
            }),
        })
    }

    pub fn config(&self) -> &PollerConfig {
        &self.shared.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.shared.lifecycle.lock()
    }

    /// Executions currently registered and not yet finished.
    pub fn active_dispatches(&self) -> usize {
        self.shared.gate.active()
    }

    pub fn is_processed(&self, id: &ItemId) -> bool {
        self.shared.dedup.contains(id)
    }

    pub fn processed_count(&self) -> usize {
        self.shared.dedup.len()
    }

    pub fn dispatch_record(&self, id: &ItemId) -> Option<DispatchRecord> {
        self.shared.dedup.get(id)
    }

    /// Forget every in-memory decision. The ledger keeps its records.
    pub fn reset(&self) {
        self.shared.dedup.reset();
    }

    /// Make one item eligible again, here and in the ledger.
    ///
    /// Used after an operator removes the failed label to request a retry.
    pub async fn clear_processed(&self, id: &ItemId) {
        self.shared.dedup.clear(id).await;
        self.shared
            .span
            .in_scope(|| debug!(item = %id, "cleared item from processed set"));
    }

    /// Run until `cancel` fires, then wait for in-flight executions.
    ///
    /// # Errors
    ///
    /// Fails if the poller was already started, or if the trigger label
    /// cannot be resolved. Nothing after startup is reported as an error.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        self.transition_from_created()?;
        self.run(cancel).instrument(self.shared.span.clone()).await
    }

    /// Stop accepting work and wait for in-flight executions to finish.
    ///
    /// Intended for a hot-upgrade handoff. The loop keeps ticking but
    /// dispatches nothing until `cancel` stops it.
    pub async fn drain(&self) {
        let shared = &self.shared;
        async {
            info!("draining poller, no new work items will be accepted");
            shared.gate.begin_drain();
            {
                let mut lifecycle = shared.lifecycle.lock();
                if matches!(*lifecycle, Lifecycle::Starting | Lifecycle::Running) {
                    *lifecycle = Lifecycle::Draining;
                }
            }
            shared.gate.wait_for_drain().await;
            info!("poller drained, all active dispatches completed");
        }
        .instrument(shared.span.clone())
        .await
    }

    fn transition_from_created(&self) -> Result<()> {
        let mut lifecycle = self.shared.lifecycle.lock();
        if *lifecycle != Lifecycle::Created {
            return Err(Error::AlreadyStarted { state: *lifecycle });
        }
        *lifecycle = Lifecycle::Starting;
        Ok(())
    }

    fn set_lifecycle_if(&self, from: Lifecycle, to: Lifecycle) {
        let mut lifecycle = self.shared.lifecycle.lock();
        if *lifecycle == from {
            *lifecycle = to;
        }
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let config = &self.shared.config;
        let labels = match LabelStateMachine::resolve(
            Arc::clone(&self.shared.tracker),
            &config.scope,
            config.labels.clone(),
        )
        .await
        {
            Ok(labels) => Arc::new(labels),
            Err(e) => {
                self.set_lifecycle_if(Lifecycle::Starting, Lifecycle::Created);
                return Err(e);
            }
        };
        self.set_lifecycle_if(Lifecycle::Starting, Lifecycle::Running);

        info!(
            interval_ms = config.poll_interval.as_millis() as u64,
            max_concurrent = config.max_concurrent,
            ledger = self.shared.dedup.has_ledger(),
            "starting poller"
        );

        self.recover_orphans(&labels).await;
        self.scan_and_dispatch(&labels, &cancel).await;

        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial scan already ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.scan_and_dispatch(&labels, &cancel).await,
            }
        }

        info!(active = self.active_dispatches(), "poller stopping, waiting for active dispatches");
        self.shared.gate.begin_drain();
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if *lifecycle == Lifecycle::Running {
                *lifecycle = Lifecycle::Draining;
            }
        }
        self.shared.gate.wait_for_drain().await;
        *self.shared.lifecycle.lock() = Lifecycle::Stopped;
        info!("poller stopped");
        Ok(())
    }

    /// Release items a crashed predecessor left in progress so the next scan
    /// treats them as fresh.
    async fn recover_orphans(&self, labels: &LabelStateMachine) {
        let recovered = labels
            .recover_orphans(&self.shared.config.list_filter())
            .await;
        // The crashed attempt may already be recorded; without clearing it the
        // freed item would be skipped as processed.
        for id in &recovered {
            self.shared.dedup.clear(id).await;
        }
    }

    async fn scan_and_dispatch(&self, labels: &Arc<LabelStateMachine>, cancel: &CancellationToken) {
        let shared = &self.shared;
        if shared.gate.is_draining() || cancel.is_cancelled() {
            debug!("not accepting work, skipping scan");
            return;
        }

        let mut items = match shared.tracker.list_items(&shared.config.list_filter()).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "failed to fetch work items");
                return;
            }
        };

        // Oldest first, so long-waiting items are not starved by newer ones.
        items.sort_by_key(|item| item.created_at);

        let scope = KeyValue::new("scope", shared.config.scope.clone());
        for item in items {
            if shared.dedup.contains(&item.id) {
                continue;
            }

            if !shared.config.allows_project(item.project.as_deref()) {
                debug!(item = %item.id, project = ?item.project, "item outside project allow-list");
                metrics::items_skipped()
                    .add(1, &[scope.clone(), KeyValue::new("reason", "project")]);
                continue;
            }

            if labels.has_status_label(&item) {
                shared.dedup.mark(&item.id, ProcessedTag::Skipped).await;
                metrics::items_skipped()
                    .add(1, &[scope.clone(), KeyValue::new("reason", "status_label")]);
                continue;
            }

            // Mark before dispatch so the next tick cannot pick it up while
            // the worker is still starting.
            shared.dedup.mark(&item.id, ProcessedTag::Dispatched).await;

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    shared.dedup.clear(&item.id).await;
                    return;
                }
                permit = Arc::clone(&shared.pool).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(error = %e, "dispatch pool closed");
                        shared.dedup.clear(&item.id).await;
                        return;
                    }
                },
            };

            let Some(guard) = shared.gate.try_register_work() else {
                drop(permit);
                // Never dispatched: leave it for whichever process runs next.
                shared.dedup.clear(&item.id).await;
                info!(item = %item.id, "poller draining, leaving item undispatched");
                return;
            };

            info!(
                item = %item.id,
                identifier = %item.identifier,
                title = %item.title,
                "dispatching work item"
            );
            metrics::items_dispatched().add(1, std::slice::from_ref(&scope));

            let worker = self.clone();
            let labels = Arc::clone(labels);
            let cancel = cancel.clone();
            tokio::spawn(
                async move { worker.run_worker(labels, item, permit, guard, cancel).await }
                    .instrument(shared.span.clone()),
            );
        }
    }

    /// Execute one item and settle its labels. The permit and guard are
    /// released when this returns, on every path.
    async fn run_worker(
        self,
        labels: Arc<LabelStateMachine>,
        item: WorkItem,
        permit: OwnedSemaphorePermit,
        guard: WorkGuard,
        cancel: CancellationToken,
    ) {
        let _permit = permit;
        let _guard = guard;

        let dispatch_id = Uuid::new_v4();
        let span = dispatch::start_dispatch_span(&item, &dispatch_id);

        async {
            labels.claim(&item).await;

            let started = Instant::now();
            let outcome = self.execute(&item, cancel).await;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            metrics::execution_duration_ms().record(duration_ms, &[]);

            let tag = match outcome {
                Err(e) => {
                    error!(
                        item = %item.id,
                        identifier = %item.identifier,
                        error = %e,
                        duration_ms,
                        "execution failed"
                    );
                    labels.fail(&item).await;
                    ProcessedTag::Failed
                }
                Ok(result) => {
                    let success = result.success;
                    labels.finish(&item, success).await;
                    info!(
                        item = %item.id,
                        identifier = %item.identifier,
                        success,
                        duration_ms,
                        "execution finished"
                    );
                    self.notify(&item, dispatch_id, result);
                    if success {
                        ProcessedTag::Succeeded
                    } else {
                        ProcessedTag::Unsuccessful
                    }
                }
            };

            metrics::executions().add(1, &[KeyValue::new("result", tag.as_str())]);
            dispatch::record_outcome(&Span::current(), tag.as_str());
            self.shared.dedup.record_outcome(&item.id, tag).await;
        }
        .instrument(span)
        .await
    }

    /// Run the executor on its own task so a panic surfaces as an error
    /// instead of unwinding through the worker.
    async fn execute(
        &self,
        item: &WorkItem,
        cancel: CancellationToken,
    ) -> anyhow::Result<ExecutionResult> {
        let executor = Arc::clone(&self.shared.executor);
        let owned = item.clone();
        match tokio::spawn(async move { executor.execute(cancel, &owned).await }).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(anyhow::anyhow!("executor panicked: {e}")),
            Err(e) => Err(anyhow::anyhow!("executor task aborted: {e}")),
        }
    }

    fn notify(&self, item: &WorkItem, dispatch_id: Uuid, result: ExecutionResult) {
        let (Some(notifier), Some(artifact)) = (&self.shared.notifier, result.artifact) else {
            return;
        };
        info!(
            item = %item.id,
            artifact = artifact.number,
            url = %artifact.url,
            "notifying downstream of artifact"
        );
        notifier.artifact_created(ArtifactNotice {
            item_id: item.id.clone(),
            identifier: item.identifier.clone(),
            dispatch_id,
            artifact,
        });
    }
}
