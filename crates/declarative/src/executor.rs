//! Execution engine - converges a plan resource by resource into a ledger

use crate::context::{
    ApplyContext, CancelToken, NoProgress, ProgressCallback, Provider, ProviderRegistry,
};
use crate::error::{ApplyError, EngineError};
use crate::ledger::{Ledger, LedgerStore, MemoryStore, RunHeader};
use crate::planner::ExecutionPlan;
use crate::resource::{Resource, ResourceSpec};
use crate::types::{
    Attempt, ExecuteOptions, Outcome, OutcomeStatus, QueryState, RunSummary, SkipReason,
};
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub ledger: Ledger,
    pub summary: RunSummary,
}

/// Drives providers over a validated plan
///
/// # Example
///
/// ```ignore
/// let plan = ExecutionPlan::new(resources)?;
/// let engine = Engine::new(registry, ExecuteOptions::default());
/// let report = engine.run(&plan, &mut MemoryStore::new(), &mut NoProgress)?;
/// println!("{:?}", report.summary.verdict());
/// ```
pub struct Engine {
    registry: ProviderRegistry,
    ctx: ApplyContext,
    opts: ExecuteOptions,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(registry: ProviderRegistry, opts: ExecuteOptions) -> Self {
        let ctx = ApplyContext::new(opts.verbose);
        Self {
            registry,
            ctx,
            opts,
            cancel: CancelToken::new(),
        }
    }

    /// Use a prepared apply context (sudo, verbosity)
    pub fn with_context(mut self, ctx: ApplyContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Share a cancellation token with the caller
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &ExecuteOptions {
        &self.opts
    }

    /// Converge every resource of the plan
    ///
    /// Errors are reserved for conditions that prevent a trustworthy ledger:
    /// a provider missing for some resource (raised before anything runs) or
    /// a failure to persist a record. Per-resource failures are outcomes.
    pub fn run<S, P>(
        &self,
        plan: &ExecutionPlan,
        store: &mut S,
        progress: &mut P,
    ) -> Result<RunReport, EngineError>
    where
        S: LedgerStore + ?Sized,
        P: ProgressCallback + ?Sized,
    {
        self.registry.check(plan)?;
        let pool = if self.opts.jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.opts.jobs)
                .thread_name(|i| format!("choro-worker-{i}"))
                .build()
                .map_err(|e| EngineError::Pool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        let header = RunHeader::new(plan.len(), self.opts.dry_run);
        log::info!(
            "run {}: {} resources, jobs={}{}",
            header.run_id,
            plan.len(),
            self.opts.jobs.max(1),
            if self.opts.dry_run { ", dry run" } else { "" }
        );
        store.begin(&header)?;
        progress.on_run_start(plan.len());

        let mut recorder = Recorder {
            ledger: Ledger::new(header),
            statuses: vec![None; plan.len()],
            store,
            progress,
        };

        match pool {
            None => {
                for &idx in plan.order() {
                    let outcome = match self.precheck(plan, idx, &recorder.statuses) {
                        Some(skipped) => skipped,
                        None => {
                            let resource = &plan.resources()[idx];
                            recorder
                                .progress
                                .on_resource_start(&resource.id, &resource.description());
                            self.converge(resource)
                        }
                    };
                    recorder.commit(idx, outcome)?;
                }
            }
            Some(pool) => {
                for (n, layer) in plan.layers().iter().enumerate() {
                    recorder.progress.on_layer_start(n, layer.len());
                    // Dependencies sit in earlier layers, so skips are known
                    // before anything in this layer starts
                    let skipped: Vec<Option<Outcome>> = layer
                        .iter()
                        .map(|&idx| self.precheck(plan, idx, &recorder.statuses))
                        .collect();
                    for (&idx, _) in layer.iter().zip(&skipped).filter(|(_, s)| s.is_none()) {
                        let resource = &plan.resources()[idx];
                        recorder
                            .progress
                            .on_resource_start(&resource.id, &resource.description());
                    }
                    let outcomes: Vec<Outcome> = pool.install(|| {
                        layer
                            .par_iter()
                            .zip(skipped)
                            .map(|(&idx, skip)| {
                                skip.unwrap_or_else(|| self.converge(&plan.resources()[idx]))
                            })
                            .collect()
                    });
                    for (&idx, outcome) in layer.iter().zip(outcomes) {
                        recorder.commit(idx, outcome)?;
                    }
                }
            }
        }

        let cancelled = recorder
            .ledger
            .outcomes()
            .iter()
            .any(|o| o.skip == Some(SkipReason::Cancelled));
        let summary =
            RunSummary::from_outcomes(recorder.ledger.outcomes(), cancelled, self.opts.dry_run);
        recorder.store.finish(&summary)?;
        recorder.progress.on_run_complete(&summary);
        log::info!(
            "run {} finished: {} applied, {} failed, {} skipped",
            recorder.ledger.header().run_id,
            summary.applied,
            summary.failed,
            summary.skipped
        );

        Ok(RunReport {
            ledger: recorder.ledger,
            summary,
        })
    }

    /// Decide whether a resource is skipped without touching its provider
    fn precheck(
        &self,
        plan: &ExecutionPlan,
        idx: usize,
        statuses: &[Option<OutcomeStatus>],
    ) -> Option<Outcome> {
        let resource = &plan.resources()[idx];
        for &dep in plan.dependencies(idx) {
            if let Some(status) = statuses[dep].filter(OutcomeStatus::blocks_dependents) {
                let id = plan.resources()[dep].id.clone();
                log::info!("skipping {}: dependency {} {}", resource.id, id, status);
                return Some(Outcome::skipped(
                    resource,
                    SkipReason::Dependency { id, status },
                ));
            }
        }
        if self.cancel.is_cancelled() {
            log::info!("skipping {}: run cancelled", resource.id);
            return Some(Outcome::skipped(resource, SkipReason::Cancelled));
        }
        None
    }

    /// Query, then apply the primary spec and its fallbacks in order
    fn converge(&self, resource: &Resource) -> Outcome {
        let state = self.query(&resource.spec);
        log::debug!("{}: {}", resource.id, state);
        if state.is_satisfied() {
            return Outcome::already_satisfied(resource, None);
        }
        for fallback in &resource.fallbacks {
            if self.query(fallback).is_satisfied() {
                log::debug!("{}: satisfied by fallback {}", resource.id, fallback.target());
                return Outcome::already_satisfied(
                    resource,
                    Some(format!("satisfied by fallback {}", fallback.description())),
                );
            }
        }

        if self.opts.dry_run {
            return Outcome::skipped(resource, SkipReason::DryRun);
        }

        let has_fallbacks = !resource.fallbacks.is_empty();
        let mut attempts = Vec::new();
        let mut last_error = None;
        for (i, spec) in resource.specs().enumerate() {
            match self.apply(spec) {
                Ok(()) => {
                    log::debug!("{}: applied {}", resource.id, spec.target());
                    if !has_fallbacks {
                        return Outcome::applied(resource, None, attempts);
                    }
                    attempts.push(Attempt::succeeded(spec));
                    let detail = (i > 0).then(|| format!("applied fallback {}", spec.description()));
                    return Outcome::applied(resource, detail, attempts);
                }
                Err(err) => {
                    log::warn!("{}: {} failed: {}", resource.id, spec.target(), err);
                    if has_fallbacks {
                        attempts.push(Attempt::failed(spec, &err));
                    }
                    last_error = Some(err);
                }
            }
        }

        let err = last_error.unwrap_or_else(|| ApplyError::tool_failed("nothing was attempted"));
        Outcome::failed(resource, &err, attempts)
    }

    fn query(&self, spec: &ResourceSpec) -> QueryState {
        match self.registry.get(spec.kind()) {
            Some(provider) => guarded_query(provider, spec, self.opts.timeout),
            None => QueryState::Unknown,
        }
    }

    fn apply(&self, spec: &ResourceSpec) -> Result<(), ApplyError> {
        let Some(provider) = self.registry.get(spec.kind()) else {
            return Err(ApplyError::tool_failed(format!(
                "no provider for {}",
                spec.kind()
            )));
        };
        let owned = spec.clone();
        let ctx = self.ctx.clone();
        match guarded(self.opts.timeout, move || provider.apply(&owned, &ctx)) {
            Guarded::Done(result) => result,
            Guarded::TimedOut(limit) => Err(ApplyError::timeout(format!(
                "{} did not finish within {}s",
                spec.target(),
                limit.as_secs()
            ))),
            Guarded::Lost(msg) => Err(ApplyError::tool_failed(format!(
                "provider aborted: {msg}"
            ))),
        }
    }
}

/// Writes outcomes to the store and the ledger, in that order
struct Recorder<'a, S: ?Sized, P: ?Sized> {
    ledger: Ledger,
    statuses: Vec<Option<OutcomeStatus>>,
    store: &'a mut S,
    progress: &'a mut P,
}

impl<S, P> Recorder<'_, S, P>
where
    S: LedgerStore + ?Sized,
    P: ProgressCallback + ?Sized,
{
    fn commit(&mut self, idx: usize, outcome: Outcome) -> Result<(), EngineError> {
        self.store.append(&outcome)?;
        self.statuses[idx] = Some(outcome.status);
        self.progress.on_outcome(&outcome);
        self.ledger.record(outcome);
        Ok(())
    }
}

/// Query `spec`, bounded by `timeout`; a hung or panicking query is `Unknown`
pub(crate) fn guarded_query(
    provider: Arc<dyn Provider>,
    spec: &ResourceSpec,
    timeout: Option<Duration>,
) -> QueryState {
    let owned = spec.clone();
    match guarded(timeout, move || provider.query(&owned)) {
        Guarded::Done(state) => state,
        Guarded::TimedOut(limit) => {
            log::warn!(
                "query of {} timed out after {}s",
                spec.target(),
                limit.as_secs()
            );
            QueryState::Unknown
        }
        Guarded::Lost(msg) => {
            log::warn!("query of {} aborted: {}", spec.target(), msg);
            QueryState::Unknown
        }
    }
}

enum Guarded<T> {
    Done(T),
    TimedOut(Duration),
    /// The call panicked or could not be started
    Lost(String),
}

/// Run a provider call, bounded by `timeout` when one is set
///
/// A call that outlives its limit keeps running on its own thread; its
/// result is discarded.
fn guarded<T, F>(timeout: Option<Duration>, f: F) -> Guarded<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let Some(limit) = timeout else {
        return match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Guarded::Done(value),
            Err(payload) => Guarded::Lost(panic_message(payload.as_ref())),
        };
    };

    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("choro-provider".to_string())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| panic_message(payload.as_ref()));
            // Receiver is gone when the caller already timed out
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        return Guarded::Lost(format!("failed to spawn provider thread: {e}"));
    }

    match rx.recv_timeout(limit) {
        Ok(Ok(value)) => Guarded::Done(value),
        Ok(Err(msg)) => Guarded::Lost(msg),
        Err(RecvTimeoutError::Timeout) => Guarded::TimedOut(limit),
        Err(RecvTimeoutError::Disconnected) => Guarded::Lost("provider thread exited".to_string()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Simple execution without callbacks
///
/// Validates `resources`, runs them and keeps the ledger in memory. For
/// basic use cases where you don't need progress or persistence.
pub fn execute_simple(
    resources: Vec<Resource>,
    registry: ProviderRegistry,
    opts: ExecuteOptions,
) -> Result<RunReport, EngineError> {
    let plan = ExecutionPlan::new(resources)?;
    Engine::new(registry, opts).run(&plan, &mut MemoryStore::new(), &mut NoProgress)
}
