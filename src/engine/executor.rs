//! Workflow Executor - Runs compiled workflows against a browser backend
//!
//! The executor is a small state machine:
//!
//! ```text
//! Idle -> Running(phase, step) -> StepSucceeded | StepFailed | StepSkipped
//!      -> ... -> WorkflowSucceeded | WorkflowFailed
//! ```
//!
//! One run, strictly in order:
//! 1. Seeds workflow variables into a fresh execution context
//! 2. Runs `setup` as a strict block
//! 3. Runs each phase under its mode (`strict` stops at the first counted
//!    failure, `recover` keeps going and compares failures to a tolerance)
//! 4. On failure, runs `recovery` once, best-effort
//! 5. Always runs `teardown`, best-effort
//!
//! Every step attempt resolves placeholders, resolves its target through the
//! tiered locator resolver, then executes under the step timeout. Retryable
//! failures are retried with exponential backoff up to the attempt bound.

use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::bridge::{BackendError, BrowserBackend};
use crate::engine::actions::{self, ActionInput};
use crate::engine::adapter::Installed;
use crate::engine::error::{ErrorKind, ExecutorError, StepError};
use crate::engine::evidence::EvidenceCollector;
use crate::engine::expander::SemanticExpander;
use crate::engine::locator::{LocatorResolver, ResolverPolicy};
use crate::engine::registry::{ActionKind, ActionRegistry, TargetUse};
use crate::engine::result::{
    Outcome, Outputs, PhaseResult, StepErrorInfo, StepResult, WorkflowResult,
};
use crate::engine::wait::PollPolicy;
use crate::workflow::config::EngineConfig;
use crate::workflow::context::{ExecutionContext, RecordedError};
use crate::workflow::expressions::{interpolate, resolve_params, resolve_value, Scope, TemplateContext};
use crate::workflow::job::{OnPhaseFailure, Params, PhaseMode, Step, StepKind, Workflow};
use crate::workflow::locators::LocatorPack;

/// Cooperative cancellation flag, honored at step boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Running { phase: String, step: usize },
    StepSucceeded,
    StepFailed,
    StepSkipped,
    WorkflowSucceeded,
    WorkflowFailed,
}

/// How failures inside a block of steps are judged
#[derive(Debug, Clone, Copy)]
enum BlockPolicy {
    Strict,
    Recover { tolerance: usize },
    /// Recovery and teardown: run everything, log failures, never fail
    BestEffort,
}

struct BlockOutcome {
    steps: Vec<StepResult>,
    failures: usize,
    success: bool,
    cancelled: bool,
}

/// One action invocation: a compiled step or one expanded child of it
struct Call<'a> {
    keyword: &'a str,
    target: Option<&'a str>,
    params: &'a Params,
    /// Resolved parameters of the enclosing composite step
    composite: Option<&'a Params>,
}

impl Call<'_> {
    fn label(&self) -> String {
        match self.target {
            Some(target) => format!("{} -> {}", self.keyword, target),
            None => self.keyword.to_string(),
        }
    }
}

#[derive(Default)]
struct AttemptTrace {
    tier: Option<crate::workflow::locators::Tier>,
    diagnostics: Vec<crate::engine::locator::Diagnostic>,
}

/// The workflow executor. Owns its backend for the duration of its runs.
pub struct Executor {
    registry: Arc<ActionRegistry>,
    expander: Arc<SemanticExpander>,
    resolver: LocatorResolver,
    backend: Box<dyn BrowserBackend>,
    config: EngineConfig,
    poll: PollPolicy,
    template: TemplateContext,
    evidence: Option<Box<dyn EvidenceCollector>>,
    cancel: CancelHandle,
    state: ExecutorState,
}

impl Executor {
    pub fn new(
        registry: Arc<ActionRegistry>,
        expander: Arc<SemanticExpander>,
        backend: Box<dyn BrowserBackend>,
    ) -> Self {
        let config = EngineConfig::default();
        Self {
            registry,
            expander,
            resolver: LocatorResolver::new(ResolverPolicy::from(&config.timeouts)),
            backend,
            poll: PollPolicy::from(&config.timeouts),
            config,
            template: TemplateContext::from_env(),
            evidence: None,
            cancel: CancelHandle::new(),
            state: ExecutorState::Idle,
        }
    }

    /// Executor wired with everything adapters contributed
    pub fn from_installed(installed: Installed, backend: Box<dyn BrowserBackend>) -> Self {
        let mut executor = Self::new(installed.registry, Arc::new(installed.expander), backend);
        for pack in installed.packs {
            executor.resolver.add_pack(pack);
        }
        executor
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.resolver.set_policy(ResolverPolicy::from(&config.timeouts));
        self.poll = PollPolicy::from(&config.timeouts);
        for (key, value) in &config.variables {
            self.template.set(key, value.clone());
        }
        self.config = config;
        self
    }

    pub fn with_template(mut self, template: TemplateContext) -> Self {
        self.template = template;
        self
    }

    pub fn with_pack(mut self, pack: LocatorPack) -> Self {
        self.resolver.add_pack(pack);
        self
    }

    pub fn with_evidence_collector(mut self, collector: Box<dyn EvidenceCollector>) -> Self {
        self.evidence = Some(collector);
        self
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &LocatorResolver {
        &self.resolver
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> &ExecutorState {
        &self.state
    }

    /// Close the backend
    pub async fn shutdown(&mut self) -> Result<(), BackendError> {
        self.backend.close().await
    }

    /// Run a workflow
    #[instrument(skip(self, workflow), fields(workflow_name = %workflow.name))]
    pub async fn run(&mut self, workflow: &Workflow) -> Result<WorkflowResult, ExecutorError> {
        if let Some(pack) = &workflow.locator_pack {
            if !self.resolver.has_pack(pack) {
                return Err(ExecutorError::ConfigError(format!(
                    "workflow '{}' uses locator pack '{}', which is not loaded (available: {})",
                    workflow.name,
                    pack,
                    self.resolver.pack_ids().join(", ")
                )));
            }
        }

        let started_at = Utc::now();
        let mut ctx = ExecutionContext::new();
        for (name, value) in &workflow.variables {
            let resolved = {
                let scope = Scope::new(&ctx, &self.template);
                resolve_value(value, &scope)?
            };
            ctx.set(name, resolved);
        }

        info!(
            "Starting workflow: {} (run {}, {} phases)",
            workflow.name,
            ctx.run_id,
            workflow.phases.len()
        );
        self.state = ExecutorState::Idle;

        let pack = workflow.locator_pack.as_deref();
        let continue_past = match workflow.on_phase_failure {
            Some(policy) => policy == OnPhaseFailure::Continue,
            None => self.config.phases.continue_past_phase_failure,
        };

        let mut failed = false;
        let mut halted = false;

        // Setup
        let setup = self
            .run_block("setup", &workflow.setup, BlockPolicy::Strict, pack, &mut ctx)
            .await;
        if !setup.success {
            error!("Setup failed, skipping all phases");
            failed = true;
            halted = true;
        }

        // Phases
        let mut phases = Vec::with_capacity(workflow.phases.len());
        for phase in &workflow.phases {
            let mode = phase.mode.unwrap_or(self.config.phases.default_mode);
            let tolerance = match mode {
                PhaseMode::Strict => 0,
                PhaseMode::Recover => phase.tolerance.unwrap_or(self.config.phases.recover_tolerance),
            };

            if halted {
                phases.push(PhaseResult {
                    name: phase.name.clone(),
                    mode,
                    success: false,
                    skipped: true,
                    failures: 0,
                    tolerance,
                    steps: phase
                        .steps
                        .iter()
                        .map(|s| StepResult::skipped(s, "workflow halted before this phase"))
                        .collect(),
                });
                continue;
            }

            info!("Phase '{}' ({:?}, {} steps)", phase.name, mode, phase.steps.len());
            let policy = match mode {
                PhaseMode::Strict => BlockPolicy::Strict,
                PhaseMode::Recover => BlockPolicy::Recover { tolerance },
            };
            let outcome = self
                .run_block(&phase.name, &phase.steps, policy, pack, &mut ctx)
                .await;

            if !outcome.success {
                failed = true;
                error!(
                    "Phase '{}' failed ({} counted failures, tolerance {})",
                    phase.name, outcome.failures, tolerance
                );
                if outcome.cancelled || !continue_past {
                    halted = true;
                }
            }

            phases.push(PhaseResult {
                name: phase.name.clone(),
                mode,
                success: outcome.success,
                skipped: false,
                failures: outcome.failures,
                tolerance,
                steps: outcome.steps,
            });
        }

        // Recovery never touches the recorded root cause
        let recovery = if failed && !workflow.recovery.is_empty() {
            info!("Running recovery for workflow '{}'", workflow.name);
            self.run_block("recovery", &workflow.recovery, BlockPolicy::BestEffort, pack, &mut ctx)
                .await
                .steps
        } else {
            Vec::new()
        };

        let teardown = if workflow.teardown.is_empty() {
            Vec::new()
        } else {
            self.run_block("teardown", &workflow.teardown, BlockPolicy::BestEffort, pack, &mut ctx)
                .await
                .steps
        };

        let outcome = if failed {
            self.state = ExecutorState::WorkflowFailed;
            match &ctx.last_error {
                Some(cause) => error!(
                    "Workflow '{}' failed: {} ({})",
                    workflow.name,
                    cause.message,
                    cause
                        .source
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_default()
                ),
                None => error!("Workflow '{}' failed", workflow.name),
            }
            Outcome::Failed
        } else {
            self.state = ExecutorState::WorkflowSucceeded;
            info!("Workflow '{}' succeeded", workflow.name);
            Outcome::Succeeded
        };

        Ok(WorkflowResult {
            run_id: ctx.run_id.clone(),
            workflow: workflow.name.clone(),
            digest: workflow.digest.clone(),
            outcome,
            setup: setup.steps,
            phases,
            recovery,
            teardown,
            root_cause: if failed { ctx.last_error.clone() } else { None },
            locator_metrics: ctx.locator_metrics.clone(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run_block(
        &mut self,
        name: &str,
        steps: &[Step],
        policy: BlockPolicy,
        pack: Option<&str>,
        ctx: &mut ExecutionContext,
    ) -> BlockOutcome {
        let mut results = Vec::with_capacity(steps.len());
        let mut failures = 0;
        let mut first_failure: Option<RecordedError> = None;
        let mut stop_reason: Option<String> = None;
        let mut cancelled = false;

        for (idx, step) in steps.iter().enumerate() {
            if let Some(reason) = &stop_reason {
                self.state = ExecutorState::StepSkipped;
                results.push(StepResult::skipped(step, reason.clone()));
                continue;
            }

            if !matches!(policy, BlockPolicy::BestEffort) && self.cancel.is_cancelled() {
                warn!("Run cancelled before '{}' ({})", step.label(), step.source);
                if let Some(cause) = first_failure.take() {
                    ctx.record_root_cause(cause);
                }
                ctx.record_root_cause(RecordedError {
                    kind: ErrorKind::Cancelled,
                    message: StepError::Cancelled.to_string(),
                    keyword: step.keyword.clone(),
                    source: Some(step.source.clone()),
                });
                cancelled = true;
                stop_reason = Some("cancelled".to_string());
                self.state = ExecutorState::StepSkipped;
                results.push(StepResult::skipped(step, "cancelled"));
                continue;
            }

            ctx.current_phase = Some(name.to_string());
            ctx.current_step = Some(idx);
            self.state = ExecutorState::Running {
                phase: name.to_string(),
                step: idx,
            };

            let result = self.execute_step(step, pack, ctx).await;

            if result.success {
                self.state = ExecutorState::StepSucceeded;
            } else {
                self.state = ExecutorState::StepFailed;
                let message = result
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_default();

                if result.optional {
                    warn!("Optional step '{}' failed ({}): {}", result.label, step.source, message);
                } else if let BlockPolicy::BestEffort = policy {
                    warn!("{} step '{}' failed ({}): {}", name, result.label, step.source, message);
                } else {
                    failures += 1;
                    error!("Step '{}' failed ({}): {}", result.label, step.source, message);
                    if first_failure.is_none() {
                        first_failure = result.recorded_error();
                    }
                    if let BlockPolicy::Strict = policy {
                        stop_reason = Some(format!("earlier step failed at {}", step.source));
                    }
                }
            }

            results.push(result);
        }

        let success = !cancelled
            && match policy {
                BlockPolicy::Strict => failures == 0,
                BlockPolicy::Recover { tolerance } => failures <= tolerance,
                BlockPolicy::BestEffort => true,
            };

        if !success {
            if let Some(cause) = first_failure {
                ctx.record_root_cause(cause);
            }
        }

        BlockOutcome {
            steps: results,
            failures,
            success,
            cancelled,
        }
    }

    async fn execute_step(
        &mut self,
        step: &Step,
        pack: Option<&str>,
        ctx: &mut ExecutionContext,
    ) -> StepResult {
        let started = Instant::now();

        // Exhaustive over step kinds
        let mut result = match &step.kind {
            StepKind::Semantic => self.execute_composite(step, pack, ctx).await,
            StepKind::Atomic | StepKind::Plugin { .. } => {
                let call = Call {
                    keyword: &step.keyword,
                    target: step.target.as_deref(),
                    params: &step.params,
                    composite: None,
                };
                self.execute_with_retry(step, &call, pack, ctx).await
            }
        };
        result.elapsed_ms = started.elapsed().as_millis() as u64;

        if result.success {
            if let Some(id) = &step.id {
                ctx.set_outputs(id, &result.outputs);
            }
        } else {
            self.collect_evidence(step, &mut result).await;
        }

        result
    }

    async fn execute_composite(
        &mut self,
        step: &Step,
        pack: Option<&str>,
        ctx: &mut ExecutionContext,
    ) -> StepResult {
        let mut result = StepResult::new(step);
        result.attempts = 1;

        let resolved = {
            let scope = Scope::new(ctx, &self.template);
            resolve_params(&step.params, &scope)
        };
        let params = match resolved {
            Ok(params) => params,
            Err(e) => {
                result.error = Some(StepErrorInfo::from(&StepError::from(e)));
                return result;
            }
        };

        let expander = Arc::clone(&self.expander);
        let expanded = match expander.expand(&step.keyword, &params, ctx) {
            Ok(steps) => steps,
            Err(e) => {
                result.error = Some(StepErrorInfo::from(&StepError::from(e)));
                return result;
            }
        };

        let total = expanded.len();
        let mut failed_at: Option<String> = None;
        for (idx, child) in expanded.iter().enumerate() {
            let call = Call {
                keyword: &child.keyword,
                target: child.target.as_deref(),
                params: &child.params,
                composite: Some(&params),
            };
            let label = format!("{} [{}/{}] {}", step.keyword, idx + 1, total, call.label());

            if let Some(reason) = &failed_at {
                let mut skipped = StepResult::skipped(step, reason.clone());
                skipped.label = label;
                skipped.keyword = child.keyword.clone();
                result.children.push(skipped);
                continue;
            }

            let mut child_result = self.execute_with_retry(step, &call, pack, ctx).await;
            child_result.label = label;
            child_result.keyword = child.keyword.clone();

            if child_result.success {
                result.outputs.extend(child_result.outputs.clone());
                result.evidence.extend(child_result.evidence.iter().cloned());
            } else {
                result.error = child_result.error.clone();
                failed_at = Some(format!("'{}' step {} failed", step.keyword, idx + 1));
            }
            result.diagnostics.extend(child_result.diagnostics.iter().cloned());
            result.tier = result.tier.max(child_result.tier);
            result.children.push(child_result);
        }

        result.success = failed_at.is_none();
        result
    }

    /// Attempt bound: explicit `retry=N` wins; optional steps get a single
    /// attempt unless configured otherwise.
    fn attempt_bound(&self, step: &Step) -> u32 {
        if let Some(bound) = step.retry {
            return bound.max(1);
        }
        if step.optional && !self.config.retry.retry_optional_steps {
            return 1;
        }
        self.config.retry.max_attempts.max(1)
    }

    async fn execute_with_retry(
        &mut self,
        step: &Step,
        call: &Call<'_>,
        pack: Option<&str>,
        ctx: &mut ExecutionContext,
    ) -> StepResult {
        let mut result = StepResult::new(step);
        let label = call.label();

        let Some(timeout) = self.config.timeouts.step_timeout(step.timeout.as_deref()) else {
            let error = StepError::Config(format!(
                "unknown timeout profile '{}'",
                step.timeout.as_deref().unwrap_or_default()
            ));
            result.error = Some(StepErrorInfo::from(&error));
            return result;
        };
        let max_attempts = self.attempt_bound(step);

        for attempt in 1..=max_attempts {
            result.attempts = attempt;
            let mut trace = AttemptTrace::default();

            let outcome = match tokio::time::timeout(
                timeout,
                self.attempt(call, pack, timeout, ctx, &mut trace),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(StepError::Timeout(timeout)),
            };

            result.tier = trace.tier;
            result.diagnostics = trace.diagnostics;

            match outcome {
                Ok(outputs) => {
                    if let Some(Value::String(handle)) = outputs.get("evidence") {
                        result.evidence.push(handle.clone());
                    }
                    result.outputs = outputs;
                    result.success = true;
                    result.error = None;
                    if attempt > 1 {
                        info!("'{}' succeeded on attempt {}/{}", label, attempt, max_attempts);
                    } else {
                        debug!("'{}' succeeded", label);
                    }
                    return result;
                }
                Err(error) => {
                    result.error = Some(StepErrorInfo::from(&error));
                    if attempt >= max_attempts || !error.is_retryable(&self.config.retry) {
                        debug!("'{}' failed on attempt {}/{}: {}", label, attempt, max_attempts, error);
                        return result;
                    }
                    let delay = self.config.retry.backoff(attempt);
                    warn!(
                        "'{}' failed (attempt {}/{}): {}; retrying in {}ms",
                        label,
                        attempt,
                        max_attempts,
                        error,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        result
    }

    async fn attempt(
        &mut self,
        call: &Call<'_>,
        pack: Option<&str>,
        wait_timeout: Duration,
        ctx: &mut ExecutionContext,
        trace: &mut AttemptTrace,
    ) -> Result<Outputs, StepError> {
        let registry = Arc::clone(&self.registry);
        let spec = registry
            .get(call.keyword)
            .map_err(|e| StepError::Config(e.to_string()))?;

        let (params, target) = {
            let scope = Scope::new(ctx, &self.template);
            let scope = match call.composite {
                Some(composite) => scope.with_params(composite),
                None => scope,
            };
            let params = resolve_params(call.params, &scope)?;
            let target = call.target.map(|t| interpolate(t, &scope)).transpose()?;
            (params, target)
        };

        let mut handle = None;
        if let Some(key) = &target {
            let pack = pack.ok_or_else(|| {
                StepError::Config(format!(
                    "'{}' needs a locator pack; declare 'locators:' in the workflow",
                    key
                ))
            })?;
            match self
                .resolver
                .resolve(self.backend.as_mut(), pack, key, &mut ctx.locator_metrics)
                .await
            {
                Ok(resolved) => {
                    trace.tier = Some(resolved.tier);
                    trace.diagnostics.extend(resolved.diagnostic);
                    handle = Some(resolved.handle);
                }
                Err(failure) if spec.target == TargetUse::AbsentOk && failure.absent => {
                    debug!("'{}' not found, treating as absent", key);
                    handle = failure.inert;
                }
                Err(failure) => return Err(failure.into()),
            }
        }

        match &spec.kind {
            ActionKind::Atomic(primitive) => {
                let input = ActionInput {
                    keyword: call.keyword,
                    target: handle.as_ref(),
                    params: &params,
                    wait_timeout,
                    poll: &self.poll,
                };
                actions::execute(*primitive, self.backend.as_mut(), input, ctx).await
            }
            ActionKind::Plugin { handler, .. } => {
                handler
                    .invoke(self.backend.as_mut(), handle.as_ref(), &params, ctx)
                    .await
            }
        }
    }

    async fn collect_evidence(&mut self, step: &Step, result: &mut StepResult) {
        if let Some(collector) = self.evidence.as_mut() {
            match collector
                .collect(self.backend.as_mut(), &step.source, &result.label)
                .await
            {
                Ok(handles) => result.evidence.extend(handles),
                Err(e) => warn!("Evidence collection failed for {}: {}", step.source, e),
            }
        }
    }
}
