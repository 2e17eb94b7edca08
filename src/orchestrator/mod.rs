//! Orchestrator Protocol (spec §4.1): the lifecycle state machine driving a
//! request from goal to terminal outcome. Generalized off the teacher's
//! `phases/orchestrator.rs::GooseOrchestrator::run` loop shape — a single
//! `async fn` owning the stage sequence, emitting one `StructuredEvent` per
//! transition, with LLM planning replaced by `agents::planner::Planner`.

mod error_propagation;
mod session_registry;
mod session_state;

pub use error_propagation::ErrorPropagation;
pub use session_registry::SessionRegistry;
pub use session_state::SessionCheckpoint;

use crate::agents::llm::{DeterministicLlmClient, LlmClient};
use crate::agents::planner::Planner;
use crate::agents::worker::{ApprovalService, Worker};
use crate::context::ExecutionContext;
use crate::errors::{FailureMode, OrchestrationError};
use crate::guardrails::{CircuitBreakerRegistry, GuardrailPolicy, RetryPolicy};
use crate::io_contract::{AgentResponse, PlanStep, ResponseStatus};
use crate::memory::MemoryBackend;
use crate::observability::{Collector, EventStatus, EventType, StructuredEvent};
use crate::registry::ToolRegistry;
use crate::routing::{RoundRobinRouter, RoutingDecision};
use tokio_util::sync::CancellationToken;

/// `{INITIALIZE, PLAN, ROUTE, EXECUTE, AGGREGATE, COMPLETE}` plus the two
/// terminals `{FAILED, CANCELLED}`. The terminal set is exactly these three
/// (`COMPLETE`, `FAILED`, `CANCELLED`) per §4.1.1 — `PARTIAL` results are
/// carried as `AgentResponse.metadata.partial_result` under `COMPLETE`
/// rather than as a fourth terminal (documented Open Question decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Initialize,
    Plan,
    Route,
    Execute,
    Aggregate,
    Complete,
    Failed,
    Cancelled,
}

impl LifecycleStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleStage::Complete | LifecycleStage::Failed | LifecycleStage::Cancelled)
    }

    fn as_str(self) -> &'static str {
        match self {
            LifecycleStage::Initialize => "INITIALIZE",
            LifecycleStage::Plan => "PLAN",
            LifecycleStage::Route => "ROUTE",
            LifecycleStage::Execute => "EXECUTE",
            LifecycleStage::Aggregate => "AGGREGATE",
            LifecycleStage::Complete => "COMPLETE",
            LifecycleStage::Failed => "FAILED",
            LifecycleStage::Cancelled => "CANCELLED",
        }
    }
}

/// Everything the orchestrator needs to drive one request. Borrowed for the
/// duration of `orchestrate`; none of these are mutated by reference beyond
/// their own interior mutability (`Mutex`/atomics), matching the rest of
/// the substrate's concurrency model.
pub struct Orchestrator<'a> {
    pub registry: &'a ToolRegistry,
    pub memory: &'a dyn MemoryBackend,
    pub guardrails: &'a GuardrailPolicy,
    pub retry_policy: &'a RetryPolicy,
    pub collector: &'a Collector,
    pub approval: &'a dyn ApprovalService,
    pub router: &'a RoundRobinRouter,
    pub circuit_breakers: &'a CircuitBreakerRegistry,
    pub sessions: &'a SessionRegistry,
    pub max_steps: usize,
    pub error_propagation: ErrorPropagation,
}

impl<'a> Orchestrator<'a> {
    /// Drive `goal` through every lifecycle stage, returning the terminal
    /// `AgentResponse` plus the full stage-by-stage trace. Honors
    /// `cancellation` at each suspension point (after planning, after
    /// routing, between steps) per §5's cooperative-cancellation model:
    /// on cancellation, recorded compensations run in reverse order before
    /// the `CANCELLED` response is returned.
    pub async fn orchestrate(&self, goal: &str, ctx: &ExecutionContext, cancellation: &CancellationToken) -> AgentResponse {
        let mut trace: Vec<serde_json::Value> = Vec::new();
        self.collector.start_trace(&ctx.trace_id);
        self.sessions.begin(&ctx.trace_id);
        self.emit_stage(&mut trace, ctx, LifecycleStage::Initialize);

        if cancellation.is_cancelled() {
            return self.finish_cancelled(&mut trace, ctx);
        }

        // PLAN
        self.emit_stage(&mut trace, ctx, LifecycleStage::Plan);
        let planner = Planner::new(self.registry, self.memory, self.max_steps);
        let plan = match planner.plan(goal, ctx) {
            Ok(plan) => plan,
            Err(err) => return self.finish_failed(&mut trace, ctx, "PLAN", err.message),
        };
        self.collector.record_plan_steps(plan.len());
        self.collector.emit(
            StructuredEvent::new(EventType::PlanCreated, &ctx.trace_id, EventStatus::Success)
                .with_attributes(serde_json::json!({"steps": plan.len()})),
        );

        // Narrate the plan through the LLM trait seam. Only a deterministic
        // term-echo client is wired here (LLM invocation is out of scope);
        // a real model client plugs in at this same call.
        let llm: &dyn LlmClient = &DeterministicLlmClient;
        if let Ok(rationale) = llm.complete(goal, ctx).await {
            trace.push(serde_json::json!({"event": "plan_rationale", "trace_id": ctx.trace_id, "rationale": rationale}));
        }

        if cancellation.is_cancelled() {
            return self.finish_cancelled(&mut trace, ctx);
        }

        // ROUTE
        self.emit_stage(&mut trace, ctx, LifecycleStage::Route);
        let routing = self.make_routing_decision(&plan);
        self.collector.emit(
            StructuredEvent::new(EventType::RouteDecision, &ctx.trace_id, EventStatus::Success)
                .with_attributes(serde_json::json!({"target": routing.target, "reason": routing.reason})),
        );

        if cancellation.is_cancelled() {
            return self.finish_cancelled(&mut trace, ctx);
        }

        // EXECUTE
        self.emit_stage(&mut trace, ctx, LifecycleStage::Execute);
        let worker = Worker {
            registry: self.registry,
            guardrails: self.guardrails,
            retry_policy: self.retry_policy,
            memory: self.memory,
            collector: self.collector,
            approval: self.approval,
            circuit_breakers: self.circuit_breakers,
        };

        // Under CONTINUE the worker itself proceeds past a step failure
        // (recording a warning trace event and moving to the next step);
        // every other strategy stops at the first unrecoverable failure
        // (after its own per-step retries) and defers to `handle_error`
        // below, per §4.1.3.
        let fail_fast = !matches!(self.error_propagation, ErrorPropagation::Continue);
        let exec_result = tokio::select! {
            result = worker.run_steps(&plan, ctx, fail_fast) => result,
            _ = cancellation.cancelled() => {
                return self.finish_cancelled(&mut trace, ctx);
            }
        };

        let worker_result = match exec_result {
            Ok(result) => result,
            Err(err) => return self.handle_error(&mut trace, ctx, err, &plan, &routing).await,
        };
        trace.extend(worker_result.trace);

        // AGGREGATE
        self.emit_stage(&mut trace, ctx, LifecycleStage::Aggregate);
        let result_value = worker_result.last_output.unwrap_or(serde_json::json!(null));

        // COMPLETE
        self.emit_stage(&mut trace, ctx, LifecycleStage::Complete);
        self.collector.end_trace(&ctx.trace_id, true);
        AgentResponse::success(result_value).with_trace(trace)
    }

    /// Wires `routing::RoundRobinRouter` against the plan's distinct tool
    /// names, treating each tool as a routable target (this substrate has
    /// no separate worker-pool concept beyond tools, per §4.1.2's "targets
    /// are whatever pool the caller supplies").
    fn make_routing_decision(&self, plan: &[PlanStep]) -> RoutingDecision {
        let targets: Vec<String> = plan.iter().map(|step| step.tool.clone()).collect();
        self.router.route(&targets)
    }

    /// Implements the four `ErrorPropagation` strategies (§4.1.3) on top of
    /// the single `Err` the worker surfaces at its first unrecoverable step
    /// failure (compensations already ran inside `run_steps` before this
    /// is reached).
    async fn handle_error(
        &self,
        trace: &mut Vec<serde_json::Value>,
        ctx: &ExecutionContext,
        err: crate::errors::AgentError,
        plan: &[PlanStep],
        routing: &RoutingDecision,
    ) -> AgentResponse {
        let mode = FailureMode::classify_message(&err.message);
        match self.error_propagation {
            ErrorPropagation::FailFast => self.finish_failed(trace, ctx, "EXECUTE", err.message),
            // CONTINUE already runs the worker with `fail_fast: false` (see
            // `orchestrate`), so `run_steps` only reaches this arm for a
            // failure outside the per-step loop. Degrade to FAIL_FAST rather
            // than silently reporting a fabricated partial success.
            ErrorPropagation::Continue => self.finish_failed(trace, ctx, "EXECUTE", err.message),
            ErrorPropagation::Retry if self.retry_policy.should_retry(mode, 0) => {
                let worker = Worker {
                    registry: self.registry,
                    guardrails: self.guardrails,
                    retry_policy: self.retry_policy,
                    memory: self.memory,
                    collector: self.collector,
                    approval: self.approval,
                    circuit_breakers: self.circuit_breakers,
                };
                match worker.run_steps(plan, ctx, true).await {
                    Ok(result) => {
                        self.emit_stage(trace, ctx, LifecycleStage::Aggregate);
                        self.emit_stage(trace, ctx, LifecycleStage::Complete);
                        self.collector.end_trace(&ctx.trace_id, true);
                        AgentResponse::success(result.last_output.unwrap_or(serde_json::json!(null))).with_trace(trace.clone())
                    }
                    Err(retry_err) => self.finish_failed(trace, ctx, "EXECUTE", retry_err.message),
                }
            }
            ErrorPropagation::Retry => self.finish_failed(trace, ctx, "EXECUTE", err.message),
            // FALLBACK: invoke `RoutingDecision.fallback` if present, else
            // behave as FAIL_FAST (§4.1.3).
            ErrorPropagation::Fallback => match &routing.fallback {
                Some(fallback_target) => {
                    trace.push(serde_json::json!({
                        "event": "fallback",
                        "target": fallback_target,
                        "message": err.message,
                    }));
                    let worker = Worker {
                        registry: self.registry,
                        guardrails: self.guardrails,
                        retry_policy: self.retry_policy,
                        memory: self.memory,
                        collector: self.collector,
                        approval: self.approval,
                        circuit_breakers: self.circuit_breakers,
                    };
                    let fallback_step = PlanStep {
                        tool: fallback_target.clone(),
                        input: Default::default(),
                        reason: format!("fallback after failure: {}", err.message),
                        trace_id: ctx.trace_id.clone(),
                        index: plan.len(),
                    };
                    match worker.run_steps(std::slice::from_ref(&fallback_step), ctx, true).await {
                        Ok(result) => {
                            self.emit_stage(trace, ctx, LifecycleStage::Aggregate);
                            self.emit_stage(trace, ctx, LifecycleStage::Complete);
                            self.collector.end_trace(&ctx.trace_id, true);
                            AgentResponse::success(result.last_output.unwrap_or(serde_json::json!(null))).with_trace(trace.clone())
                        }
                        Err(fallback_err) => self.finish_failed(trace, ctx, "EXECUTE", fallback_err.message),
                    }
                }
                None => self.finish_failed(trace, ctx, "EXECUTE", err.message),
            },
        }
    }

    fn finish_failed(&self, trace: &mut Vec<serde_json::Value>, ctx: &ExecutionContext, stage: &str, message: String) -> AgentResponse {
        self.emit_stage(trace, ctx, LifecycleStage::Failed);
        self.collector.end_trace(&ctx.trace_id, false);
        let orchestration_error = OrchestrationError::new(stage, message, false);
        tracing::warn!(stage = %orchestration_error.stage, message = %orchestration_error.message, "orchestration failed");
        self.collector.emit(
            StructuredEvent::new(EventType::ErrorOccurred, &ctx.trace_id, EventStatus::Error)
                .with_attributes(serde_json::json!({"stage": orchestration_error.stage, "message": orchestration_error.message})),
        );
        let error = crate::errors::AgentError::execution(orchestration_error.message).with_trace(ctx.trace_id.clone());
        AgentResponse::error(error).with_trace(trace.clone())
    }

    fn finish_cancelled(&self, trace: &mut Vec<serde_json::Value>, ctx: &ExecutionContext) -> AgentResponse {
        self.emit_stage(trace, ctx, LifecycleStage::Cancelled);
        self.collector.end_trace(&ctx.trace_id, false);
        AgentResponse {
            status: ResponseStatus::Cancelled,
            result: None,
            error: None,
            trace: trace.clone(),
            metadata: Default::default(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn emit_stage(&self, trace: &mut Vec<serde_json::Value>, ctx: &ExecutionContext, stage: LifecycleStage) {
        trace.push(serde_json::json!({"event": "stage", "stage": stage.as_str(), "trace_id": ctx.trace_id}));
        tracing::debug!(stage = stage.as_str(), trace_id = %ctx.trace_id, "lifecycle stage");
        if stage.is_terminal() {
            self.sessions.end(&ctx.trace_id);
        } else {
            self.sessions.update(&ctx.trace_id, stage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::worker::AlwaysDenyApproval;
    use crate::config::BudgetConfig;
    use crate::memory::LocalMemory;
    use crate::registry::{NamespaceAllowlist, SandboxProfile, ToolSpec};
    use std::sync::Arc;

    fn registry_with_echo() -> ToolRegistry {
        let allowlist = NamespaceAllowlist::default();
        let mut registry = ToolRegistry::new();
        registry
            .register(
                "core",
                &allowlist,
                ToolSpec::new(
                    "search_flights",
                    "Search flights for a destination",
                    SandboxProfile::PySlim,
                    Arc::new(|_inputs, _ctx| Ok(serde_json::json!({"flights": []}))),
                ),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn happy_path_reaches_complete() {
        let registry = registry_with_echo();
        let memory = LocalMemory::new();
        let guardrails = GuardrailPolicy::new("default", vec![], BudgetConfig::default());
        let retry_policy = RetryPolicy::default();
        let collector = Collector::new(1000);
        let approval = AlwaysDenyApproval;
        let router = RoundRobinRouter::new();
        let circuit_breakers = CircuitBreakerRegistry::default();
        let sessions = SessionRegistry::new();

        let orchestrator = Orchestrator {
            registry: &registry,
            memory: &memory,
            guardrails: &guardrails,
            retry_policy: &retry_policy,
            collector: &collector,
            approval: &approval,
            router: &router,
            circuit_breakers: &circuit_breakers,
            sessions: &sessions,
            max_steps: 3,
            error_propagation: ErrorPropagation::FailFast,
        };

        let ctx = ExecutionContext::new("trace-orc-1");
        let cancellation = CancellationToken::new();
        let response = orchestrator.orchestrate("find cheap flights", &ctx, &cancellation).await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert!(response.is_well_formed());
        let stages: Vec<&str> = response
            .trace
            .iter()
            .filter_map(|v| v.get("stage").and_then(|s| s.as_str()))
            .collect();
        assert_eq!(stages, vec!["INITIALIZE", "PLAN", "ROUTE", "EXECUTE", "AGGREGATE", "COMPLETE"]);
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits_to_cancelled() {
        let registry = registry_with_echo();
        let memory = LocalMemory::new();
        let guardrails = GuardrailPolicy::new("default", vec![], BudgetConfig::default());
        let retry_policy = RetryPolicy::default();
        let collector = Collector::new(1000);
        let approval = AlwaysDenyApproval;
        let router = RoundRobinRouter::new();
        let circuit_breakers = CircuitBreakerRegistry::default();
        let sessions = SessionRegistry::new();

        let orchestrator = Orchestrator {
            registry: &registry,
            memory: &memory,
            guardrails: &guardrails,
            retry_policy: &retry_policy,
            collector: &collector,
            approval: &approval,
            router: &router,
            circuit_breakers: &circuit_breakers,
            sessions: &sessions,
            max_steps: 3,
            error_propagation: ErrorPropagation::FailFast,
        };

        let ctx = ExecutionContext::new("trace-orc-2");
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let response = orchestrator.orchestrate("find cheap flights", &ctx, &cancellation).await;
        assert_eq!(response.status, ResponseStatus::Cancelled);
    }

    #[tokio::test]
    async fn empty_registry_fails_at_plan_stage() {
        let registry = ToolRegistry::new();
        let memory = LocalMemory::new();
        let guardrails = GuardrailPolicy::new("default", vec![], BudgetConfig::default());
        let retry_policy = RetryPolicy::default();
        let collector = Collector::new(1000);
        let approval = AlwaysDenyApproval;
        let router = RoundRobinRouter::new();
        let circuit_breakers = CircuitBreakerRegistry::default();
        let sessions = SessionRegistry::new();

        let orchestrator = Orchestrator {
            registry: &registry,
            memory: &memory,
            guardrails: &guardrails,
            retry_policy: &retry_policy,
            collector: &collector,
            approval: &approval,
            router: &router,
            circuit_breakers: &circuit_breakers,
            sessions: &sessions,
            max_steps: 3,
            error_propagation: ErrorPropagation::FailFast,
        };

        let ctx = ExecutionContext::new("trace-orc-3");
        let cancellation = CancellationToken::new();
        let response = orchestrator.orchestrate("anything", &ctx, &cancellation).await;
        assert_eq!(response.status, ResponseStatus::Error);
    }

    fn fallback_orchestrator<'a>(
        registry: &'a ToolRegistry,
        memory: &'a LocalMemory,
        guardrails: &'a GuardrailPolicy,
        retry_policy: &'a RetryPolicy,
        collector: &'a Collector,
        approval: &'a AlwaysDenyApproval,
        router: &'a RoundRobinRouter,
        circuit_breakers: &'a CircuitBreakerRegistry,
        sessions: &'a SessionRegistry,
    ) -> Orchestrator<'a> {
        Orchestrator {
            registry,
            memory,
            guardrails,
            retry_policy,
            collector,
            approval,
            router,
            circuit_breakers,
            sessions,
            max_steps: 3,
            error_propagation: ErrorPropagation::Fallback,
        }
    }

    #[tokio::test]
    async fn fallback_invokes_routing_fallback_target_when_present() {
        let allowlist = NamespaceAllowlist::default();
        let mut registry = ToolRegistry::new();
        registry
            .register(
                "core",
                &allowlist,
                ToolSpec::new("fallback_tool", "fallback", SandboxProfile::PySlim, Arc::new(|_i, _c| Ok(serde_json::json!("fallback-ok")))),
            )
            .unwrap();
        let memory = LocalMemory::new();
        let guardrails = GuardrailPolicy::new("default", vec![], BudgetConfig::default());
        let retry_policy = RetryPolicy::default();
        let collector = Collector::new(1000);
        let approval = AlwaysDenyApproval;
        let router = RoundRobinRouter::new();
        let circuit_breakers = CircuitBreakerRegistry::default();
        let sessions = SessionRegistry::new();
        let orchestrator = fallback_orchestrator(&registry, &memory, &guardrails, &retry_policy, &collector, &approval, &router, &circuit_breakers, &sessions);

        let ctx = ExecutionContext::new("trace-fallback-1");
        let mut trace = Vec::new();
        let routing = RoutingDecision {
            target: "primary_tool".to_string(),
            reason: "test".to_string(),
            metadata: serde_json::json!({}),
            fallback: Some("fallback_tool".to_string()),
        };
        let err = crate::errors::AgentError::execution("primary tool failed");
        let response = orchestrator.handle_error(&mut trace, &ctx, err, &[], &routing).await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.result, Some(serde_json::json!("fallback-ok")));
        assert!(trace.iter().any(|v| v.get("event").and_then(|e| e.as_str()) == Some("fallback")));
    }

    #[tokio::test]
    async fn fallback_degrades_to_fail_fast_when_absent() {
        let registry = ToolRegistry::new();
        let memory = LocalMemory::new();
        let guardrails = GuardrailPolicy::new("default", vec![], BudgetConfig::default());
        let retry_policy = RetryPolicy::default();
        let collector = Collector::new(1000);
        let approval = AlwaysDenyApproval;
        let router = RoundRobinRouter::new();
        let circuit_breakers = CircuitBreakerRegistry::default();
        let sessions = SessionRegistry::new();
        let orchestrator = fallback_orchestrator(&registry, &memory, &guardrails, &retry_policy, &collector, &approval, &router, &circuit_breakers, &sessions);

        let ctx = ExecutionContext::new("trace-fallback-2");
        let mut trace = Vec::new();
        let routing = RoutingDecision {
            target: "primary_tool".to_string(),
            reason: "test".to_string(),
            metadata: serde_json::json!({}),
            fallback: None,
        };
        let err = crate::errors::AgentError::execution("primary tool failed");
        let response = orchestrator.handle_error(&mut trace, &ctx, err, &[], &routing).await;

        assert_eq!(response.status, ResponseStatus::Error);
    }
}
