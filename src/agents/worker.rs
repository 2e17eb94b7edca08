//! Worker Agent & Tool Execution pipeline (spec §4.4): resolve → validate →
//! approve → charge → invoke → record. Grounded on the teacher's
//! `OrchestratorClient::handle_*` discipline (short-lived locks, explicit
//! failure variants), generalized off MCP tool handlers onto `ToolSpec`.

use crate::context::ExecutionContext;
use crate::errors::{AgentError, AgentErrorType, FailureMode};
use crate::guardrails::{sample_jitter, CircuitBreakerRegistry, GuardrailPolicy, RetryPolicy};
use crate::io_contract::PlanStep;
use crate::memory::MemoryBackend;
use crate::observability::{Collector, EventStatus, EventType, StructuredEvent};
use crate::registry::ToolRegistry;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Denied,
    TimedOut,
}

/// HITL approval gate (spec §4.4 step 3). The approval service's UX is out
/// of scope; only this event protocol is fixed.
#[async_trait::async_trait]
pub trait ApprovalService: Send + Sync {
    async fn request_approval(&self, tool: &str, ctx: &ExecutionContext, timeout_seconds: u64) -> ApprovalOutcome;
}

/// Default: denies everything requiring approval (safe default — an
/// operator must supply a real approval service to unblock gated tools).
pub struct AlwaysDenyApproval;

#[async_trait::async_trait]
impl ApprovalService for AlwaysDenyApproval {
    async fn request_approval(&self, _tool: &str, _ctx: &ExecutionContext, _timeout_seconds: u64) -> ApprovalOutcome {
        ApprovalOutcome::Denied
    }
}

/// A recorded undo action for a completed step, executed in reverse
/// insertion order on a critical-step failure under FALLBACK.
#[derive(Debug, Clone)]
pub struct Compensation {
    pub step_index: usize,
    pub action: String,
}

#[derive(Debug)]
pub struct WorkerResult {
    pub last_output: Option<serde_json::Value>,
    pub trace: Vec<serde_json::Value>,
    pub compensations_executed: Vec<String>,
}

pub struct Worker<'a> {
    pub registry: &'a ToolRegistry,
    pub guardrails: &'a GuardrailPolicy,
    pub retry_policy: &'a RetryPolicy,
    pub memory: &'a dyn MemoryBackend,
    pub collector: &'a Collector,
    pub approval: &'a dyn ApprovalService,
    pub circuit_breakers: &'a CircuitBreakerRegistry,
}

impl<'a> Worker<'a> {
    /// Execute `steps` sequentially, producing the last step's output plus
    /// the merged trace. `fail_fast` mirrors the orchestrator's
    /// `ErrorPropagation::FailFast` (stop on first non-retryable failure);
    /// when false (`CONTINUE`), failures are recorded as warnings and
    /// execution proceeds.
    pub async fn run_steps(&self, steps: &[PlanStep], ctx: &ExecutionContext, fail_fast: bool) -> Result<WorkerResult, AgentError> {
        let mut trace = Vec::new();
        let mut last_output = None;
        let mut compensations: Vec<Compensation> = Vec::new();

        for step in steps {
            match self.run_single_step(step, ctx, &mut trace, &mut compensations).await {
                Ok(output) => last_output = Some(output),
                Err(err) => {
                    if fail_fast {
                        self.run_compensations(&mut compensations, &mut trace);
                        return Err(err);
                    }
                    trace.push(serde_json::json!({
                        "event": "tool_call_error_continue",
                        "trace_id": ctx.trace_id,
                        "step": step.index,
                        "message": err.message,
                    }));
                }
            }
        }

        Ok(WorkerResult {
            last_output,
            trace,
            compensations_executed: Vec::new(),
        })
    }

    async fn run_single_step(
        &self,
        step: &PlanStep,
        ctx: &ExecutionContext,
        trace: &mut Vec<serde_json::Value>,
        compensations: &mut Vec<Compensation>,
    ) -> Result<serde_json::Value, AgentError> {
        // 1. Resolve.
        let spec = self
            .registry
            .get(&step.tool)
            .ok_or_else(|| AgentError::validation(format!("tool '{}' not found in registry", step.tool)))?;

        if !self.guardrails.check_tool(&step.tool) {
            return Err(AgentError::permission(format!("tool '{}' is not allowlisted for this profile", step.tool)));
        }

        // 2. Validate inputs.
        spec.validate_inputs(&step.input)?;

        // 3. Approval gate.
        if spec.approval_required {
            self.collector.emit(StructuredEvent::new(EventType::ApprovalRequested, &ctx.trace_id, EventStatus::Warning));
            let outcome = self.approval.request_approval(&step.tool, ctx, spec.approval_timeout_seconds).await;
            match outcome {
                ApprovalOutcome::Approved => {
                    self.collector.emit(StructuredEvent::new(EventType::ApprovalReceived, &ctx.trace_id, EventStatus::Success));
                }
                ApprovalOutcome::Denied => {
                    self.collector.emit(StructuredEvent::new(EventType::ApprovalReceived, &ctx.trace_id, EventStatus::Error));
                    return Err(AgentError::permission(format!("approval denied for tool '{}'", step.tool)));
                }
                ApprovalOutcome::TimedOut => {
                    self.collector.emit(StructuredEvent::new(EventType::ApprovalTimeout, &ctx.trace_id, EventStatus::Error));
                    return Err(AgentError::permission(format!("approval timed out for tool '{}'", step.tool)));
                }
            }
        }

        // 4. Budget check.
        let estimated_tokens = spec.max_tokens.unwrap_or(0);
        let (allowed, warning) = self.guardrails.budget_guard(spec.cost, estimated_tokens);
        if warning {
            self.collector.emit(StructuredEvent::new(EventType::BudgetWarning, &ctx.trace_id, EventStatus::Warning));
        }
        if !allowed {
            self.collector.emit(StructuredEvent::new(EventType::BudgetExceeded, &ctx.trace_id, EventStatus::Error));
            return Err(AgentError {
                error_type: AgentErrorType::Resource,
                message: format!("budget exceeded before executing tool '{}'", step.tool),
                details: Default::default(),
                recoverable: false,
                retry_after: None,
                trace_context: Some(ctx.trace_id.clone()),
            });
        }

        // 5-7. Emit start, invoke with retry classification.
        let breaker = self.circuit_breakers.for_tool(&step.tool);
        if !breaker.allow_call() {
            return Err(AgentError {
                error_type: AgentErrorType::Resource,
                message: format!("circuit open for tool '{}', call rejected", step.tool),
                details: Default::default(),
                recoverable: true,
                retry_after: None,
                trace_context: Some(ctx.trace_id.clone()),
            });
        }

        let mut attempt = 0u32;
        loop {
            self.collector.emit(
                StructuredEvent::new(EventType::ToolCallStart, &ctx.trace_id, EventStatus::Success)
                    .with_attributes(serde_json::json!({"tool": step.tool, "inputs": step.input})),
            );
            trace.push(serde_json::json!({"event": "tool_call_start", "trace_id": ctx.trace_id, "tool": step.tool}));

            let started = Instant::now();
            let result = (spec.handler)(&step.input, ctx);
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    // 8. Commit charge, emit complete, remember.
                    breaker.on_success();
                    self.guardrails.charge(spec.cost, estimated_tokens);
                    self.collector.emit(
                        StructuredEvent::new(EventType::ToolCallComplete, &ctx.trace_id, EventStatus::Success)
                            .with_duration_ms(duration_ms),
                    );
                    trace.push(serde_json::json!({"event": "tool_call_complete", "trace_id": ctx.trace_id, "tool": step.tool}));
                    self.memory.remember(
                        &output.to_string(),
                        crate::memory::MemoryMetadata {
                            profile: ctx.profile.clone(),
                            trace_id: Some(ctx.trace_id.clone()),
                            tags: vec![],
                        },
                    );
                    compensations.push(Compensation {
                        step_index: step.index,
                        action: format!("undo:{}", step.tool),
                    });
                    return Ok(output);
                }
                Err(err) => {
                    breaker.on_failure();
                    let mode = FailureMode::classify_message(&err.message);
                    self.collector.emit(
                        StructuredEvent::new(EventType::ToolCallError, &ctx.trace_id, EventStatus::Error)
                            .with_duration_ms(duration_ms),
                    );
                    trace.push(serde_json::json!({"event": "tool_call_error", "trace_id": ctx.trace_id, "tool": step.tool}));

                    if self.retry_policy.should_retry(mode, attempt) {
                        attempt += 1;
                        let jitter_sample = sample_jitter(&ctx.trace_id, attempt);
                        let delay = self.retry_policy.delay_for_attempt(attempt, jitter_sample);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Execute recorded compensations in reverse insertion order on a
    /// critical-step failure. Compensation errors are logged, never raised.
    fn run_compensations(&self, compensations: &mut Vec<Compensation>, trace: &mut Vec<serde_json::Value>) {
        for comp in compensations.drain(..).rev() {
            trace.push(serde_json::json!({"event": "compensation", "action": comp.action, "step": comp.step_index}));
            tracing::info!(action = %comp.action, "running compensation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::memory::LocalMemory;
    use crate::registry::{NamespaceAllowlist, SandboxProfile, ToolSpec};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn guardrails() -> GuardrailPolicy {
        GuardrailPolicy::new("prod", vec![], crate::config::BudgetConfig::default())
    }

    #[tokio::test]
    async fn s4_retry_then_success() {
        let allowlist = NamespaceAllowlist::default();
        let mut registry = ToolRegistry::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        registry
            .register(
                "core",
                &allowlist,
                ToolSpec::new(
                    "flaky",
                    "flaky tool",
                    SandboxProfile::PySlim,
                    Arc::new(move |_inputs, _ctx| {
                        let n = attempts_clone.fetch_add(1, Ordering::SeqCst);
                        if n == 0 {
                            Err(AgentError::execution("network connection refused"))
                        } else {
                            Ok(serde_json::json!("ok"))
                        }
                    }),
                ),
            )
            .unwrap();

        let guardrail_policy = guardrails();
        let mut retry_cfg = RetryConfig::default();
        retry_cfg.initial_delay_ms = 1;
        retry_cfg.max_delay_ms = 2;
        let retry_policy = RetryPolicy::from(&retry_cfg);
        let memory = LocalMemory::new();
        let collector = Collector::new(1000);
        let approval = AlwaysDenyApproval;
        let circuit_breakers = CircuitBreakerRegistry::default();

        let worker = Worker {
            registry: &registry,
            guardrails: &guardrail_policy,
            retry_policy: &retry_policy,
            memory: &memory,
            collector: &collector,
            approval: &approval,
            circuit_breakers: &circuit_breakers,
        };

        let ctx = ExecutionContext::new("trace-s4");
        let steps = vec![PlanStep {
            tool: "flaky".to_string(),
            input: Default::default(),
            reason: "test".to_string(),
            trace_id: ctx.trace_id.clone(),
            index: 0,
        }];

        let result = worker.run_steps(&steps, &ctx, true).await.unwrap();
        assert_eq!(result.last_output, Some(serde_json::json!("ok")));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn s6_approval_denied_is_nonretryable_permission_error() {
        let allowlist = NamespaceAllowlist::default();
        let mut registry = ToolRegistry::new();
        registry
            .register(
                "core",
                &allowlist,
                ToolSpec::new("gated", "gated tool", SandboxProfile::PySlim, Arc::new(|_i, _c| Ok(serde_json::json!("unused"))))
                    .with_approval_required(true),
            )
            .unwrap();

        let guardrail_policy = guardrails();
        let retry_policy = RetryPolicy::default();
        let memory = LocalMemory::new();
        let collector = Collector::new(1000);
        let approval = AlwaysDenyApproval;
        let circuit_breakers = CircuitBreakerRegistry::default();

        let worker = Worker {
            registry: &registry,
            guardrails: &guardrail_policy,
            retry_policy: &retry_policy,
            memory: &memory,
            collector: &collector,
            approval: &approval,
            circuit_breakers: &circuit_breakers,
        };

        let ctx = ExecutionContext::new("trace-s6");
        let steps = vec![PlanStep {
            tool: "gated".to_string(),
            input: Default::default(),
            reason: "test".to_string(),
            trace_id: ctx.trace_id.clone(),
            index: 0,
        }];

        let err = worker.run_steps(&steps, &ctx, true).await.unwrap_err();
        assert!(matches!(err.error_type, AgentErrorType::Permission));
    }
}
