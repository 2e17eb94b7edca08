//! Error propagation strategies (spec §4.1.3): how the orchestrator reacts
//! to a step failure once the worker's own per-step retry is exhausted.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPropagation {
    /// Stop the plan immediately and surface the error (default).
    #[default]
    FailFast,
    /// Record the error, skip the failed step, proceed with remaining steps.
    Continue,
    /// Re-run the entire remaining plan once more if the failure mode is
    /// retryable; otherwise behaves like `FailFast`.
    Retry,
    /// Surface a degraded success response rather than an error.
    Fallback,
}
