//! Core orchestration substrate for a multi-agent task execution system:
//! the Orchestrator Protocol, Agent Lifecycle, canonical request/response
//! contract, Tool Registry & execution pipeline, Vector Memory substrate,
//! and Observability collector. Tool handler bodies, LLM invocation,
//! transport/auth, concrete vector-DB/sandbox backends, and any
//! frontend/CLI/deployment surface beyond the demo binary are out of scope.

pub mod agents;
pub mod config;
pub mod context;
pub mod errors;
pub mod guardrails;
pub mod io_contract;
pub mod memory;
pub mod observability;
pub mod orchestrator;
pub mod registry;
pub mod routing;

pub use context::ExecutionContext;
pub use errors::{AgentError, AgentErrorType, FailureMode, OrchestrationError};
pub use io_contract::{AgentRequest, AgentResponse, PlanStep, RequestMetadata, ResponseStatus};
pub use orchestrator::{ErrorPropagation, LifecycleStage, Orchestrator};
