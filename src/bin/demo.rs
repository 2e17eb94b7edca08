//! Thin CLI that loads `Config`, wires a small registry of example tools,
//! runs one orchestration, and prints the resulting events. Mirrors the
//! teacher's `main.rs` tracing-subscriber + config-loading wiring, thinned
//! from a multi-subcommand CLI down to a single demo run.

use anyhow::Result;
use clap::Parser;
use orc_substrate::agents::worker::AlwaysDenyApproval;
use orc_substrate::config::Config;
use orc_substrate::context::ExecutionContext;
use orc_substrate::guardrails::{CircuitBreakerRegistry, GuardrailPolicy, RetryPolicy};
use orc_substrate::memory::{LocalMemory, MemoryBackend};
use orc_substrate::observability::Collector;
use orc_substrate::registry::{NamespaceAllowlist, SandboxProfile, ToolRegistry, ToolSpec};
use orc_substrate::routing::RoundRobinRouter;
use orc_substrate::orchestrator::{SessionCheckpoint, SessionRegistry};
use orc_substrate::{ErrorPropagation, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "orc-substrate")]
#[command(author, version, about = "Run one orchestration against a small demo tool registry")]
struct Cli {
    /// Natural-language goal to plan and execute
    #[arg(short, long, default_value = "find cheap flights")]
    goal: String,

    /// Path to a YAML config file (defaults to built-in defaults + env overrides)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn demo_registry() -> ToolRegistry {
    let allowlist = NamespaceAllowlist::default();
    let mut registry = ToolRegistry::new();
    registry
        .register(
            "core",
            &allowlist,
            ToolSpec::new(
                "search_flights",
                "Search flights for a destination and date range",
                SandboxProfile::PySlim,
                Arc::new(|inputs, _ctx| Ok(serde_json::json!({"matched": inputs.get("goal")}))),
            )
            .with_cost(0.02)
            .with_tags(vec!["flights".to_string(), "search".to_string()]),
        )
        .expect("static registration");
    registry
        .register(
            "core",
            &allowlist,
            ToolSpec::new(
                "compare_prices",
                "Compare prices across search results",
                SandboxProfile::PySlim,
                Arc::new(|_inputs, _ctx| Ok(serde_json::json!({"cheapest": "carrier-x"}))),
            )
            .with_cost(0.01)
            .with_tags(vec!["prices".to_string(), "compare".to_string()]),
        )
        .expect("static registration");
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("info") };
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    info!("orc-substrate demo starting");

    let config = Config::load_with_env(cli.config.as_ref())?;
    info!(profile = %config.profile, max_steps = config.max_steps, "configuration loaded");

    let registry = demo_registry();
    let memory = LocalMemory::with_persistence(config.memory_state_path.clone());
    let guardrails = GuardrailPolicy::new(config.profile.clone(), vec![], config.budget.clone());
    let retry_policy = RetryPolicy::from(&config.retry);
    let collector = Collector::new(config.observability.buffer_size);
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
        max_steps: config.max_steps,
        error_propagation: ErrorPropagation::FailFast,
    };

    let ctx = ExecutionContext::new(uuid_like_trace_id());
    let cancellation = CancellationToken::new();
    let response = orchestrator.orchestrate(&cli.goal, &ctx, &cancellation).await;

    memory.flush().ok();

    let checkpoint_dir = config.memory_state_path.parent().unwrap_or_else(|| std::path::Path::new(".")).join("sessions");
    let checkpoint = SessionCheckpoint::new(ctx.trace_id.clone(), cli.goal.clone(), "COMPLETE", response.trace.clone());
    if let Err(e) = checkpoint.save(&checkpoint_dir) {
        tracing::warn!(error = %e, "failed to persist session checkpoint");
    }

    println!("{}", serde_json::to_string_pretty(&response)?);
    println!("\n--- golden signals ---");
    println!("{}", collector.prometheus_text());

    Ok(())
}

/// A trace id unique enough for a single demo run, without pulling in a
/// dedicated UUID dependency the rest of the crate has no other use for.
fn uuid_like_trace_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("trace-{nanos:x}")
}
