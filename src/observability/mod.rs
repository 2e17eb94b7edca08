//! Observability Collector (spec §4.5): singleton, golden signals, PII
//! redaction, multi-exporter fan-out.

mod exporters;
mod redaction;

pub use exporters::{ConsoleExporter, Exporter, QueuedExporter};
pub use redaction::redact;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    PlanCreated,
    RouteDecision,
    ToolCallStart,
    ToolCallComplete,
    ToolCallError,
    BudgetWarning,
    BudgetExceeded,
    BudgetUpdated,
    ApprovalRequested,
    ApprovalReceived,
    ApprovalTimeout,
    MemoryUpdated,
    ErrorOccurred,
    TraceStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Success,
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredEvent {
    pub event_type: EventType,
    pub trace_id: String,
    pub timestamp_ns: u128,
    pub status: EventStatus,
    pub attributes: serde_json::Value,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
}

impl StructuredEvent {
    pub fn new(event_type: EventType, trace_id: impl Into<String>, status: EventStatus) -> Self {
        Self {
            event_type,
            trace_id: trace_id.into(),
            timestamp_ns: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            status,
            attributes: serde_json::json!({}),
            duration_ms: None,
            error_message: None,
        }
    }

    pub fn with_attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = redact(&attributes);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Rolling window of the last N=1000 latency samples per metric, with
/// p50/p95/p99 computed on demand.
struct LatencyWindow {
    samples: Vec<u64>,
    capacity: usize,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample_ms: u64) {
        if self.samples.len() >= self.capacity {
            self.samples.remove(0);
        }
        self.samples.push(sample_ms);
    }

    fn quantile(&self, q: f64) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 - 1.0) * q).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GoldenSignalsSnapshot {
    pub success_rate: f64,
    pub total_events: u64,
    pub tool_error_rate: f64,
    pub mean_steps_per_task: f64,
    pub budget_warnings: u64,
    pub budget_exceeded: u64,
    pub latency_p50_ms: HashMap<String, u64>,
    pub latency_p95_ms: HashMap<String, u64>,
    pub latency_p99_ms: HashMap<String, u64>,
}

struct CollectorState {
    buffer: Vec<StructuredEvent>,
    buffer_threshold: usize,
    successes: u64,
    total: u64,
    tool_calls: u64,
    tool_errors: u64,
    plan_step_counts: Vec<usize>,
    budget_warnings: u64,
    budget_exceeded: u64,
    latencies: HashMap<String, LatencyWindow>,
    active_traces: HashMap<String, bool>,
}

/// Singleton with process lifetime. Injectable for tests via `new` +
/// `reset_metrics`; no global `static` is required because the demo binary
/// owns a single instance and passes it by reference.
pub struct Collector {
    state: Mutex<CollectorState>,
    exporters: Mutex<Vec<Box<dyn Exporter>>>,
}

impl Collector {
    pub fn new(buffer_threshold: usize) -> Self {
        Self {
            state: Mutex::new(CollectorState {
                buffer: Vec::new(),
                buffer_threshold,
                successes: 0,
                total: 0,
                tool_calls: 0,
                tool_errors: 0,
                plan_step_counts: Vec::new(),
                budget_warnings: 0,
                budget_exceeded: 0,
                latencies: HashMap::new(),
                active_traces: HashMap::new(),
            }),
            exporters: Mutex::new(vec![Box::new(ConsoleExporter::new())]),
        }
    }

    pub fn with_exporters(buffer_threshold: usize, exporters: Vec<Box<dyn Exporter>>) -> Self {
        let collector = Self::new(buffer_threshold);
        *collector.exporters.lock().expect("collector mutex poisoned") = exporters;
        collector
    }

    pub fn start_trace(&self, trace_id: &str) {
        let mut state = self.state.lock().expect("collector mutex poisoned");
        state.active_traces.insert(trace_id.to_string(), true);
    }

    pub fn end_trace(&self, trace_id: &str, success: bool) {
        let mut state = self.state.lock().expect("collector mutex poisoned");
        state.active_traces.remove(trace_id);
        drop(state);
        self.emit(StructuredEvent::new(
            EventType::TraceStarted,
            trace_id,
            if success { EventStatus::Success } else { EventStatus::Error },
        ));
    }

    pub fn record_plan_steps(&self, count: usize) {
        let mut state = self.state.lock().expect("collector mutex poisoned");
        state.plan_step_counts.push(count);
    }

    pub fn record_latency(&self, metric: &str, duration_ms: u64) {
        let mut state = self.state.lock().expect("collector mutex poisoned");
        state
            .latencies
            .entry(metric.to_string())
            .or_insert_with(|| LatencyWindow::new(1000))
            .push(duration_ms);
    }

    /// Append to the bounded buffer, update golden signals, auto-flush (fan
    /// out to exporters) when the buffer reaches its threshold.
    pub fn emit(&self, event: StructuredEvent) {
        let should_flush = {
            let mut state = self.state.lock().expect("collector mutex poisoned");
            state.total += 1;
            match event.status {
                EventStatus::Success => state.successes += 1,
                EventStatus::Warning => {}
                EventStatus::Error => {}
            }
            match event.event_type {
                EventType::ToolCallStart => state.tool_calls += 1,
                EventType::ToolCallError => state.tool_errors += 1,
                EventType::BudgetWarning => state.budget_warnings += 1,
                EventType::BudgetExceeded => state.budget_exceeded += 1,
                _ => {}
            }
            if let Some(duration_ms) = event.duration_ms {
                let metric = metric_name_for(event.event_type);
                state
                    .latencies
                    .entry(metric.to_string())
                    .or_insert_with(|| LatencyWindow::new(1000))
                    .push(duration_ms);
            }
            state.buffer.push(event.clone());
            state.buffer.len() >= state.buffer_threshold
        };

        let exporters = self.exporters.lock().expect("collector mutex poisoned");
        for exporter in exporters.iter() {
            exporter.export(event.clone());
        }
        drop(exporters);

        if should_flush {
            self.flush();
        }
    }

    pub fn flush(&self) {
        let mut state = self.state.lock().expect("collector mutex poisoned");
        state.buffer.clear();
    }

    pub fn reset_metrics(&self) {
        let mut state = self.state.lock().expect("collector mutex poisoned");
        state.buffer.clear();
        state.successes = 0;
        state.total = 0;
        state.tool_calls = 0;
        state.tool_errors = 0;
        state.plan_step_counts.clear();
        state.budget_warnings = 0;
        state.budget_exceeded = 0;
        state.latencies.clear();
        state.active_traces.clear();
    }

    pub fn snapshot(&self) -> GoldenSignalsSnapshot {
        let state = self.state.lock().expect("collector mutex poisoned");
        let success_rate = if state.total > 0 {
            state.successes as f64 / state.total as f64 * 100.0
        } else {
            0.0
        };
        let tool_error_rate = if state.tool_calls > 0 {
            state.tool_errors as f64 / state.tool_calls as f64 * 100.0
        } else {
            0.0
        };
        let mean_steps_per_task = if state.plan_step_counts.is_empty() {
            0.0
        } else {
            state.plan_step_counts.iter().sum::<usize>() as f64 / state.plan_step_counts.len() as f64
        };

        let mut p50 = HashMap::new();
        let mut p95 = HashMap::new();
        let mut p99 = HashMap::new();
        for (metric, window) in &state.latencies {
            p50.insert(metric.clone(), window.quantile(0.50));
            p95.insert(metric.clone(), window.quantile(0.95));
            p99.insert(metric.clone(), window.quantile(0.99));
        }

        GoldenSignalsSnapshot {
            success_rate,
            total_events: state.total,
            tool_error_rate,
            mean_steps_per_task,
            budget_warnings: state.budget_warnings,
            budget_exceeded: state.budget_exceeded,
            latency_p50_ms: p50,
            latency_p95_ms: p95,
            latency_p99_ms: p99,
        }
    }

    pub fn snapshot_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::json!({}))
    }

    pub fn prometheus_text(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();
        out.push_str(&format!("# TYPE orc_success_rate gauge\norc_success_rate {:.4}\n", snapshot.success_rate));
        out.push_str(&format!(
            "# TYPE orc_tool_error_rate gauge\norc_tool_error_rate {:.4}\n",
            snapshot.tool_error_rate
        ));
        out.push_str(&format!(
            "# TYPE orc_mean_steps_per_task gauge\norc_mean_steps_per_task {:.4}\n",
            snapshot.mean_steps_per_task
        ));
        out.push_str(&format!("# TYPE orc_budget_warnings counter\norc_budget_warnings {}\n", snapshot.budget_warnings));
        out.push_str(&format!("# TYPE orc_budget_exceeded counter\norc_budget_exceeded {}\n", snapshot.budget_exceeded));
        for (metric, value) in &snapshot.latency_p50_ms {
            out.push_str(&format!("orc_latency_ms{{metric=\"{metric}\",quantile=\"0.5\"}} {value}\n"));
        }
        for (metric, value) in &snapshot.latency_p95_ms {
            out.push_str(&format!("orc_latency_ms{{metric=\"{metric}\",quantile=\"0.95\"}} {value}\n"));
        }
        for (metric, value) in &snapshot.latency_p99_ms {
            out.push_str(&format!("orc_latency_ms{{metric=\"{metric}\",quantile=\"0.99\"}} {value}\n"));
        }
        out
    }
}

fn metric_name_for(event_type: EventType) -> &'static str {
    match event_type {
        EventType::ToolCallStart | EventType::ToolCallComplete | EventType::ToolCallError => "tool_call",
        EventType::PlanCreated => "plan",
        EventType::RouteDecision => "route",
        EventType::ApprovalRequested | EventType::ApprovalReceived | EventType::ApprovalTimeout => "approval_wait",
        _ => "end_to_end",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_tracks_emitted_events() {
        let collector = Collector::new(1000);
        collector.emit(StructuredEvent::new(EventType::ToolCallComplete, "t1", EventStatus::Success));
        collector.emit(StructuredEvent::new(EventType::ToolCallError, "t1", EventStatus::Error));
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.success_rate, 50.0);
    }

    #[test]
    fn redaction_applied_to_attributes() {
        let collector = Collector::new(1000);
        let event = StructuredEvent::new(EventType::ToolCallStart, "t1", EventStatus::Success)
            .with_attributes(serde_json::json!({"api_key": "sk-xyz"}));
        assert_eq!(event.attributes["api_key"], serde_json::json!("[REDACTED]"));
        collector.emit(event);
    }

    #[test]
    fn reset_metrics_clears_counters() {
        let collector = Collector::new(1000);
        collector.emit(StructuredEvent::new(EventType::ToolCallComplete, "t1", EventStatus::Success));
        collector.reset_metrics();
        assert_eq!(collector.snapshot().total_events, 0);
    }
}
