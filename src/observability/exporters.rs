//! Exporter contract (spec §4.5): `export(event)` must be non-blocking from
//! the caller's perspective and degrade silently on failure.

use super::StructuredEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;

pub trait Exporter: Send + Sync {
    fn export(&self, event: StructuredEvent);
    fn failure_count(&self) -> u64 {
        0
    }
}

/// Offline-first default: stdout JSON, nothing about correctness depends
/// on network availability.
pub struct ConsoleExporter {
    failures: AtomicU64,
}

impl ConsoleExporter {
    pub fn new() -> Self {
        Self {
            failures: AtomicU64::new(0),
        }
    }
}

impl Default for ConsoleExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter for ConsoleExporter {
    fn export(&self, event: StructuredEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Queue-backed exporter for an OTLP-style sink. The collector only ever
/// pushes onto the channel (non-blocking unless the queue is full); a
/// background drain is the transport adapter's responsibility, kept outside
/// this crate per the transport non-goal.
pub struct QueuedExporter {
    sender: Sender<StructuredEvent>,
    receiver: Mutex<mpsc::Receiver<StructuredEvent>>,
    failures: AtomicU64,
}

impl QueuedExporter {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            failures: AtomicU64::new(0),
        }
    }

    /// Drain whatever is currently queued, for tests and for a transport
    /// adapter's flush loop.
    pub fn drain(&self) -> Vec<StructuredEvent> {
        let receiver = self.receiver.lock().expect("exporter mutex poisoned");
        receiver.try_iter().collect()
    }
}

impl Default for QueuedExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter for QueuedExporter {
    fn export(&self, event: StructuredEvent) {
        if self.sender.send(event).is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
