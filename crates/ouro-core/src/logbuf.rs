// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! A `tracing_subscriber::Layer` that captures log events into an
//! in-process buffer.
//!
//! The buffer is process-wide, appended from any call site, and drained
//! exactly once per iteration into an `iteration_logs` row.  A capacity
//! cap drops the oldest entries so a pathological iteration cannot grow
//! the buffer without bound.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{Event, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use ouro_store::LogEntry;

/// Maximum buffered entries; beyond this the oldest are dropped.
const BUFFER_CAPACITY: usize = 10_000;

#[derive(Clone, Default)]
pub struct LogBuffer {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The layer to install in the subscriber registry.
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer {
            entries: Arc::clone(&self.entries),
        }
    }

    /// Take all buffered entries, leaving the buffer empty.
    pub fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct CaptureLayer {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);

        let entry = LogEntry {
            timestamp: Utc::now(),
            level: meta.level().to_string(),
            message: visitor.0,
            context: Some(meta.target().to_string()),
        };
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= BUFFER_CAPACITY {
            entries.remove(0);
        }
        entries.push(entry);
    }
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        } else if self.0.is_empty() {
            self.0 = format!("{}={value:?}", field.name());
        } else {
            self.0.push_str(&format!(", {}={value:?}", field.name()));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        } else if self.0.is_empty() {
            self.0 = format!("{}={value}", field.name());
        } else {
            self.0.push_str(&format!(", {}={value}", field.name()));
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    #[test]
    fn captures_events_and_drains_once() {
        let buffer = LogBuffer::new();
        let subscriber = tracing_subscriber::registry().with(buffer.layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("iteration started");
            tracing::warn!(attempt = 2, "retrying");
        });

        assert_eq!(buffer.len(), 2);
        let entries = buffer.drain();
        assert_eq!(entries[0].message, "iteration started");
        assert_eq!(entries[0].level, "INFO");
        assert!(entries[1].message.contains("retrying"));
        assert!(entries[1].message.contains("attempt=2"));
        // Drained exactly once; the buffer is empty afterwards.
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn entries_carry_target_as_context() {
        let buffer = LogBuffer::new();
        let subscriber = tracing_subscriber::registry().with(buffer.layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "ouro::driver", "hello");
        });
        let entries = buffer.drain();
        assert_eq!(entries[0].context.as_deref(), Some("ouro::driver"));
    }

    #[test]
    fn capacity_drops_oldest() {
        let buffer = LogBuffer::new();
        let subscriber = tracing_subscriber::registry().with(buffer.layer());
        tracing::subscriber::with_default(subscriber, || {
            for i in 0..(BUFFER_CAPACITY + 5) {
                tracing::info!("entry {i}");
            }
        });
        assert_eq!(buffer.len(), BUFFER_CAPACITY);
        let entries = buffer.drain();
        assert_eq!(entries[0].message, "entry 5");
    }
}
