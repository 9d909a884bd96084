//! # Metrics Module
//!
//! Counters emitted by the request dispatcher. The sink is injected, so there
//! is no process-wide registry.
//!
//! ## Key Components
//!
//! - `Counter`: the counters the dispatcher knows about
//! - `MetricsSink`: the injected interface
//! - `InMemoryMetrics`: accumulates values, used for summaries and tests
//! - `TracingMetrics`: emits `monotonic_counter.*` events that
//!   `tracing_opentelemetry::MetricsLayer` exports as OTLP counters
//! - `NoopMetrics`: discards everything

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::info;

/// Component tag attached to every exported counter
pub const COMPONENT: &str = "OpenAITextEmbeddings";

/// Counters maintained by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Total time spent in client-side throttling delays, in seconds
    CumulativeThrottlingSeconds,
    /// Retries scheduled after transient failures
    Retries,
    /// Remote calls issued
    Requests,
}

impl Counter {
    pub fn name(&self) -> &'static str {
        match self {
            Counter::CumulativeThrottlingSeconds => "cumulativeThrottlingSeconds",
            Counter::Retries => "retries",
            Counter::Requests => "requests",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Destination for dispatcher counters
pub trait MetricsSink: Send + Sync {
    /// Add `value` to a monotonically increasing counter.
    fn increment(&self, counter: Counter, value: f64);
}

/// Sink that keeps running totals in memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<Counter, f64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current total of `counter`; zero if it was never incremented.
    pub fn get(&self, counter: Counter) -> f64 {
        self.counters
            .lock()
            .map(|counters| counters.get(&counter).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Snapshot of every counter that has been incremented.
    pub fn snapshot(&self) -> Vec<(Counter, f64)> {
        let mut entries: Vec<(Counter, f64)> = self
            .counters
            .lock()
            .map(|counters| counters.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default();
        entries.sort_by_key(|(counter, _)| counter.name());
        entries
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, counter: Counter, value: f64) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(counter).or_default() += value;
        }
    }
}

/// Sink that reports counters as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn increment(&self, counter: Counter, value: f64) {
        match counter {
            Counter::CumulativeThrottlingSeconds => {
                info!(
                    monotonic_counter.cumulative_throttling_seconds = value,
                    component = COMPONENT
                )
            }
            Counter::Retries => {
                info!(monotonic_counter.embedding_retries = value, component = COMPONENT)
            }
            Counter::Requests => {
                info!(monotonic_counter.embedding_requests = value, component = COMPONENT)
            }
        }
    }
}

/// Sink that forwards to several sinks
pub struct FanoutMetrics {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutMetrics {
    pub fn new(sinks: Vec<Arc<dyn MetricsSink>>) -> Self {
        Self { sinks }
    }
}

impl MetricsSink for FanoutMetrics {
    fn increment(&self, counter: Counter, value: f64) {
        for sink in &self.sinks {
            sink.increment(counter, value);
        }
    }
}

/// Sink that drops every increment
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _counter: Counter, _value: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_accumulates() {
        let metrics = InMemoryMetrics::new();
        metrics.increment(Counter::CumulativeThrottlingSeconds, 5.0);
        metrics.increment(Counter::CumulativeThrottlingSeconds, 5.0);
        metrics.increment(Counter::Requests, 1.0);

        assert_eq!(metrics.get(Counter::CumulativeThrottlingSeconds), 10.0);
        assert_eq!(metrics.get(Counter::Requests), 1.0);
        assert_eq!(metrics.get(Counter::Retries), 0.0);
    }

    #[test]
    fn test_snapshot_is_sorted_by_name() {
        let metrics = InMemoryMetrics::new();
        metrics.increment(Counter::Retries, 2.0);
        metrics.increment(Counter::CumulativeThrottlingSeconds, 5.0);

        let snapshot = metrics.snapshot();
        assert_eq!(
            snapshot,
            vec![
                (Counter::CumulativeThrottlingSeconds, 5.0),
                (Counter::Retries, 2.0),
            ]
        );
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(InMemoryMetrics::new());
        let second = Arc::new(InMemoryMetrics::new());
        let fanout = FanoutMetrics::new(vec![
            first.clone() as Arc<dyn MetricsSink>,
            second.clone(),
            Arc::new(NoopMetrics),
        ]);

        fanout.increment(Counter::Requests, 3.0);

        assert_eq!(first.get(Counter::Requests), 3.0);
        assert_eq!(second.get(Counter::Requests), 3.0);
    }
}
