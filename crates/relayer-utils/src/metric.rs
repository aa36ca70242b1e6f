// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;

use parking_lot::RwLock;
use prometheus::core::{AtomicF64, GenericCounter};
use prometheus::{Encoder, Opts, Registry, TextEncoder};

/// Names of every counter the relayer increments.
pub mod counter {
    /// `MessageSent` events persisted by the indexer.
    pub const MESSAGE_SENT_EVENTS_INDEXED: &str =
        "message_sent_events_indexed";
    /// `MessageStatusChanged` events persisted by the indexer.
    pub const MESSAGE_STATUS_CHANGED_EVENTS_INDEXED: &str =
        "message_status_changed_events_indexed";
    /// Events that replaced a stale row with the same msgHash.
    pub const MESSAGE_SENT_EVENTS_AFTER_REORG: &str =
        "message_sent_events_after_reorg";
    /// Event handler failures that were logged and skipped.
    pub const INDEXER_HANDLER_ERRORS: &str = "indexer_handler_errors";
    /// Live subscriptions that were torn down and re-established.
    pub const INDEXER_RESUBSCRIPTIONS: &str = "indexer_resubscriptions";
    /// `isMessageReceived` returned false for a freshly built proof.
    pub const PROCESSOR_MESSAGE_RECEIVED_FALSE: &str =
        "processor_message_received_false";
    /// Messages whose status read back as `Done`.
    pub const PROCESSOR_MESSAGES_DONE: &str = "processor_messages_done";
    /// Messages whose status read back as `Retriable`.
    pub const PROCESSOR_MESSAGES_RETRIABLE: &str =
        "processor_messages_retriable";
    /// Messages dropped after exhausting their retries.
    pub const PROCESSOR_MESSAGES_FAILED: &str = "processor_messages_failed";
    /// Messages skipped because the fee does not cover gas.
    pub const PROCESSOR_UNPROFITABLE: &str = "processor_unprofitable";
    /// Processing attempts that failed.
    pub const PROCESSOR_ERRORS: &str = "processor_errors";

    pub(crate) const ALL: &[(&str, &str)] = &[
        (MESSAGE_SENT_EVENTS_INDEXED, "MessageSent events indexed"),
        (
            MESSAGE_STATUS_CHANGED_EVENTS_INDEXED,
            "MessageStatusChanged events indexed",
        ),
        (
            MESSAGE_SENT_EVENTS_AFTER_REORG,
            "MessageSent events re-indexed after a reorg",
        ),
        (INDEXER_HANDLER_ERRORS, "Indexer event handler errors"),
        (INDEXER_RESUBSCRIPTIONS, "Indexer live subscription restarts"),
        (
            PROCESSOR_MESSAGE_RECEIVED_FALSE,
            "Proofs rejected by isMessageReceived",
        ),
        (PROCESSOR_MESSAGES_DONE, "Messages processed to Done"),
        (PROCESSOR_MESSAGES_RETRIABLE, "Messages left Retriable"),
        (PROCESSOR_MESSAGES_FAILED, "Messages dropped after retries"),
        (PROCESSOR_UNPROFITABLE, "Messages skipped as unprofitable"),
        (PROCESSOR_ERRORS, "Failed processing attempts"),
    ];
}

/// Something that counts named events.
///
/// The indexer and processor only see this trait, so they can run against
/// prometheus in production and against [`CountingMetrics`] in tests.
pub trait MetricsSink: Send + Sync {
    /// Increments the counter called `name` by one.
    fn inc_counter(&self, name: &str);
}

/// A struct definition for collecting metrics in the relayer.
#[derive(Debug)]
pub struct Metrics {
    registry: Registry,
    counters: RwLock<HashMap<String, GenericCounter<AtomicF64>>>,
}

impl Metrics {
    /// Instantiates the various metrics and their counters in the default
    /// prometheus registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(prometheus::default_registry().clone())
    }

    /// Same as [`Metrics::new`] but registers into `registry`.
    pub fn with_registry(
        registry: Registry,
    ) -> Result<Self, prometheus::Error> {
        let metrics = Self {
            registry,
            counters: Default::default(),
        };
        for (name, help) in counter::ALL {
            metrics.register(name, help)?;
        }
        Ok(metrics)
    }

    fn register(
        &self,
        name: &str,
        help: &str,
    ) -> Result<GenericCounter<AtomicF64>, prometheus::Error> {
        let c = GenericCounter::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(c.clone()))?;
        self.counters.write().insert(name.to_owned(), c.clone());
        Ok(c)
    }

    /// Current value of a counter, if it is registered.
    pub fn counter_value(&self, name: &str) -> Option<f64> {
        self.counters.read().get(name).map(|c| c.get())
    }

    /// Gathers the whole relayer metrics
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

impl MetricsSink for Metrics {
    fn inc_counter(&self, name: &str) {
        if let Some(c) = self.counters.read().get(name) {
            c.inc();
            return;
        }
        match self.register(name, name) {
            Ok(c) => c.inc(),
            Err(e) => {
                tracing::warn!(%name, "failed to register counter: {e}")
            }
        }
    }
}

/// In-memory counters, handy to assert on in tests.
#[derive(Debug, Default)]
pub struct CountingMetrics {
    counts: RwLock<HashMap<String, u64>>,
}

impl CountingMetrics {
    /// How many times `name` was incremented.
    pub fn get(&self, name: &str) -> u64 {
        self.counts.read().get(name).copied().unwrap_or_default()
    }
}

impl MetricsSink for CountingMetrics {
    fn inc_counter(&self, name: &str) {
        *self.counts.write().entry(name.to_owned()).or_default() += 1;
    }
}

/// Drops every increment.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn inc_counter(&self, _name: &str) {}
}

#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_known_counters_and_gathers() {
        let metrics = Metrics::with_registry(Registry::new()).unwrap();
        metrics.inc_counter(counter::PROCESSOR_MESSAGES_DONE);
        metrics.inc_counter(counter::PROCESSOR_MESSAGES_DONE);
        assert_eq!(
            metrics.counter_value(counter::PROCESSOR_MESSAGES_DONE),
            Some(2.0)
        );
        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("processor_messages_done 2"));
    }

    #[test]
    fn unknown_counters_are_registered_lazily() {
        let metrics = Metrics::with_registry(Registry::new()).unwrap();
        metrics.inc_counter("something_new");
        assert_eq!(metrics.counter_value("something_new"), Some(1.0));
    }

    #[test]
    fn counting_metrics_counts() {
        let metrics = CountingMetrics::default();
        metrics.inc_counter("a");
        metrics.inc_counter("a");
        assert_eq!(metrics.get("a"), 2);
        assert_eq!(metrics.get("b"), 0);
    }
}
