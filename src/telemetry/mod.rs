//! Pipeline telemetry
//!
//! In-process event collection with aggregated counters. Cheap to clone;
//! every clone feeds the same collector.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Events kept for `recent_events`; older ones are dropped
pub const MAX_EVENTS: usize = 1024;

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    DocumentIndexed {
        tenant_id: String,
        document_id: String,
        chunks: usize,
        batches: usize,
        duration_ms: u64,
        timestamp: Instant,
    },
    DocumentDeleted {
        document_id: String,
        timestamp: Instant,
    },
    SearchPerformed {
        tenant_id: String,
        results: usize,
        duration_ms: u64,
        timestamp: Instant,
    },
    QueryAnswered {
        tenant_id: String,
        retrieved: usize,
        tokens_used: Option<u32>,
        duration_ms: u64,
        timestamp: Instant,
    },
    PipelineFailed {
        stage: &'static str,
        provider: Option<String>,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub documents_indexed: usize,
    pub chunks_embedded: usize,
    pub batches_written: usize,
    pub documents_deleted: usize,
    pub searches_performed: usize,
    pub queries_answered: usize,
    pub tokens_used: u64,
    pub failures: usize,
}

impl fmt::Display for TelemetryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Documents indexed: {}", self.documents_indexed)?;
        writeln!(f, "Chunks embedded:   {}", self.chunks_embedded)?;
        writeln!(f, "Batches written:   {}", self.batches_written)?;
        writeln!(f, "Documents deleted: {}", self.documents_deleted)?;
        writeln!(f, "Searches:          {}", self.searches_performed)?;
        writeln!(f, "Queries answered:  {}", self.queries_answered)?;
        writeln!(f, "Tokens used:       {}", self.tokens_used)?;
        write!(f, "Failures:          {}", self.failures)
    }
}

/// Telemetry collector
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<VecDeque<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                TelemetryEvent::DocumentIndexed {
                    chunks, batches, ..
                } => {
                    stats.documents_indexed += 1;
                    stats.chunks_embedded += chunks;
                    stats.batches_written += batches;
                }
                TelemetryEvent::DocumentDeleted { .. } => {
                    stats.documents_deleted += 1;
                }
                TelemetryEvent::SearchPerformed { .. } => {
                    stats.searches_performed += 1;
                }
                TelemetryEvent::QueryAnswered { tokens_used, .. } => {
                    stats.queries_answered += 1;
                    stats.tokens_used += u64::from(tokens_used.unwrap_or(0));
                }
                TelemetryEvent::PipelineFailed { .. } => {
                    stats.failures += 1;
                }
            }
        }

        let mut events = lock(&self.events);
        if events.len() == MAX_EVENTS {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Record a failed pipeline stage
    pub fn record_failure(&self, stage: &'static str, error: &crate::errors::RagError) {
        self.record(TelemetryEvent::PipelineFailed {
            stage,
            provider: error.provider().map(str::to_string),
            timestamp: Instant::now(),
        });
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        lock(&self.stats).clone()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Events currently retained
    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events.iter().skip(start).cloned().collect()
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Poisoned locks still yield their data
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RagError;

    fn indexed(chunks: usize) -> TelemetryEvent {
        TelemetryEvent::DocumentIndexed {
            tenant_id: "u1".to_string(),
            document_id: "doc".to_string(),
            chunks,
            batches: 1,
            duration_ms: 5,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_collector_creation() {
        let collector = TelemetryCollector::new();
        assert_eq!(collector.event_count(), 0);
        assert_eq!(collector.get_stats(), TelemetryStats::default());
    }

    #[test]
    fn test_index_events_aggregate() {
        let collector = TelemetryCollector::new();
        collector.record(indexed(3));
        collector.record(indexed(4));

        let stats = collector.get_stats();
        assert_eq!(stats.documents_indexed, 2);
        assert_eq!(stats.chunks_embedded, 7);
        assert_eq!(stats.batches_written, 2);
    }

    #[test]
    fn test_query_tokens_accumulate() {
        let collector = TelemetryCollector::new();
        for tokens in [Some(10), None, Some(5)] {
            collector.record(TelemetryEvent::QueryAnswered {
                tenant_id: "u1".to_string(),
                retrieved: 2,
                tokens_used: tokens,
                duration_ms: 1,
                timestamp: Instant::now(),
            });
        }
        let stats = collector.get_stats();
        assert_eq!(stats.queries_answered, 3);
        assert_eq!(stats.tokens_used, 15);
    }

    #[test]
    fn test_record_failure_keeps_provider() {
        let collector = TelemetryCollector::new();
        collector.record_failure("embed", &RagError::embedding("ollama", "down"));

        assert_eq!(collector.get_stats().failures, 1);
        match &collector.recent_events(1)[0] {
            TelemetryEvent::PipelineFailed { stage, provider, .. } => {
                assert_eq!(*stage, "embed");
                assert_eq!(provider.as_deref(), Some("ollama"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_events_are_bounded() {
        let collector = TelemetryCollector::new();
        for _ in 0..MAX_EVENTS + 10 {
            collector.record(indexed(1));
        }
        assert_eq!(collector.event_count(), MAX_EVENTS);
        assert_eq!(collector.get_stats().documents_indexed, MAX_EVENTS + 10);
        assert_eq!(collector.recent_events(3).len(), 3);
    }

    #[test]
    fn test_clones_share_state() {
        let collector = TelemetryCollector::new();
        let clone = collector.clone();
        clone.record(TelemetryEvent::DocumentDeleted {
            document_id: "doc".to_string(),
            timestamp: Instant::now(),
        });
        assert_eq!(collector.get_stats().documents_deleted, 1);
    }
}
