//! Pipeline counters.
//!
//! Recoverable failures (dropped payloads, clamped fields, persistence
//! errors) never interrupt processing; they surface here instead.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters shared by every pipeline stage.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    readings_received: AtomicU64,
    readings_applied: AtomicU64,
    decode_errors: AtomicU64,
    clamped_fields: AtomicU64,
    rejected_fields: AtomicU64,
    alerts_persisted: AtomicU64,
    alerts_suppressed: AtomicU64,
    alerts_failed: AtomicU64,
    persistence_failures: AtomicU64,
    brews_succeeded: AtomicU64,
    brews_rejected: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub readings_received: u64,
    pub readings_applied: u64,
    pub decode_errors: u64,
    pub clamped_fields: u64,
    pub rejected_fields: u64,
    pub alerts_persisted: u64,
    pub alerts_suppressed: u64,
    pub alerts_failed: u64,
    pub persistence_failures: u64,
    pub brews_succeeded: u64,
    pub brews_rejected: u64,
}

macro_rules! counters {
    ($($field:ident => $inc:ident),* $(,)?) => {
        impl PipelineMetrics {
            $(
                pub fn $inc(&self, n: u64) {
                    self.$field.fetch_add(n, Ordering::Relaxed);
                }
            )*

            #[must_use]
            pub fn snapshot(&self) -> MetricsSnapshot {
                MetricsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    readings_received => add_readings_received,
    readings_applied => add_readings_applied,
    decode_errors => add_decode_errors,
    clamped_fields => add_clamped_fields,
    rejected_fields => add_rejected_fields,
    alerts_persisted => add_alerts_persisted,
    alerts_suppressed => add_alerts_suppressed,
    alerts_failed => add_alerts_failed,
    persistence_failures => add_persistence_failures,
    brews_succeeded => add_brews_succeeded,
    brews_rejected => add_brews_rejected,
}
