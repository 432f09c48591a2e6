//! Operational statistics for a server instance.
//!
//! Cumulative counters plus a capped rolling buffer of response-time
//! samples. The buffer never exceeds [`MAX_TIMING_SAMPLES`] entries; the
//! oldest sample is evicted first. Tracking can be disabled entirely, in
//! which case every record call is a no-op.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

/// Maximum number of response-time samples retained for min/avg/max.
pub const MAX_TIMING_SAMPLES: usize = 1000;

/// Detail of the most recent error, kept for the full report.
#[derive(Debug, Clone, Serialize)]
pub struct LastError {
    /// JSON-RPC error code.
    pub code: i32,
    /// Client-safe error message.
    pub message: String,
    /// Method that produced the error.
    pub method: String,
    /// When the error occurred.
    pub at: DateTime<Utc>,
}

/// Lightweight snapshot suitable for frequent polling.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    /// Seconds since the instance was created.
    pub uptime_seconds: i64,
    /// Total requests dispatched.
    pub total_requests: u64,
    /// Requests that produced a success envelope.
    pub successful: u64,
    /// Requests that produced an error envelope.
    pub failed: u64,
    /// Success rate as a percentage, rounded to two decimals.
    pub success_rate: f64,
    /// Average response time over the rolling buffer, in milliseconds.
    pub average_response_ms: f64,
    /// Total tool invocations.
    pub tool_invocations: u64,
    /// Total resource reads.
    pub resource_reads: u64,
    /// Total prompt generations.
    pub prompt_generations: u64,
    /// Timestamp of the most recent request, if any.
    pub last_request_at: Option<DateTime<Utc>>,
}

/// Full statistics breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// The polling summary.
    #[serde(flatten)]
    pub summary: StatsSummary,
    /// Request counts per method name.
    pub per_method: IndexMap<String, u64>,
    /// Invocation counts per tool name.
    pub per_tool: IndexMap<String, u64>,
    /// Read counts per resource URI.
    pub per_resource: IndexMap<String, u64>,
    /// Generation counts per prompt name.
    pub per_prompt: IndexMap<String, u64>,
    /// Error counts per JSON-RPC code.
    pub errors_by_code: IndexMap<i32, u64>,
    /// Minimum response time over the rolling buffer, in milliseconds.
    pub min_response_ms: f64,
    /// Maximum response time over the rolling buffer, in milliseconds.
    pub max_response_ms: f64,
    /// Number of samples currently in the rolling buffer.
    pub timing_samples: usize,
    /// Detail of the most recent error, if any.
    pub last_error: Option<LastError>,
}

/// Mutable statistics state for one server instance.
#[derive(Debug)]
pub struct ServerStats {
    enabled: bool,
    started_at: DateTime<Utc>,
    total_requests: u64,
    successful: u64,
    failed: u64,
    per_method: IndexMap<String, u64>,
    per_tool: IndexMap<String, u64>,
    per_resource: IndexMap<String, u64>,
    per_prompt: IndexMap<String, u64>,
    errors_by_code: IndexMap<i32, u64>,
    last_error: Option<LastError>,
    timings_ms: VecDeque<f64>,
    last_request_at: Option<DateTime<Utc>>,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    /// Creates an enabled, zeroed statistics state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            started_at: Utc::now(),
            total_requests: 0,
            successful: 0,
            failed: 0,
            per_method: IndexMap::new(),
            per_tool: IndexMap::new(),
            per_resource: IndexMap::new(),
            per_prompt: IndexMap::new(),
            errors_by_code: IndexMap::new(),
            last_error: None,
            timings_ms: VecDeque::new(),
            last_request_at: None,
        }
    }

    /// Enables or disables tracking. Disabled tracking turns every record
    /// call into a no-op; existing counters are left untouched.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns whether tracking is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records one dispatched request.
    pub fn record_request(
        &mut self,
        method: &str,
        duration_ms: f64,
        success: bool,
        error_code: Option<i32>,
    ) {
        if !self.enabled {
            return;
        }

        self.total_requests += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        *self.per_method.entry(method.to_string()).or_insert(0) += 1;
        if let Some(code) = error_code {
            *self.errors_by_code.entry(code).or_insert(0) += 1;
        }

        self.timings_ms.push_back(duration_ms);
        if self.timings_ms.len() > MAX_TIMING_SAMPLES {
            self.timings_ms.pop_front();
        }

        self.last_request_at = Some(Utc::now());
    }

    /// Records one tool invocation.
    pub fn record_tool_invocation(&mut self, tool_name: &str, duration_ms: f64) {
        if !self.enabled {
            return;
        }
        tracing::trace!(tool = tool_name, duration_ms, "tool invocation");
        *self.per_tool.entry(tool_name.to_string()).or_insert(0) += 1;
    }

    /// Records one resource read.
    pub fn record_resource_read(&mut self, uri: &str) {
        if !self.enabled {
            return;
        }
        *self.per_resource.entry(uri.to_string()).or_insert(0) += 1;
    }

    /// Records one prompt generation.
    pub fn record_prompt_generation(&mut self, prompt_name: &str) {
        if !self.enabled {
            return;
        }
        *self.per_prompt.entry(prompt_name.to_string()).or_insert(0) += 1;
    }

    /// Records the most recent error detail.
    pub fn record_error(&mut self, code: i32, message: &str, method: &str) {
        if !self.enabled {
            return;
        }
        self.last_error = Some(LastError {
            code,
            message: message.to_string(),
            method: method.to_string(),
            at: Utc::now(),
        });
    }

    /// Returns the lightweight polling summary.
    #[must_use]
    pub fn summary(&self) -> StatsSummary {
        let success_rate = if self.total_requests == 0 {
            100.0
        } else {
            round2(percentage(self.successful, self.total_requests))
        };

        StatsSummary {
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
            total_requests: self.total_requests,
            successful: self.successful,
            failed: self.failed,
            success_rate,
            average_response_ms: round2(self.average_ms()),
            tool_invocations: self.per_tool.values().sum(),
            resource_reads: self.per_resource.values().sum(),
            prompt_generations: self.per_prompt.values().sum(),
            last_request_at: self.last_request_at,
        }
    }

    /// Returns the full breakdown.
    #[must_use]
    pub fn report(&self) -> StatsReport {
        let (min, max) = self.timings_ms.iter().fold(
            (f64::INFINITY, 0.0_f64),
            |(min, max), &sample| (min.min(sample), max.max(sample)),
        );
        let min = if self.timings_ms.is_empty() { 0.0 } else { min };

        StatsReport {
            summary: self.summary(),
            per_method: self.per_method.clone(),
            per_tool: self.per_tool.clone(),
            per_resource: self.per_resource.clone(),
            per_prompt: self.per_prompt.clone(),
            errors_by_code: self.errors_by_code.clone(),
            min_response_ms: round2(min),
            max_response_ms: round2(max),
            timing_samples: self.timings_ms.len(),
            last_error: self.last_error.clone(),
        }
    }

    /// Zeroes all counters and clears the timing buffer.
    ///
    /// The instance creation time is kept so uptime keeps reflecting the
    /// server lifetime, not the last reset.
    pub fn reset(&mut self) {
        self.total_requests = 0;
        self.successful = 0;
        self.failed = 0;
        self.per_method.clear();
        self.per_tool.clear();
        self.per_resource.clear();
        self.per_prompt.clear();
        self.errors_by_code.clear();
        self.last_error = None;
        self.timings_ms.clear();
        self.last_request_at = None;
    }

    fn average_ms(&self) -> f64 {
        if self.timings_ms.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)] // buffer holds at most 1000 samples
        let count = self.timings_ms.len() as f64;
        self.timings_ms.iter().sum::<f64>() / count
    }
}

#[allow(clippy::cast_precision_loss)] // counters stay far below 2^52 in practice
fn percentage(part: u64, whole: u64) -> f64 {
    (part as f64 / whole as f64) * 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
