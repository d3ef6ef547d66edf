use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::PipelineError;
use crate::result::PipelineOutcome;

// Approximate provider pricing for the cost estimate; override-worthy only
// when the upstream contracts change.
const STT_COST_PER_MINUTE: f64 = 0.0125;
const LLM_INPUT_COST_PER_1K: f64 = 0.003;
const LLM_OUTPUT_COST_PER_1K: f64 = 0.015;

#[derive(Debug, Default)]
struct MetricsData {
    total_requests: u64,
    successful_requests: u64,
    partial_failures: u64,
    failed_requests: u64,
    rate_limited_requests: u64,
    total_stt_audio_seconds: f64,
    total_llm_input_tokens: u64,
    total_llm_output_tokens: u64,
    total_latency_ms: u64,
    latency_samples: u64,
}

/// Estimated spend derived from dependency-reported usage.
#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub stt_usd: f64,
    pub llm_input_usd: f64,
    pub llm_output_usd: f64,
    pub total_usd: f64,
}

/// Point-in-time view of the collector.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub partial_failures: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub total_stt_audio_seconds: f64,
    pub total_llm_input_tokens: u64,
    pub total_llm_output_tokens: u64,
    pub average_latency_ms: f64,
    pub error_rate: f64,
    pub uptime_seconds: u64,
    pub estimated_costs: CostEstimate,
    pub timestamp: DateTime<Utc>,
}

/// Thread-safe in-process metrics for the pipeline. Export/formatting is the
/// observability collaborator's job; this only aggregates.
#[derive(Debug)]
pub struct MetricsCollector {
    inner: Mutex<MetricsData>,
    started_at: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsData::default()),
            started_at: Instant::now(),
        }
    }

    /// Record a completed request with its terminal outcome and latency.
    pub fn record_request(&self, outcome: &PipelineOutcome, latency: Duration) {
        let mut data = self.inner.lock();
        data.total_requests += 1;
        match outcome {
            PipelineOutcome::Success { .. } => data.successful_requests += 1,
            PipelineOutcome::PartialFailure { .. } => data.partial_failures += 1,
            PipelineOutcome::Failure { error } => {
                data.failed_requests += 1;
                if matches!(error, PipelineError::RateLimited { .. }) {
                    data.rate_limited_requests += 1;
                }
            }
        }
        data.total_latency_ms += latency.as_millis() as u64;
        data.latency_samples += 1;
    }

    /// Record STT usage (billable audio seconds).
    pub fn record_stt_usage(&self, audio_seconds: f64) {
        self.inner.lock().total_stt_audio_seconds += audio_seconds;
    }

    /// Record LLM token usage.
    pub fn record_llm_usage(&self, input_tokens: u64, output_tokens: u64) {
        let mut data = self.inner.lock();
        data.total_llm_input_tokens += input_tokens;
        data.total_llm_output_tokens += output_tokens;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = self.inner.lock();

        let average_latency_ms = if data.latency_samples == 0 {
            0.0
        } else {
            data.total_latency_ms as f64 / data.latency_samples as f64
        };

        let error_rate = if data.total_requests == 0 {
            0.0
        } else {
            (data.failed_requests + data.partial_failures) as f64 / data.total_requests as f64
                * 100.0
        };

        let stt_usd = data.total_stt_audio_seconds / 60.0 * STT_COST_PER_MINUTE;
        let llm_input_usd = data.total_llm_input_tokens as f64 / 1000.0 * LLM_INPUT_COST_PER_1K;
        let llm_output_usd = data.total_llm_output_tokens as f64 / 1000.0 * LLM_OUTPUT_COST_PER_1K;

        MetricsSnapshot {
            total_requests: data.total_requests,
            successful_requests: data.successful_requests,
            partial_failures: data.partial_failures,
            failed_requests: data.failed_requests,
            rate_limited_requests: data.rate_limited_requests,
            total_stt_audio_seconds: data.total_stt_audio_seconds,
            total_llm_input_tokens: data.total_llm_input_tokens,
            total_llm_output_tokens: data.total_llm_output_tokens,
            average_latency_ms,
            error_rate,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            estimated_costs: CostEstimate {
                stt_usd,
                llm_input_usd,
                llm_output_usd,
                total_usd: stt_usd + llm_input_usd + llm_output_usd,
            },
            timestamp: Utc::now(),
        }
    }

    /// Reset all counters (useful between tests).
    pub fn reset(&self) {
        *self.inner.lock() = MetricsData::default();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
