use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::BreakerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::note::{NoteFormat, NoteStyle};
use crate::rate_limiter::RateLimitConfig;
use crate::retry::RetryPolicy;

/// STT provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SttProviderConfig {
    /// Hosted Deepgram speech-to-text
    Deepgram {
        api_url: String,
        api_key: String,
        model: String,
    },
}

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LlmProviderConfig {
    /// AWS Bedrock runtime (bearer-token auth against the converse endpoint)
    Bedrock {
        endpoint_url: String,
        api_key: String,
        model_id: String,
        max_output_tokens: u32,
    },
}

/// Both dependency configurations, read once at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub stt: SttProviderConfig,
    pub llm: LlmProviderConfig,
}

impl ProviderConfig {
    /// Load provider configuration from environment variables. API keys are
    /// required; endpoints and models fall back to service defaults.
    pub fn from_env() -> PipelineResult<Self> {
        let deepgram_api_key = std::env::var("DEEPGRAM_API_KEY")
            .map_err(|_| PipelineError::Config("DEEPGRAM_API_KEY is not set".to_string()))?;

        let stt = SttProviderConfig::Deepgram {
            api_url: std::env::var("DEEPGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.deepgram.com".to_string()),
            api_key: deepgram_api_key,
            model: std::env::var("DEEPGRAM_MODEL").unwrap_or_else(|_| "nova-2-medical".to_string()),
        };

        let bedrock_api_key = std::env::var("BEDROCK_API_KEY")
            .map_err(|_| PipelineError::Config("BEDROCK_API_KEY is not set".to_string()))?;

        let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let llm = LlmProviderConfig::Bedrock {
            endpoint_url: std::env::var("BEDROCK_ENDPOINT_URL")
                .unwrap_or_else(|_| format!("https://bedrock-runtime.{region}.amazonaws.com")),
            api_key: bedrock_api_key,
            model_id: std::env::var("BEDROCK_MODEL_ID")
                .unwrap_or_else(|_| "anthropic.claude-3-5-sonnet-20241022-v2:0".to_string()),
            max_output_tokens: std::env::var("BEDROCK_MAX_OUTPUT_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2048),
        };

        Ok(Self { stt, llm })
    }
}

/// Orchestration configuration: deadlines, retry policies, breakers, and the
/// admission limiter. Constructed once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Total wall-clock budget for one request
    pub total_budget: Duration,
    /// Fraction of the total budget reserved for the transcription stage
    pub stt_deadline_fraction: f64,
    pub stt_retry: RetryPolicy,
    pub llm_retry: RetryPolicy,
    pub stt_breaker: BreakerConfig,
    pub llm_breaker: BreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub note_style: NoteStyle,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            total_budget: Duration::from_secs(60),
            stt_deadline_fraction: 0.5,
            stt_retry: RetryPolicy::default(),
            llm_retry: RetryPolicy::default(),
            stt_breaker: BreakerConfig::default(),
            llm_breaker: BreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            note_style: NoteStyle::default(),
        }
    }
}

impl PipelineConfig {
    /// Load orchestration configuration from environment variables, falling
    /// back to defaults for anything unset. Validation failures here are
    /// fatal: the process must not start with a malformed configuration.
    pub fn from_env() -> PipelineResult<Self> {
        let total_budget_ms: u64 = std::env::var("SCRIBE_TOTAL_BUDGET_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60_000);

        let stt_deadline_fraction: f64 = std::env::var("SCRIBE_STT_DEADLINE_FRACTION")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.5);

        let base_delay_ms: u64 = std::env::var("SCRIBE_RETRY_BASE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);

        let max_delay_ms: u64 = std::env::var("SCRIBE_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8_000);

        let jitter_fraction: f64 = std::env::var("SCRIBE_RETRY_JITTER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.2);

        let stt_max_attempts: u32 = std::env::var("SCRIBE_STT_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let llm_max_attempts: u32 = std::env::var("SCRIBE_LLM_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let retry = |max_attempts| RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            jitter_fraction,
            ..Default::default()
        };

        let breaker = BreakerConfig {
            failure_threshold: std::env::var("SCRIBE_BREAKER_FAILURE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            cooldown: Duration::from_millis(
                std::env::var("SCRIBE_BREAKER_COOLDOWN_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60_000),
            ),
            half_open_success_threshold: std::env::var("SCRIBE_BREAKER_HALF_OPEN_SUCCESSES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            half_open_probe_budget: std::env::var("SCRIBE_BREAKER_PROBE_BUDGET")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        };

        let rate_limit = RateLimitConfig {
            enabled: std::env::var("SCRIBE_RATE_LIMIT_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            capacity: std::env::var("SCRIBE_RATE_LIMIT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60.0),
            refill_rate: std::env::var("SCRIBE_RATE_LIMIT_REFILL_PER_SEC")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            idle_timeout: Duration::from_secs(
                std::env::var("SCRIBE_RATE_LIMIT_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(900),
            ),
        };

        let note_style = NoteStyle {
            format: match std::env::var("SCRIBE_NOTE_FORMAT").as_deref() {
                Ok("narrative") => NoteFormat::Narrative,
                _ => NoteFormat::Soap,
            },
            specialty: std::env::var("SCRIBE_NOTE_SPECIALTY").ok(),
            extra_instructions: std::env::var("SCRIBE_NOTE_INSTRUCTIONS").ok(),
        };

        let config = Self {
            total_budget: Duration::from_millis(total_budget_ms),
            stt_deadline_fraction,
            stt_retry: retry(stt_max_attempts),
            llm_retry: retry(llm_max_attempts),
            stt_breaker: breaker.clone(),
            llm_breaker: breaker,
            rate_limit,
            note_style,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.total_budget.is_zero() {
            return Err(PipelineError::Config(
                "total_budget must be positive".to_string(),
            ));
        }
        if !(self.stt_deadline_fraction > 0.0 && self.stt_deadline_fraction < 1.0) {
            return Err(PipelineError::Config(
                "stt_deadline_fraction must be within (0, 1)".to_string(),
            ));
        }
        self.stt_retry.validate()?;
        self.llm_retry.validate()?;
        self.stt_breaker.validate()?;
        self.llm_breaker.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = PipelineConfig {
            total_budget: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_fraction_bounds_rejected() {
        for fraction in [0.0, 1.0, 1.5, -0.1] {
            let config = PipelineConfig {
                stt_deadline_fraction: fraction,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "fraction {fraction} accepted");
        }
    }

    #[test]
    fn test_nested_policy_validation_propagates() {
        let config = PipelineConfig {
            stt_retry: RetryPolicy {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
