//! Resilient voice-to-clinical-note pipeline
//!
//! Turns a recorded clinical session into a structured note by orchestrating
//! two unreliable network dependencies (a speech-to-text provider and an LLM
//! note generator) behind a resilience layer that the surrounding API server
//! calls through one entry point, [`ScribePipeline::process`].
//!
//! # What the pipeline enforces
//!
//! - **Admission control**: token-bucket rate limiting per client identity,
//!   with a distinguishable rate-limited outcome and retry-after hint
//! - **Circuit breaking**: per-dependency Closed/Open/HalfOpen breakers so a
//!   degraded provider is probed, not hammered
//! - **Bounded retries**: exponential backoff with jitter for transient
//!   errors only; permanent errors fail fast
//! - **Deadline budgeting**: one total budget per request, split between the
//!   transcription and note-generation stages
//! - **Cancellation**: an upstream abort propagates into in-flight calls and
//!   pending backoff sleeps
//! - **Traceability**: one correlation id per request, stamped on every stage
//!   event and returned with the result
//!
//! # Example
//!
//! ```rust,no_run
//! use scribe_pipeline::{PipelineConfig, ProviderConfig, ScribePipeline, SessionInput};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_env()?;
//! let providers = ProviderConfig::from_env()?;
//! let pipeline = std::sync::Arc::new(ScribePipeline::new(config, &providers)?);
//!
//! # let audio_bytes = Vec::new();
//! let input = SessionInput::new(audio_bytes, 16_000, "audio/wav")
//!     .with_patient(json!({ "visit_type": "follow-up" }));
//!
//! let report = pipeline.process(input, "clinic-42").await;
//! println!("{} -> {}", report.correlation_id, report.outcome.label());
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod note;
pub mod pipeline;
pub mod providers;
pub mod rate_limiter;
pub mod result;
pub mod retry;
pub mod transcription;

pub use circuit_breaker::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use metrics::*;
pub use note::*;
pub use pipeline::*;
pub use rate_limiter::*;
pub use result::*;
pub use retry::*;
pub use transcription::*;
