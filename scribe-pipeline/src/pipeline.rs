use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use redact_common::PatientRedactor;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{PipelineConfig, ProviderConfig};
use crate::context::RequestContext;
use crate::error::{PipelineError, PipelineResult, ProviderError};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::providers::{create_note_generator, create_stt_provider, NoteGenerator, SttProvider};
use crate::rate_limiter::RateLimiter;
use crate::result::{PipelineOutcome, PipelineReport, Stage, StageOutcome, StageReport, UsageCounters};
use crate::retry::RetryExecutor;
use crate::transcription::SessionInput;

/// Orchestrates one voice session through admission, transcription, and note
/// generation.
///
/// All shared resilience state (the two circuit breakers, the rate-limit
/// buckets, the metrics) is owned by this instance and created at startup.
/// Share the pipeline across request tasks behind an `Arc`; `process` is safe
/// to call concurrently.
pub struct ScribePipeline {
    config: PipelineConfig,
    stt: Arc<dyn SttProvider>,
    llm: Arc<dyn NoteGenerator>,
    stt_breaker: CircuitBreaker,
    llm_breaker: CircuitBreaker,
    rate_limiter: RateLimiter,
    metrics: MetricsCollector,
    redactor: PatientRedactor,
}

impl ScribePipeline {
    /// Build a pipeline with providers constructed from configuration.
    pub fn new(config: PipelineConfig, providers: &ProviderConfig) -> PipelineResult<Self> {
        let stt = create_stt_provider(&providers.stt)?;
        let llm = create_note_generator(&providers.llm)?;
        Self::with_providers(config, stt, llm)
    }

    /// Build a pipeline around caller-supplied providers. Breakers and
    /// buckets are fresh per instance, so tests get isolated state.
    pub fn with_providers(
        config: PipelineConfig,
        stt: Arc<dyn SttProvider>,
        llm: Arc<dyn NoteGenerator>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            stt_breaker: CircuitBreaker::new("transcription", config.stt_breaker.clone()),
            llm_breaker: CircuitBreaker::new("note_generation", config.llm_breaker.clone()),
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            metrics: MetricsCollector::new(),
            redactor: PatientRedactor::default(),
            config,
            stt,
            llm,
        })
    }

    /// Process one session end to end. Generates the request's correlation id
    /// and deadline, then runs the stages sequentially.
    pub async fn process(&self, input: SessionInput, client_identity: &str) -> PipelineReport {
        let ctx = RequestContext::new(client_identity, self.config.total_budget);
        self.process_with_context(input, &ctx).await
    }

    /// Like `process`, but with a caller-built context: the seam through
    /// which an upstream cancellation token reaches the stages.
    pub async fn process_with_context(
        &self,
        input: SessionInput,
        ctx: &RequestContext,
    ) -> PipelineReport {
        let mut stages = Vec::with_capacity(3);

        debug!(
            correlation_id = %ctx.correlation_id(),
            client = ctx.client_identity(),
            patient = %self.redactor.redact_value(&input.patient),
            "session received"
        );

        // Admission
        let admitted_at = Instant::now();
        if let Err(error) = self.rate_limiter.try_acquire(ctx.client_identity()) {
            self.record_stage(
                ctx,
                &mut stages,
                Stage::Admission,
                StageOutcome::Failed(error.kind().to_string()),
                admitted_at,
                UsageCounters::default(),
            );
            return self.finish(ctx, PipelineOutcome::Failure { error }, stages);
        }
        self.record_stage(
            ctx,
            &mut stages,
            Stage::Admission,
            StageOutcome::Succeeded,
            admitted_at,
            UsageCounters::default(),
        );

        if ctx.is_cancelled() {
            return self.finish(
                ctx,
                PipelineOutcome::Failure {
                    error: PipelineError::Cancelled,
                },
                stages,
            );
        }

        // Transcription, under its share of the total budget
        let stt_deadline = ctx.stage_deadline(self.config.stt_deadline_fraction);
        let stt_started = Instant::now();
        let stt_result = RetryExecutor::execute(
            ctx,
            &self.config.stt_retry,
            &self.stt_breaker,
            Stage::Transcription,
            stt_deadline,
            |timeout| self.stt.transcribe(&input, timeout),
        )
        .await;

        let transcript = match stt_result {
            Ok(transcript) if transcript.is_empty() => {
                // Nothing usable came back; a note from an empty transcript
                // would be fabrication.
                let error = PipelineError::NonRetryable {
                    stage: Stage::Transcription,
                    cause: ProviderError::InvalidResponse("empty transcript".to_string()),
                };
                self.record_stage(
                    ctx,
                    &mut stages,
                    Stage::Transcription,
                    StageOutcome::Failed(error.kind().to_string()),
                    stt_started,
                    UsageCounters::default(),
                );
                return self.finish(ctx, PipelineOutcome::Failure { error }, stages);
            }
            Ok(transcript) => {
                let usage = UsageCounters {
                    audio_seconds: transcript.audio_seconds,
                    ..Default::default()
                };
                if let Some(seconds) = transcript.audio_seconds {
                    self.metrics.record_stt_usage(seconds);
                }
                self.record_stage(
                    ctx,
                    &mut stages,
                    Stage::Transcription,
                    StageOutcome::Succeeded,
                    stt_started,
                    usage,
                );
                transcript
            }
            Err(error) => {
                self.record_stage(
                    ctx,
                    &mut stages,
                    Stage::Transcription,
                    StageOutcome::Failed(error.kind().to_string()),
                    stt_started,
                    UsageCounters::default(),
                );
                // Note generation is never attempted without a transcript
                return self.finish(ctx, PipelineOutcome::Failure { error }, stages);
            }
        };

        if ctx.is_cancelled() {
            return self.finish(
                ctx,
                PipelineOutcome::PartialFailure {
                    stage: Stage::NoteGeneration,
                    transcript,
                    error: PipelineError::Cancelled,
                },
                stages,
            );
        }

        // Note generation, under whatever remains of the total budget
        let llm_started = Instant::now();
        let llm_result = RetryExecutor::execute(
            ctx,
            &self.config.llm_retry,
            &self.llm_breaker,
            Stage::NoteGeneration,
            ctx.deadline(),
            |timeout| {
                self.llm
                    .generate_note(&transcript, &input.patient, &self.config.note_style, timeout)
            },
        )
        .await;

        match llm_result {
            Ok(note) => {
                let usage = UsageCounters {
                    input_tokens: note.input_tokens,
                    output_tokens: note.output_tokens,
                    ..Default::default()
                };
                self.metrics.record_llm_usage(
                    note.input_tokens.unwrap_or(0),
                    note.output_tokens.unwrap_or(0),
                );
                self.record_stage(
                    ctx,
                    &mut stages,
                    Stage::NoteGeneration,
                    StageOutcome::Succeeded,
                    llm_started,
                    usage,
                );
                self.finish(ctx, PipelineOutcome::Success { note, transcript }, stages)
            }
            Err(error) => {
                self.record_stage(
                    ctx,
                    &mut stages,
                    Stage::NoteGeneration,
                    StageOutcome::Failed(error.kind().to_string()),
                    llm_started,
                    UsageCounters::default(),
                );
                // The transcript survived; the caller can retry note
                // generation without re-running the session.
                self.finish(
                    ctx,
                    PipelineOutcome::PartialFailure {
                        stage: Stage::NoteGeneration,
                        transcript,
                        error,
                    },
                    stages,
                )
            }
        }
    }

    /// Current metrics snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn record_stage(
        &self,
        ctx: &RequestContext,
        stages: &mut Vec<StageReport>,
        stage: Stage,
        outcome: StageOutcome,
        started: Instant,
        usage: UsageCounters,
    ) {
        let latency_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            StageOutcome::Succeeded => info!(
                correlation_id = %ctx.correlation_id(),
                stage = stage.as_str(),
                outcome = "succeeded",
                latency_ms,
                usage = ?usage,
                "stage completed"
            ),
            StageOutcome::Failed(reason) => warn!(
                correlation_id = %ctx.correlation_id(),
                stage = stage.as_str(),
                outcome = "failed",
                reason = reason.as_str(),
                latency_ms,
                "stage failed"
            ),
        }
        stages.push(StageReport {
            stage,
            outcome,
            latency_ms,
            usage,
        });
    }

    fn finish(
        &self,
        ctx: &RequestContext,
        outcome: PipelineOutcome,
        stages: Vec<StageReport>,
    ) -> PipelineReport {
        let total_latency = ctx.started_at().elapsed();
        self.metrics.record_request(&outcome, total_latency);

        info!(
            correlation_id = %ctx.correlation_id(),
            outcome = outcome.label(),
            total_latency_ms = total_latency.as_millis() as u64,
            "request finished"
        );

        PipelineReport {
            correlation_id: ctx.correlation_id().to_string(),
            outcome,
            stages,
            total_latency,
            completed_at: Utc::now(),
        }
    }
}
