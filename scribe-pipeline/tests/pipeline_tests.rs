//! End-to-end pipeline tests with scripted providers.
//!
//! Each test builds a fresh pipeline (fresh breakers, fresh buckets) around
//! fake STT/LLM providers that fail in a scripted pattern, then asserts the
//! terminal outcome, the per-stage reports, and how often each dependency was
//! actually invoked.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use scribe_pipeline::providers::{NoteGenerator, SttProvider};
use scribe_pipeline::{
    BreakerConfig, ClinicalNote, NoteFormat, NoteStyle, PipelineConfig, PipelineError,
    PipelineOutcome, ProviderError, RateLimitConfig, RequestContext, RetryPolicy, ScribePipeline,
    SessionInput, Stage, StageOutcome, Transcription,
};

fn transcript(text: &str) -> Transcription {
    Transcription {
        text: text.to_string(),
        confidence: Some(0.97),
        audio_seconds: Some(30.0),
        provider: "scripted".to_string(),
        created_at: Utc::now(),
    }
}

fn note(text: &str) -> ClinicalNote {
    ClinicalNote {
        text: text.to_string(),
        format: NoteFormat::Soap,
        model: "scripted-model".to_string(),
        input_tokens: Some(100),
        output_tokens: Some(50),
        created_at: Utc::now(),
    }
}

fn unavailable() -> ProviderError {
    ProviderError::Status {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

fn bad_request() -> ProviderError {
    ProviderError::Status {
        status: 400,
        message: "bad request".to_string(),
    }
}

/// Fake STT provider that replays a script, then keeps returning a fallback.
struct ScriptedStt {
    script: Mutex<VecDeque<Result<Transcription, ProviderError>>>,
    fallback: Result<Transcription, ProviderError>,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedStt {
    fn new(
        script: Vec<Result<Transcription, ProviderError>>,
        fallback: Result<Transcription, ProviderError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        })
    }

    fn ok(text: &str) -> Arc<Self> {
        Self::new(Vec::new(), Ok(transcript(text)))
    }

    fn failing(error: ProviderError) -> Arc<Self> {
        Self::new(Vec::new(), Err(error))
    }

    fn slow(text: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(transcript(text)),
            delay,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SttProvider for ScriptedStt {
    async fn transcribe(
        &self,
        _input: &SessionInput,
        _timeout: Duration,
    ) -> Result<Transcription, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &str {
        "scripted-stt"
    }
}

/// Fake note generator with the same scripting behavior.
struct ScriptedLlm {
    script: Mutex<VecDeque<Result<ClinicalNote, ProviderError>>>,
    fallback: Result<ClinicalNote, ProviderError>,
    calls: AtomicU32,
}

impl ScriptedLlm {
    fn new(
        script: Vec<Result<ClinicalNote, ProviderError>>,
        fallback: Result<ClinicalNote, ProviderError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicU32::new(0),
        })
    }

    fn ok(text: &str) -> Arc<Self> {
        Self::new(Vec::new(), Ok(note(text)))
    }

    fn failing(error: ProviderError) -> Arc<Self> {
        Self::new(Vec::new(), Err(error))
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NoteGenerator for ScriptedLlm {
    async fn generate_note(
        &self,
        _transcript: &Transcription,
        _patient: &Value,
        _style: &NoteStyle,
        _timeout: Duration,
    ) -> Result<ClinicalNote, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &str {
        "scripted-llm"
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        jitter_fraction: 0.0,
        ..Default::default()
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        total_budget: Duration::from_secs(5),
        stt_deadline_fraction: 0.5,
        stt_retry: fast_retry(3),
        llm_retry: fast_retry(3),
        stt_breaker: BreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_millis(100),
            half_open_success_threshold: 1,
            half_open_probe_budget: 1,
        },
        llm_breaker: BreakerConfig::default(),
        rate_limit: RateLimitConfig {
            enabled: true,
            capacity: 100.0,
            refill_rate: 0.0,
            idle_timeout: Duration::from_secs(900),
        },
        note_style: NoteStyle::default(),
    }
}

fn pipeline(
    config: PipelineConfig,
    stt: Arc<ScriptedStt>,
    llm: Arc<ScriptedLlm>,
) -> ScribePipeline {
    ScribePipeline::with_providers(config, stt, llm).unwrap()
}

fn session() -> SessionInput {
    SessionInput::new(vec![0u8; 1024], 16_000, "audio/wav")
        .with_patient(json!({ "visit_type": "follow-up", "patient_name": "Jane Doe" }))
}

#[tokio::test]
async fn success_path_produces_note_with_stage_reports() {
    let stt = ScriptedStt::ok("patient reports intermittent chest pain");
    let llm = ScriptedLlm::ok("Subjective: intermittent chest pain ...");
    let pl = pipeline(test_config(), stt.clone(), llm.clone());

    let report = pl.process(session(), "clinic-a").await;

    let PipelineOutcome::Success { note, transcript } = &report.outcome else {
        panic!("expected success, got {:?}", report.outcome.label());
    };
    assert_eq!(note.text, "Subjective: intermittent chest pain ...");
    assert_eq!(transcript.text, "patient reports intermittent chest pain");
    assert_eq!(stt.calls(), 1);
    assert_eq!(llm.calls(), 1);

    // Admission, transcription, and note generation all reported
    assert_eq!(report.stages.len(), 3);
    assert!(report
        .stages
        .iter()
        .all(|s| s.outcome == StageOutcome::Succeeded));

    // Usage counters pass through untouched
    let stt_stage = report.stage(Stage::Transcription).unwrap();
    assert_eq!(stt_stage.usage.audio_seconds, Some(30.0));
    let llm_stage = report.stage(Stage::NoteGeneration).unwrap();
    assert_eq!(llm_stage.usage.input_tokens, Some(100));
    assert_eq!(llm_stage.usage.output_tokens, Some(50));

    let metrics = pl.metrics();
    assert_eq!(metrics.successful_requests, 1);
    assert_eq!(metrics.total_llm_input_tokens, 100);
    assert!((metrics.total_stt_audio_seconds - 30.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn correlation_id_is_fresh_per_request() {
    let pl = pipeline(test_config(), ScriptedStt::ok("text"), ScriptedLlm::ok("note"));

    let first = pl.process(session(), "clinic-a").await;
    let second = pl.process(session(), "clinic-a").await;

    assert!(!first.correlation_id.is_empty());
    assert_ne!(first.correlation_id, second.correlation_id);
}

#[tokio::test]
async fn stt_failure_short_circuits_note_generation() {
    let stt = ScriptedStt::failing(bad_request());
    let llm = ScriptedLlm::ok("never produced");
    let pl = pipeline(test_config(), stt.clone(), llm.clone());

    let report = pl.process(session(), "clinic-a").await;

    match &report.outcome {
        PipelineOutcome::Failure {
            error: PipelineError::NonRetryable { stage, .. },
        } => assert_eq!(*stage, Stage::Transcription),
        other => panic!("expected non-retryable transcription failure, got {other:?}"),
    }
    // Permanent error: exactly one attempt, and the LLM is never invoked
    assert_eq!(stt.calls(), 1);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn transient_stt_failures_are_retried_to_success() {
    let stt = ScriptedStt::new(
        vec![Err(unavailable()), Err(unavailable())],
        Ok(transcript("recovered transcript")),
    );
    let llm = ScriptedLlm::ok("note");
    let pl = pipeline(test_config(), stt.clone(), llm.clone());

    let report = pl.process(session(), "clinic-a").await;

    assert!(report.outcome.is_success());
    assert_eq!(stt.calls(), 3);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn llm_permanent_failure_is_partial_with_transcript() {
    let stt = ScriptedStt::ok("usable transcript");
    let llm = ScriptedLlm::failing(bad_request());
    let pl = pipeline(test_config(), stt.clone(), llm.clone());

    let report = pl.process(session(), "clinic-a").await;

    match &report.outcome {
        PipelineOutcome::PartialFailure {
            stage,
            transcript,
            error: PipelineError::NonRetryable { .. },
        } => {
            assert_eq!(*stage, Stage::NoteGeneration);
            assert_eq!(transcript.text, "usable transcript");
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
    assert_eq!(llm.calls(), 1);

    let metrics = pl.metrics();
    assert_eq!(metrics.partial_failures, 1);
    assert_eq!(metrics.failed_requests, 0);
}

#[tokio::test]
async fn rate_limiter_rejects_over_capacity_without_provider_calls() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        enabled: true,
        capacity: 2.0,
        refill_rate: 0.0,
        idle_timeout: Duration::from_secs(900),
    };
    let stt = ScriptedStt::ok("text");
    let llm = ScriptedLlm::ok("note");
    let pl = pipeline(config, stt.clone(), llm.clone());

    assert!(pl.process(session(), "clinic-a").await.outcome.is_success());
    assert!(pl.process(session(), "clinic-a").await.outcome.is_success());

    let third = pl.process(session(), "clinic-a").await;
    match &third.outcome {
        PipelineOutcome::Failure {
            error: PipelineError::RateLimited { .. },
        } => {}
        other => panic!("expected rate limited, got {other:?}"),
    }
    // The rejected request reached neither dependency
    assert_eq!(stt.calls(), 2);
    assert_eq!(llm.calls(), 2);

    // A different client is unaffected
    assert!(pl.process(session(), "clinic-b").await.outcome.is_success());

    assert_eq!(pl.metrics().rate_limited_requests, 1);
}

#[tokio::test]
async fn breaker_opens_after_sustained_stt_failures() {
    let mut config = test_config();
    config.stt_retry = fast_retry(1);
    config.stt_breaker = BreakerConfig {
        failure_threshold: 3,
        cooldown: Duration::from_secs(60),
        half_open_success_threshold: 1,
        half_open_probe_budget: 1,
    };
    let stt = ScriptedStt::failing(unavailable());
    let llm = ScriptedLlm::ok("note");
    let pl = pipeline(config, stt.clone(), llm.clone());

    for _ in 0..3 {
        let report = pl.process(session(), "clinic-a").await;
        assert!(matches!(
            report.outcome,
            PipelineOutcome::Failure {
                error: PipelineError::RetriesExhausted { .. }
            }
        ));
    }
    assert_eq!(stt.calls(), 3);

    // Circuit is now open: rejected immediately, dependency untouched
    let report = pl.process(session(), "clinic-a").await;
    match &report.outcome {
        PipelineOutcome::Failure {
            error: PipelineError::CircuitOpen { stage },
        } => assert_eq!(*stage, Stage::Transcription),
        other => panic!("expected circuit open, got {other:?}"),
    }
    assert_eq!(stt.calls(), 3);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn breaker_recovers_after_cooldown_probe_succeeds() {
    let mut config = test_config();
    config.stt_retry = fast_retry(1);
    config.stt_breaker = BreakerConfig {
        failure_threshold: 2,
        cooldown: Duration::from_millis(50),
        half_open_success_threshold: 1,
        half_open_probe_budget: 1,
    };
    let stt = ScriptedStt::new(
        vec![Err(unavailable()), Err(unavailable())],
        Ok(transcript("back online")),
    );
    let llm = ScriptedLlm::ok("note");
    let pl = pipeline(config, stt.clone(), llm);

    // Trip the breaker
    for _ in 0..2 {
        let report = pl.process(session(), "clinic-a").await;
        assert!(report.outcome.error().is_some());
    }

    tokio::time::sleep(Duration::from_millis(80)).await;

    // Cooldown elapsed: the probe goes through and closes the circuit
    let report = pl.process(session(), "clinic-a").await;
    assert!(report.outcome.is_success());
    assert_eq!(stt.calls(), 3);
}

#[tokio::test]
async fn empty_transcript_fails_without_note_generation() {
    let stt = ScriptedStt::ok("   ");
    let llm = ScriptedLlm::ok("never produced");
    let pl = pipeline(test_config(), stt, llm.clone());

    let report = pl.process(session(), "clinic-a").await;

    match &report.outcome {
        PipelineOutcome::Failure {
            error: PipelineError::NonRetryable { stage, .. },
        } => assert_eq!(*stage, Stage::Transcription),
        other => panic!("expected transcription failure, got {other:?}"),
    }
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn stage_deadline_bounds_slow_transcription() {
    let mut config = test_config();
    config.total_budget = Duration::from_millis(200);
    config.stt_retry = fast_retry(2);
    let stt = ScriptedStt::slow("too late", Duration::from_secs(10));
    let llm = ScriptedLlm::ok("note");
    let pl = pipeline(config, stt, llm.clone());

    let started = std::time::Instant::now();
    let report = pl.process(session(), "clinic-a").await;

    match report.outcome.error() {
        Some(PipelineError::DeadlineExceeded { stage }) => {
            assert_eq!(*stage, Stage::Transcription);
        }
        other => panic!("expected deadline exceeded, got {other:?}"),
    }
    assert_eq!(llm.calls(), 0);
    // The 10s provider sleep was cut at the stage deadline
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn upstream_cancellation_terminates_inflight_request() {
    let token = CancellationToken::new();
    let ctx = RequestContext::with_cancellation("clinic-a", Duration::from_secs(30), token.clone());

    let stt = ScriptedStt::slow("never finishes", Duration::from_secs(30));
    let llm = ScriptedLlm::ok("note");
    let pl = pipeline(test_config(), stt, llm.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
    });

    let started = std::time::Instant::now();
    let report = pl.process_with_context(session(), &ctx).await;
    canceller.await.unwrap();

    assert!(matches!(
        report.outcome,
        PipelineOutcome::Failure {
            error: PipelineError::Cancelled
        }
    ));
    assert_eq!(llm.calls(), 0);
    assert!(started.elapsed() < Duration::from_secs(2));
}
