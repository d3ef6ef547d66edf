use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::note::ClinicalNote;
use crate::transcription::Transcription;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Admission,
    Transcription,
    NoteGeneration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Admission => "admission",
            Stage::Transcription => "transcription",
            Stage::NoteGeneration => "note_generation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage counters reported by a dependency for one stage. The core passes
/// these through without interpreting them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageCounters {
    pub audio_seconds: Option<f64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "reason")]
pub enum StageOutcome {
    Succeeded,
    Failed(String),
}

/// Timing and outcome of a single stage, stamped with its usage counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub latency_ms: u64,
    #[serde(default)]
    pub usage: UsageCounters,
}

/// Terminal outcome of one pipeline request.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Both stages completed; the note is ready.
    Success {
        note: ClinicalNote,
        transcript: Transcription,
    },
    /// Transcription succeeded but a later stage did not. The transcript is
    /// returned so the caller can retry note generation without re-running
    /// the session.
    PartialFailure {
        stage: Stage,
        transcript: Transcription,
        error: PipelineError,
    },
    /// No usable result.
    Failure { error: PipelineError },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success { .. })
    }

    pub fn is_partial_failure(&self) -> bool {
        matches!(self, PipelineOutcome::PartialFailure { .. })
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            PipelineOutcome::Success { .. } => None,
            PipelineOutcome::PartialFailure { error, .. } => Some(error),
            PipelineOutcome::Failure { error } => Some(error),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineOutcome::Success { .. } => "success",
            PipelineOutcome::PartialFailure { .. } => "partial_failure",
            PipelineOutcome::Failure { .. } => "failure",
        }
    }
}

/// Everything the caller gets back from `process`: the outcome, per-stage
/// reports, and the correlation id that every log line for this request
/// carries.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub correlation_id: String,
    pub outcome: PipelineOutcome,
    pub stages: Vec<StageReport>,
    pub total_latency: Duration,
    pub completed_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}
