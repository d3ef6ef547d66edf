use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One inbound scribe session: captured audio plus the patient context the
/// note generator needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInput {
    /// Captured session audio
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    /// MIME type of the audio payload, e.g. "audio/wav"
    pub content_type: String,
    /// Opaque patient context forwarded to note generation. Redacted before
    /// any of it reaches a log line.
    pub patient: Value,
}

impl SessionInput {
    pub fn new(audio: Vec<u8>, sample_rate: u32, content_type: impl Into<String>) -> Self {
        Self {
            audio,
            sample_rate,
            content_type: content_type.into(),
            patient: Value::Null,
        }
    }

    pub fn with_patient(mut self, patient: Value) -> Self {
        self.patient = patient;
        self
    }
}

/// Transcript returned by the STT dependency, with whatever usage information
/// the provider reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub confidence: Option<f64>,
    /// Billable audio duration reported by the provider
    pub audio_seconds: Option<f64>,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl Transcription {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
