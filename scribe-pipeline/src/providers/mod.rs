pub mod bedrock;
pub mod deepgram;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{LlmProviderConfig, SttProviderConfig};
use crate::error::{PipelineResult, ProviderError};
use crate::note::{ClinicalNote, NoteStyle};
use crate::transcription::{SessionInput, Transcription};

/// Speech-to-text dependency. Implementations bound their own I/O to the
/// given timeout; the retry layer enforces it regardless.
#[async_trait]
pub trait SttProvider: Send + Sync {
    async fn transcribe(
        &self,
        input: &SessionInput,
        timeout: Duration,
    ) -> Result<Transcription, ProviderError>;

    fn name(&self) -> &str;
}

/// Note-generation dependency.
#[async_trait]
pub trait NoteGenerator: Send + Sync {
    async fn generate_note(
        &self,
        transcript: &Transcription,
        patient: &Value,
        style: &NoteStyle,
        timeout: Duration,
    ) -> Result<ClinicalNote, ProviderError>;

    fn name(&self) -> &str;
}

/// Create an STT provider instance based on configuration
pub fn create_stt_provider(config: &SttProviderConfig) -> PipelineResult<Arc<dyn SttProvider>> {
    match config {
        SttProviderConfig::Deepgram { .. } => Ok(Arc::new(deepgram::DeepgramStt::new(config)?)),
    }
}

/// Create a note generator instance based on configuration
pub fn create_note_generator(
    config: &LlmProviderConfig,
) -> PipelineResult<Arc<dyn NoteGenerator>> {
    match config {
        LlmProviderConfig::Bedrock { .. } => {
            Ok(Arc::new(bedrock::BedrockNoteGenerator::new(config)?))
        }
    }
}

/// Map an unsuccessful HTTP status onto the provider error taxonomy.
pub(crate) fn error_from_status(status: reqwest::StatusCode, body: String) -> ProviderError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        ProviderError::Auth(body)
    } else {
        ProviderError::Status {
            status: status.as_u16(),
            message: body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_statuses_are_permanent() {
        let err = error_from_status(reqwest::StatusCode::UNAUTHORIZED, "denied".to_string());
        assert!(matches!(err, ProviderError::Auth(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = error_from_status(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            "overloaded".to_string(),
        );
        assert!(err.is_retryable());

        let err = error_from_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "slow down".to_string(),
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let err = error_from_status(reqwest::StatusCode::BAD_REQUEST, "bad audio".to_string());
        assert!(!err.is_retryable());
    }
}
