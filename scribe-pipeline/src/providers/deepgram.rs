/// Deepgram speech-to-text provider.
///
/// Calls the hosted pre-recorded transcription endpoint with the session
/// audio and returns the top alternative of the first channel.
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::config::SttProviderConfig;
use crate::error::{PipelineError, PipelineResult, ProviderError};
use crate::providers::{error_from_status, SttProvider};
use crate::transcription::{SessionInput, Transcription};

pub struct DeepgramStt {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl DeepgramStt {
    pub fn new(config: &SttProviderConfig) -> PipelineResult<Self> {
        let SttProviderConfig::Deepgram {
            api_url,
            api_key,
            model,
        } = config;

        if api_key.is_empty() {
            return Err(PipelineError::Config(
                "Deepgram API key must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            model: model.clone(),
        })
    }
}

#[async_trait]
impl SttProvider for DeepgramStt {
    async fn transcribe(
        &self,
        input: &SessionInput,
        timeout: Duration,
    ) -> Result<Transcription, ProviderError> {
        let url = format!(
            "{}/v1/listen?model={}&smart_format=true",
            self.api_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", input.content_type.as_str())
            .timeout(timeout)
            .body(input.audio.clone())
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_status(status, body));
        }

        let parsed: ListenResponse = response.json().await.map_err(ProviderError::from_reqwest)?;

        let alternative = parsed
            .results
            .channels
            .first()
            .and_then(|channel| channel.alternatives.first())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("no transcript alternatives".to_string())
            })?;

        Ok(Transcription {
            text: alternative.transcript.clone(),
            confidence: alternative.confidence,
            audio_seconds: parsed.metadata.and_then(|m| m.duration),
            provider: self.name().to_string(),
            created_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "deepgram"
    }
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    metadata: Option<ListenMetadata>,
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenMetadata {
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    transcript: String,
    confidence: Option<f64>,
}
