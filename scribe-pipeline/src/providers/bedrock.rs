/// AWS Bedrock note generator.
///
/// Calls the Bedrock runtime converse endpoint with the session transcript
/// and patient context, using bearer-token authentication.
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::LlmProviderConfig;
use crate::error::{PipelineError, PipelineResult, ProviderError};
use crate::note::{ClinicalNote, NoteFormat, NoteStyle};
use crate::providers::{error_from_status, NoteGenerator};
use crate::transcription::Transcription;

pub struct BedrockNoteGenerator {
    client: reqwest::Client,
    endpoint_url: String,
    api_key: String,
    model_id: String,
    max_output_tokens: u32,
}

impl BedrockNoteGenerator {
    pub fn new(config: &LlmProviderConfig) -> PipelineResult<Self> {
        let LlmProviderConfig::Bedrock {
            endpoint_url,
            api_key,
            model_id,
            max_output_tokens,
        } = config;

        if api_key.is_empty() {
            return Err(PipelineError::Config(
                "Bedrock API key must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint_url: endpoint_url.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            model_id: model_id.clone(),
            max_output_tokens: *max_output_tokens,
        })
    }

    fn system_prompt(style: &NoteStyle) -> String {
        let layout = match style.format {
            NoteFormat::Soap => {
                "Generate a SOAP note (Subjective, Objective, Assessment, Plan) from the transcript."
            }
            NoteFormat::Narrative => "Generate a narrative clinical summary from the transcript.",
        };

        let mut prompt = format!(
            "You are a clinical documentation assistant. {layout} \
             Do not add diagnoses or facts not explicitly stated. \
             Use concise, professional medical language."
        );
        if let Some(specialty) = &style.specialty {
            prompt.push_str(&format!(" The encounter specialty is {specialty}."));
        }
        if let Some(extra) = &style.extra_instructions {
            prompt.push(' ');
            prompt.push_str(extra);
        }
        prompt
    }
}

#[async_trait]
impl NoteGenerator for BedrockNoteGenerator {
    async fn generate_note(
        &self,
        transcript: &Transcription,
        patient: &Value,
        style: &NoteStyle,
        timeout: Duration,
    ) -> Result<ClinicalNote, ProviderError> {
        let url = format!("{}/model/{}/converse", self.endpoint_url, self.model_id);

        let user_text = format!(
            "Transcript:\n{}\n\nPatient context:\n{}",
            transcript.text, patient
        );

        let body = json!({
            "system": [{ "text": Self::system_prompt(style) }],
            "messages": [{
                "role": "user",
                "content": [{ "text": user_text }],
            }],
            "inferenceConfig": { "maxTokens": self.max_output_tokens },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_status(status, body));
        }

        let parsed: ConverseResponse =
            response.json().await.map_err(ProviderError::from_reqwest)?;

        let text = parsed
            .output
            .message
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "converse response carried no text blocks".to_string(),
            ));
        }

        Ok(ClinicalNote {
            text,
            format: style.format,
            model: self.model_id.clone(),
            input_tokens: parsed.usage.as_ref().and_then(|u| u.input_tokens),
            output_tokens: parsed.usage.as_ref().and_then(|u| u.output_tokens),
            created_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "bedrock"
    }
}

#[derive(Debug, Deserialize)]
struct ConverseResponse {
    output: ConverseOutput,
    usage: Option<ConverseUsage>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: ConverseMessage,
}

#[derive(Debug, Deserialize)]
struct ConverseMessage {
    content: Vec<ConverseContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ConverseContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConverseUsage {
    #[serde(rename = "inputTokens")]
    input_tokens: Option<u64>,
    #[serde(rename = "outputTokens")]
    output_tokens: Option<u64>,
}
