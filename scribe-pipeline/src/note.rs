use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clinical note layout requested from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteFormat {
    /// Subjective / Objective / Assessment / Plan
    Soap,
    /// Free-form narrative summary
    Narrative,
}

impl NoteFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteFormat::Soap => "soap",
            NoteFormat::Narrative => "narrative",
        }
    }
}

/// Style configuration handed to the note generator. Built once at startup
/// and passed by reference; its content is the generator's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteStyle {
    pub format: NoteFormat,
    /// Clinical specialty hint, e.g. "cardiology"
    pub specialty: Option<String>,
    /// Free-form additional instructions appended verbatim
    pub extra_instructions: Option<String>,
}

impl Default for NoteStyle {
    fn default() -> Self {
        Self {
            format: NoteFormat::Soap,
            specialty: None,
            extra_instructions: None,
        }
    }
}

/// Generated clinical note plus the usage the LLM provider reported for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub text: String,
    pub format: NoteFormat,
    /// Model identifier reported by the provider
    pub model: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub created_at: DateTime<Utc>,
}
