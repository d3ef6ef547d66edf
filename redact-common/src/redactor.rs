use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").unwrap();
    static ref PHONE_REGEX: Regex = Regex::new(
        r"\b(?:\+1[-.\s]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.\s]?([0-9]{4})\b"
    )
    .unwrap();
    static ref SSN_REGEX: Regex = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap();
    static ref MRN_REGEX: Regex = Regex::new(r"\bMRN[-\s]?\d+\b").unwrap();
}

/// Field names that are always scrubbed from patient payloads, regardless of
/// their value.
const SENSITIVE_FIELDS: &[&str] = &[
    "name",
    "patient_name",
    "ssn",
    "social_security",
    "email",
    "phone",
    "address",
    "dob",
    "date_of_birth",
    "mrn",
    "medical_record_number",
];

const REDACTED: &str = "[REDACTED]";

/// Redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_ssn: bool,
    pub redact_mrn: bool,
    /// Additional field names to scrub beyond the built-in set.
    pub extra_fields: Vec<String>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_ssn: true,
            redact_mrn: true,
            extra_fields: Vec::new(),
        }
    }
}

/// Scrubs patient-identifying data from JSON payloads and free text before
/// they are handed to the logging collaborator.
pub struct PatientRedactor {
    config: RedactionConfig,
    fields: HashSet<String>,
}

impl PatientRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        let mut fields: HashSet<String> = SENSITIVE_FIELDS
            .iter()
            .map(|f| (*f).to_string())
            .collect();
        fields.extend(config.extra_fields.iter().map(|f| f.to_lowercase()));
        Self { config, fields }
    }

    /// Recursively scrub a JSON value. Sensitive field names are replaced
    /// wholesale; remaining strings are pattern-redacted.
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, val) in map {
                    if self.fields.contains(&key.to_lowercase()) {
                        out.insert(key.clone(), Value::String(REDACTED.to_string()));
                    } else {
                        out.insert(key.clone(), self.redact_value(val));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.redact_value(v)).collect())
            }
            Value::String(text) => Value::String(self.redact_text(text)),
            other => other.clone(),
        }
    }

    /// Pattern-redact a free-text string.
    pub fn redact_text(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.config.redact_ssn {
            result = SSN_REGEX.replace_all(&result, "***-**-****").to_string();
        }

        if self.config.redact_phones {
            result = PHONE_REGEX
                .replace_all(&result, "(***) ***-****")
                .to_string();
        }

        if self.config.redact_emails {
            result = EMAIL_REGEX.replace_all(&result, "***@***").to_string();
        }

        if self.config.redact_mrn {
            result = MRN_REGEX.replace_all(&result, "MRN[REDACTED]").to_string();
        }

        result
    }
}

impl Default for PatientRedactor {
    fn default() -> Self {
        Self::new(RedactionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_sensitive_fields_scrubbed() {
        let redactor = PatientRedactor::default();
        let scrubbed = redactor.redact_value(&json!({
            "patient_name": "Jane Doe",
            "dob": "1985-03-12",
            "visit_reason": "follow-up",
        }));

        assert_eq!(scrubbed["patient_name"], REDACTED);
        assert_eq!(scrubbed["dob"], REDACTED);
        assert_eq!(scrubbed["visit_reason"], "follow-up");
    }

    #[test]
    fn test_nested_objects_scrubbed() {
        let redactor = PatientRedactor::default();
        let scrubbed = redactor.redact_value(&json!({
            "demographics": { "Name": "John", "age": 54 },
            "contacts": [{ "phone": "555-123-4567" }],
        }));

        assert_eq!(scrubbed["demographics"]["Name"], REDACTED);
        assert_eq!(scrubbed["demographics"]["age"], 54);
        assert_eq!(scrubbed["contacts"][0]["phone"], REDACTED);
    }

    #[test]
    fn test_patterns_in_free_text() {
        let redactor = PatientRedactor::default();

        let text = redactor.redact_text("SSN 123-45-6789, call (555) 123-4567 or j.doe@example.com, chart MRN 442211");
        assert!(!text.contains("123-45-6789"));
        assert!(!text.contains("555"));
        assert!(!text.contains("example.com"));
        assert!(!text.contains("442211"));
    }

    #[test]
    fn test_clinical_content_untouched() {
        let redactor = PatientRedactor::default();
        let note = "BP 120/80, HR 72, prescribed metformin 500 mg BID";
        assert_eq!(redactor.redact_text(note), note);
    }

    #[test]
    fn test_extra_fields() {
        let config = RedactionConfig {
            extra_fields: vec!["insurance_id".to_string()],
            ..Default::default()
        };
        let redactor = PatientRedactor::new(config);
        let scrubbed = redactor.redact_value(&json!({ "insurance_id": "XZ-900" }));
        assert_eq!(scrubbed["insurance_id"], REDACTED);
    }
}
