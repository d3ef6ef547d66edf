//! PII redaction for the Clinical Scribe Engine
//!
//! Patient payloads pass through the note pipeline as opaque JSON. Before any
//! of that data reaches a log line it must be scrubbed: field names that are
//! known to carry identifiers are replaced wholesale, and free text is run
//! through pattern redaction for values that leak into unexpected places
//! (SSNs, phone numbers, email addresses).
//!
//! # Example
//!
//! ```rust
//! use redact_common::{PatientRedactor, RedactionConfig};
//! use serde_json::json;
//!
//! let redactor = PatientRedactor::new(RedactionConfig::default());
//! let scrubbed = redactor.redact_value(&json!({
//!     "patient_name": "Jane Doe",
//!     "chief_complaint": "chest pain, call 555-867-5309 with results",
//! }));
//!
//! assert_eq!(scrubbed["patient_name"], "[REDACTED]");
//! assert!(!scrubbed["chief_complaint"].as_str().unwrap().contains("555"));
//! ```

pub mod redactor;

pub use redactor::*;
