//! Request intake validation.
//!
//! Raw JSON is checked in two phases before anything reaches the
//! orchestrator:
//!
//! 1. **Structural**: the document is validated against the request JSON
//!    Schema. Every violation is collected so the caller sees the whole list.
//! 2. **Semantic**: the deserialized request goes through
//!    `ClinicalRequest::check` (unique sequences, non-negative amounts, ...).
//!
//! Either phase failing is an `InvalidRequest`; the request is never retried.

use serde_json::{json, Value};
use tracing::{debug, warn};

use preauth_contracts::{
    claim::ClinicalRequest,
    error::{PreauthError, PreauthResult},
};

/// JSON Schema for an incoming clinical request.
pub fn request_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["request_id", "patient_id", "services"],
        "properties": {
            "request_id": { "type": "string", "minLength": 1 },
            "patient_id": { "type": "string", "minLength": 1 },
            "provider_id": { "type": "string" },
            "coverage_id": { "type": ["string", "null"] },
            "patient_age": { "type": ["integer", "null"], "minimum": 0, "maximum": 150 },
            "patient_gender": { "type": ["string", "null"] },
            "diagnoses": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["code"],
                    "properties": {
                        "code": { "type": "string", "minLength": 1 },
                        "display": { "type": "string" }
                    }
                }
            },
            "procedures": { "type": "array", "items": { "type": "string" } },
            "services": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["sequence", "code"],
                    "properties": {
                        "sequence": { "type": "integer", "minimum": 0 },
                        "code": { "type": "string", "minLength": 1 },
                        "description": { "type": "string" },
                        "requested_amount": { "type": ["number", "null"], "minimum": 0 },
                        "clinical_notes": { "type": ["string", "null"] }
                    }
                }
            },
            "total_cost": { "type": ["number", "null"], "minimum": 0 },
            "clinical_notes": { "type": ["string", "null"] }
        }
    })
}

/// Structural and semantic intake checks for raw requests.
pub struct RequestSchemaValidator {
    validator: jsonschema::Validator,
}

impl RequestSchemaValidator {
    /// Compile the request schema.
    ///
    /// Returns `PreauthError::ConfigError` if the schema document does not
    /// compile.
    pub fn new() -> PreauthResult<Self> {
        Self::with_schema(&request_schema())
    }

    pub fn with_schema(schema: &Value) -> PreauthResult<Self> {
        let validator = jsonschema::validator_for(schema).map_err(|e| PreauthError::ConfigError {
            reason: format!("invalid request JSON Schema: {e}"),
        })?;
        Ok(Self { validator })
    }

    /// Every structural violation in `raw`, as `"<path>: <message>"`.
    pub fn violations(&self, raw: &Value) -> Vec<String> {
        self.validator
            .iter_errors(raw)
            .map(|error| {
                let path = error.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("{path}: {error}")
            })
            .collect()
    }

    /// Validate and deserialize a JSON document into a checked request.
    pub fn parse(&self, raw: &Value) -> PreauthResult<ClinicalRequest> {
        let violations = self.violations(raw);
        if !violations.is_empty() {
            warn!(count = violations.len(), "request failed schema validation");
            return Err(PreauthError::InvalidRequest {
                reason: format!("schema violation: {}", violations.join("; ")),
            });
        }

        let request: ClinicalRequest =
            serde_json::from_value(raw.clone()).map_err(|e| PreauthError::InvalidRequest {
                reason: format!("request does not match the data model: {e}"),
            })?;
        request.check()?;

        debug!(request_id = %request.request_id, services = request.services.len(), "request accepted at intake");
        Ok(request)
    }

    /// Parse a JSON string. Malformed JSON is an `InvalidRequest`.
    pub fn parse_str(&self, raw: &str) -> PreauthResult<ClinicalRequest> {
        let value: Value = serde_json::from_str(raw).map_err(|e| PreauthError::InvalidRequest {
            reason: format!("request is not valid JSON: {e}"),
        })?;
        self.parse(&value)
    }
}
