//! JSON Schema validation of structured answers.

use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Maximum number of individual violations reported back to the model.
const MAX_REPORTED_ERRORS: usize = 3;

/// Compiled schema, reused across attempts.
pub struct SchemaValidator {
    validator: Option<jsonschema::Validator>,
}

impl SchemaValidator {
    /// Compile `schema`. Non-object schemas disable validation.
    pub fn new(schema: &Value) -> Result<Self> {
        if !schema.is_object() {
            return Ok(Self { validator: None });
        }
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| BridgeError::Configuration(format!("Invalid JSON Schema: {e}")))?;
        Ok(Self {
            validator: Some(validator),
        })
    }

    pub fn validate(&self, instance: &Value) -> Result<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        if validator.is_valid(instance) {
            return Ok(());
        }
        let msgs: Vec<String> = validator
            .iter_errors(instance)
            .take(MAX_REPORTED_ERRORS)
            .map(|err| format!("{} at {}", err, err.instance_path))
            .collect();
        Err(BridgeError::SchemaValidation(msgs.join("; ")))
    }
}
