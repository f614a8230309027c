//! Context schema validation: `Task.context` is validated against
//! its `NamedTask.context_schema` at creation time.

use crate::error::CoreError;
use serde_json::Value;

pub fn validate_context(context: &Value, schema: Option<&Value>) -> Result<(), CoreError> {
    let Some(schema) = schema else {
        return Ok(());
    };

    let compiled = jsonschema::validator_for(schema).map_err(|e| CoreError::Validation {
        entity: "named_task.context_schema".to_string(),
        reason: e.to_string(),
    })?;

    let errors: Vec<String> = compiled
        .iter_errors(context)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation {
            entity: "task.context".to_string(),
            reason: errors.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_schema_means_any_context_is_valid() {
        assert!(validate_context(&json!({"anything": true}), None).is_ok());
    }

    #[test]
    fn context_matching_schema_passes() {
        let schema = json!({
            "type": "object",
            "required": ["order_id"],
            "properties": { "order_id": { "type": "string" } }
        });
        let context = json!({"order_id": "abc-123"});
        assert!(validate_context(&context, Some(&schema)).is_ok());
    }

    #[test]
    fn context_missing_required_field_fails() {
        let schema = json!({
            "type": "object",
            "required": ["order_id"],
            "properties": { "order_id": { "type": "string" } }
        });
        let context = json!({});
        assert!(validate_context(&context, Some(&schema)).is_err());
    }
}
