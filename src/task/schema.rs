//! The parameter schema and validation contract (§3 `ParameterSchema`,
//! §4.7 `validate`).

use serde_json::{Map, Value};

/// The wire type a parameter must match (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Boolean,
    Integer,
    Number,
    String,
    Object,
    Array,
}

impl ParamType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Boolean => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// One named parameter's validation rule (§3).
#[derive(Debug, Clone)]
pub struct ParameterSchema {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Strings flagged non-empty must contain at least one character.
    pub non_empty: bool,
}

impl ParameterSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default: None,
            description: String::new(),
            min: None,
            max: None,
            non_empty: false,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub const fn bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    #[must_use]
    pub const fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }
}

/// Validates `params` against `schema`, returning the canonicalized object
/// (defaults applied) or the complete list of errors (§4.7: "Validation is
/// total"). Idempotent: validating an already-canonicalized object again
/// yields the same object and no errors (§8 invariant 5).
pub fn validate(schema: &[ParameterSchema], params: &Value) -> Result<Value, Vec<String>> {
    let input = params.as_object().cloned().unwrap_or_default();
    let mut canonical = Map::new();
    let mut errors = Vec::new();

    for entry in schema {
        match input.get(&entry.name) {
            Some(value) => {
                if !entry.param_type.matches(value) {
                    errors.push(format!(
                        "{}: expected {:?}, got {value}",
                        entry.name, entry.param_type
                    ));
                    continue;
                }
                if let Some(number) = value.as_f64() {
                    if let Some(min) = entry.min {
                        if number < min {
                            errors.push(format!("{}: {number} is below minimum {min}", entry.name));
                        }
                    }
                    if let Some(max) = entry.max {
                        if number > max {
                            errors.push(format!("{}: {number} is above maximum {max}", entry.name));
                        }
                    }
                }
                if entry.non_empty {
                    if let Some(text) = value.as_str() {
                        if text.is_empty() {
                            errors.push(format!("{}: must not be empty", entry.name));
                        }
                    }
                }
                canonical.insert(entry.name.clone(), value.clone());
            }
            None => {
                if entry.required {
                    errors.push(format!("{}: missing required parameter", entry.name));
                } else if let Some(default) = entry.default.clone() {
                    canonical.insert(entry.name.clone(), default);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(Value::Object(canonical))
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("retry_count", ParamType::Integer)
                .default(3)
                .bounds(1.0, 100.0),
            ParameterSchema::new("auto_find_star", ParamType::Boolean).default(true),
        ]
    }

    #[test]
    fn applies_defaults_for_missing_optional_params() {
        let canonical = validate(&schema(), &json!({})).unwrap();
        assert_eq!(canonical["retry_count"], json!(3));
        assert_eq!(canonical["auto_find_star"], json!(true));
    }

    #[test]
    fn rejects_out_of_bounds_retry_count() {
        let errors = validate(&schema(), &json!({ "retry_count": 0 })).unwrap_err();
        assert!(errors.iter().any(|error| error.contains("retry_count")));

        let errors = validate(&schema(), &json!({ "retry_count": 101 })).unwrap_err();
        assert!(errors.iter().any(|error| error.contains("retry_count")));
    }

    #[test]
    fn validation_is_idempotent() {
        let canonical = validate(&schema(), &json!({ "retry_count": 5 })).unwrap();
        let revalidated = validate(&schema(), &canonical).unwrap();
        assert_eq!(canonical, revalidated);
    }
}
