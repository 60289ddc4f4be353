//! Structural component schemas.
//!
//! A [`Schema`] is a tagged recursive description of a JSON shape: objects
//! with required properties, arrays with length bounds, strings, numbers,
//! integers, and booleans with optional range and enumeration constraints.
//!
//! [`Schema::validate`] is a pure function: it never mutates the value and
//! never fails. It returns one [`ValidationError`] per violation, each
//! carrying a dotted path such as `components.stats.health` or
//! `components.inventory.items[2]`.
//!
//! Schemas (de)serialize with an internal `"type"` tag so they can be loaded
//! from the same JSON files as type definitions:
//!
//! ```
//! use realm_schema::schema::Schema;
//! use serde_json::json;
//!
//! let schema: Schema = serde_json::from_value(json!({
//!     "type": "object",
//!     "required": ["health"],
//!     "properties": {
//!         "health": { "type": "integer", "minimum": 0 }
//!     }
//! }))
//! .unwrap();
//!
//! let errors = schema.validate(&json!({"health": -1}), "components.stats");
//! assert_eq!(errors.len(), 1);
//! assert_eq!(errors[0].path, "components.stats.health");
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// One violation found during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Dotted path to the offending value.
    pub path: String,
    /// What was wrong with it.
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Recursive shape description for component data.
///
/// Every constraint is optional; an absent constraint is not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Schema {
    /// A JSON object. Properties not listed in `properties` are allowed.
    Object {
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        properties: BTreeMap<String, Schema>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<String>,
    },
    /// A JSON array whose elements all match `items`.
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<Box<Schema>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    /// A string. Lengths count Unicode scalar values.
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        one_of: Option<Vec<String>>,
    },
    /// Any JSON number.
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        one_of: Option<Vec<f64>>,
    },
    /// A number with no fractional part.
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        one_of: Option<Vec<i64>>,
    },
    Boolean,
    /// Matches anything.
    Any,
}

impl Schema {
    /// An object schema with no constraints.
    pub fn object() -> Self {
        Schema::Object {
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// An unconstrained string schema.
    pub fn string() -> Self {
        Schema::String {
            min_length: None,
            max_length: None,
            one_of: None,
        }
    }

    /// An unconstrained number schema.
    pub fn number() -> Self {
        Schema::Number {
            minimum: None,
            maximum: None,
            one_of: None,
        }
    }

    /// An integer schema with optional bounds.
    pub fn integer(minimum: Option<i64>, maximum: Option<i64>) -> Self {
        Schema::Integer {
            minimum,
            maximum,
            one_of: None,
        }
    }

    /// An array schema of `items` with no length bounds.
    pub fn array_of(items: Schema) -> Self {
        Schema::Array {
            items: Some(Box::new(items)),
            min_items: None,
            max_items: None,
        }
    }

    /// Add a property to an object schema, optionally marking it required.
    ///
    /// No-op on non-object schemas.
    pub fn with_property(mut self, name: impl Into<String>, schema: Schema, required: bool) -> Self {
        if let Schema::Object {
            properties,
            required: req,
        } = &mut self
        {
            let name = name.into();
            if required && !req.contains(&name) {
                req.push(name.clone());
            }
            properties.insert(name, schema);
        }
        self
    }

    /// Validate `value` against this schema. `path` names `value` itself and
    /// prefixes every reported error.
    pub fn validate(&self, value: &Value, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.validate_into(value, path, &mut errors);
        errors
    }

    fn validate_into(&self, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
        match self {
            Schema::Any => {}

            Schema::Boolean => {
                if !value.is_boolean() {
                    errors.push(mismatch(path, "boolean", value));
                }
            }

            Schema::String {
                min_length,
                max_length,
                one_of,
            } => {
                let Some(s) = value.as_str() else {
                    errors.push(mismatch(path, "string", value));
                    return;
                };
                let len = s.chars().count();
                if let Some(min) = min_length {
                    if len < *min {
                        errors.push(ValidationError::new(
                            path,
                            format!("string length {len} is below minimum {min}"),
                        ));
                    }
                }
                if let Some(max) = max_length {
                    if len > *max {
                        errors.push(ValidationError::new(
                            path,
                            format!("string length {len} exceeds maximum {max}"),
                        ));
                    }
                }
                if let Some(allowed) = one_of {
                    if !allowed.iter().any(|a| a == s) {
                        errors.push(not_one_of(path, value, allowed));
                    }
                }
            }

            Schema::Number {
                minimum,
                maximum,
                one_of,
            } => {
                let Some(n) = value.as_f64() else {
                    errors.push(mismatch(path, "number", value));
                    return;
                };
                check_range(path, n, *minimum, *maximum, errors);
                if let Some(allowed) = one_of {
                    if !allowed.iter().any(|a| *a == n) {
                        errors.push(not_one_of(path, value, allowed));
                    }
                }
            }

            Schema::Integer {
                minimum,
                maximum,
                one_of,
            } => {
                let Some(n) = as_integer(value) else {
                    errors.push(mismatch(path, "integer", value));
                    return;
                };
                check_range(
                    path,
                    n,
                    minimum.map(i128::from),
                    maximum.map(i128::from),
                    errors,
                );
                if let Some(allowed) = one_of {
                    if !allowed.iter().any(|a| i128::from(*a) == n) {
                        errors.push(not_one_of(path, value, allowed));
                    }
                }
            }

            Schema::Array {
                items,
                min_items,
                max_items,
            } => {
                let Some(elements) = value.as_array() else {
                    errors.push(mismatch(path, "array", value));
                    return;
                };
                if let Some(min) = min_items {
                    if elements.len() < *min {
                        errors.push(ValidationError::new(
                            path,
                            format!("array has {} items, minimum is {min}", elements.len()),
                        ));
                    }
                }
                if let Some(max) = max_items {
                    if elements.len() > *max {
                        errors.push(ValidationError::new(
                            path,
                            format!("array has {} items, maximum is {max}", elements.len()),
                        ));
                    }
                }
                if let Some(items) = items {
                    for (i, element) in elements.iter().enumerate() {
                        items.validate_into(element, &format!("{path}[{i}]"), errors);
                    }
                }
            }

            Schema::Object {
                properties,
                required,
            } => {
                let Some(map) = value.as_object() else {
                    errors.push(mismatch(path, "object", value));
                    return;
                };
                for name in required {
                    if !map.contains_key(name) {
                        errors.push(ValidationError::new(
                            join(path, name),
                            "required field is missing",
                        ));
                    }
                }
                for (name, schema) in properties {
                    if let Some(child) = map.get(name) {
                        schema.validate_into(child, &join(path, name), errors);
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `base.key`, or just `key` at the root.
pub(crate) fn join(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_owned()
    } else {
        format!("{base}.{key}")
    }
}

/// Integral JSON numbers, widened so every `i64` and `u64` compares exactly.
/// Whole floats saturate at the `i128` bounds.
fn as_integer(value: &Value) -> Option<i128> {
    if let Some(n) = value.as_i64() {
        return Some(i128::from(n));
    }
    if let Some(n) = value.as_u64() {
        return Some(i128::from(n));
    }
    value
        .as_f64()
        .filter(|n| n.is_finite() && n.fract() == 0.0)
        .map(|n| n as i128)
}

fn check_range<T: PartialOrd + fmt::Display>(
    path: &str,
    n: T,
    minimum: Option<T>,
    maximum: Option<T>,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(min) = minimum {
        if n < min {
            errors.push(ValidationError::new(path, format!("{n} is below minimum {min}")));
        }
    }
    if let Some(max) = maximum {
        if n > max {
            errors.push(ValidationError::new(path, format!("{n} exceeds maximum {max}")));
        }
    }
}

fn mismatch(path: &str, expected: &str, actual: &Value) -> ValidationError {
    ValidationError::new(path, format!("expected {expected}, found {}", kind_of(actual)))
}

fn not_one_of<T: fmt::Debug>(path: &str, value: &Value, allowed: &[T]) -> ValidationError {
    ValidationError::new(path, format!("{value} is not one of {allowed:?}"))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
