//! Shape descriptors for structured LLM responses.
//!
//! A [`Shape`] is used twice: rendered as the JSON schema sent with the
//! request, and checked against whatever actually came back. Nothing is
//! coerced, padded, or truncated. A payload either matches exactly or is
//! rejected.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Response is not valid JSON: {0}")]
    Malformed(String),

    #[error("Response violates schema at {path}: {reason}")]
    SchemaViolation { path: String, reason: String },
}

impl ValidationError {
    fn violation(path: &str, reason: impl Into<String>) -> Self {
        ValidationError::SchemaViolation {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Expected shape of a JSON value
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    String,
    Integer,
    /// Array with an exact required length
    Array { items: Box<Shape>, len: usize },
    /// Object with exactly these fields, all required
    Object(Vec<Field>),
}

/// A named, required object field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub shape: Shape,
}

impl Field {
    pub fn new(name: &'static str, shape: Shape) -> Self {
        Self { name, shape }
    }
}

impl Shape {
    pub fn array(items: Shape, len: usize) -> Self {
        Shape::Array {
            items: Box::new(items),
            len,
        }
    }

    pub fn object(fields: Vec<Field>) -> Self {
        Shape::Object(fields)
    }

    /// Check a value against this shape; `path` names the value in errors
    pub fn validate(&self, value: &Value, path: &str) -> Result<(), ValidationError> {
        match self {
            Shape::String => {
                if value.is_string() {
                    Ok(())
                } else {
                    Err(ValidationError::violation(
                        path,
                        format!("expected string, found {}", type_name(value)),
                    ))
                }
            }
            Shape::Integer => {
                if value.is_i64() || value.is_u64() {
                    Ok(())
                } else {
                    Err(ValidationError::violation(
                        path,
                        format!("expected integer, found {}", type_name(value)),
                    ))
                }
            }
            Shape::Array { items, len } => {
                let Some(elements) = value.as_array() else {
                    return Err(ValidationError::violation(
                        path,
                        format!("expected array, found {}", type_name(value)),
                    ));
                };
                if elements.len() != *len {
                    return Err(ValidationError::violation(
                        path,
                        format!("expected exactly {} items, found {}", len, elements.len()),
                    ));
                }
                for (i, element) in elements.iter().enumerate() {
                    items.validate(element, &format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            Shape::Object(fields) => {
                let Some(object) = value.as_object() else {
                    return Err(ValidationError::violation(
                        path,
                        format!("expected object, found {}", type_name(value)),
                    ));
                };
                for field in fields {
                    let field_path = format!("{}.{}", path, field.name);
                    match object.get(field.name) {
                        Some(v) => field.shape.validate(v, &field_path)?,
                        None => {
                            return Err(ValidationError::violation(
                                &field_path,
                                "missing required field",
                            ))
                        }
                    }
                }
                if let Some(extra) = object
                    .keys()
                    .find(|k| !fields.iter().any(|f| f.name == k.as_str()))
                {
                    return Err(ValidationError::violation(
                        &format!("{}.{}", path, extra),
                        "unexpected field",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Render as a strict JSON schema for the provider's structured output mode
    pub fn to_json_schema(&self) -> Value {
        match self {
            Shape::String => json!({"type": "string"}),
            Shape::Integer => json!({"type": "integer"}),
            Shape::Array { items, len } => json!({
                "type": "array",
                "items": items.to_json_schema(),
                "minItems": len,
                "maxItems": len,
            }),
            Shape::Object(fields) => {
                let mut properties = Map::new();
                for field in fields {
                    properties.insert(field.name.to_string(), field.shape.to_json_schema());
                }
                let required: Vec<&str> = fields.iter().map(|f| f.name).collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": false,
                })
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A typed payload with a fixed, named shape
pub trait StructuredOutput: DeserializeOwned {
    /// Schema name sent to the provider
    const NAME: &'static str;

    fn shape() -> Shape;
}

/// Parse and validate a raw structured response.
///
/// A payload wrapped in a single markdown code fence is unwrapped first;
/// the JSON inside is taken as-is.
pub fn parse_structured<T: StructuredOutput>(raw: &str) -> Result<T, ValidationError> {
    let payload = strip_code_fence(raw.trim());
    debug!(schema = T::NAME, payload_len = payload.len(), "Validating structured response");

    let value: Value =
        serde_json::from_str(payload).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    T::shape().validate(&value, "$")?;

    serde_json::from_value(value).map_err(|e| ValidationError::violation("$", e.to_string()))
}

fn strip_code_fence(payload: &str) -> &str {
    let Some(rest) = payload.strip_prefix("```") else {
        return payload;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return payload;
    };
    // Drop an info string such as `json` on the opening line
    match body.find('\n') {
        Some(pos) => body[pos + 1..].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdeaList, QuestionList};

    fn ideas_payload(count: usize) -> String {
        let ideas: Vec<Value> = (1..=count)
            .map(|i| json!({"id": i, "title": format!("Game {}", i), "description": "Two sentences."}))
            .collect();
        json!({ "ideas": ideas }).to_string()
    }

    fn questions_payload(count: usize, options: usize) -> String {
        let questions: Vec<Value> = (1..=count)
            .map(|i| {
                let opts: Vec<String> = (1..=options).map(|o| format!("Option {}", o)).collect();
                json!({"id": i, "question": format!("Question {}?", i), "options": opts})
            })
            .collect();
        json!({ "questions": questions }).to_string()
    }

    #[test]
    fn test_accepts_exactly_three_ideas() {
        let parsed: IdeaList = parse_structured(&ideas_payload(3)).unwrap();
        assert_eq!(parsed.ideas.len(), 3);
        assert_eq!(parsed.ideas[1].id, 2);
    }

    #[test]
    fn test_rejects_wrong_idea_counts() {
        for count in [0, 2, 4] {
            let err = parse_structured::<IdeaList>(&ideas_payload(count)).unwrap_err();
            assert!(
                matches!(err, ValidationError::SchemaViolation { ref path, .. } if path == "$.ideas"),
                "count {} gave {:?}",
                count,
                err
            );
        }
    }

    #[test]
    fn test_accepts_five_questions_with_three_options() {
        let parsed: QuestionList = parse_structured(&questions_payload(5, 3)).unwrap();
        assert_eq!(parsed.questions.len(), 5);
        assert!(parsed.questions.iter().all(|q| q.options.len() == 3));
    }

    #[test]
    fn test_rejects_wrong_question_and_option_counts() {
        assert!(matches!(
            parse_structured::<QuestionList>(&questions_payload(4, 3)),
            Err(ValidationError::SchemaViolation { .. })
        ));
        match parse_structured::<QuestionList>(&questions_payload(5, 2)) {
            Err(ValidationError::SchemaViolation { path, .. }) => {
                assert_eq!(path, "$.questions[0].options")
            }
            other => panic!("Expected SchemaViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_type_mismatch_without_coercion() {
        let payload = json!({"ideas": [
            {"id": "1", "title": "A", "description": "a"},
            {"id": 2, "title": "B", "description": "b"},
            {"id": 3, "title": "C", "description": "c"},
        ]})
        .to_string();
        match parse_structured::<IdeaList>(&payload) {
            Err(ValidationError::SchemaViolation { path, reason }) => {
                assert_eq!(path, "$.ideas[0].id");
                assert!(reason.contains("expected integer"));
            }
            other => panic!("Expected SchemaViolation, got {:?}", other),
        }

        let fractional = ideas_payload(3).replace("\"id\":2", "\"id\":2.5");
        assert!(matches!(
            parse_structured::<IdeaList>(&fractional),
            Err(ValidationError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn test_rejects_missing_and_unexpected_fields() {
        let missing = json!({"ideas": [
            {"id": 1, "title": "A"},
            {"id": 2, "title": "B", "description": "b"},
            {"id": 3, "title": "C", "description": "c"},
        ]})
        .to_string();
        match parse_structured::<IdeaList>(&missing) {
            Err(ValidationError::SchemaViolation { path, .. }) => {
                assert_eq!(path, "$.ideas[0].description")
            }
            other => panic!("Expected SchemaViolation, got {:?}", other),
        }

        let extra = json!({"ideas": [], "note": "hi"}).to_string();
        assert!(matches!(
            parse_structured::<IdeaList>(&extra),
            Err(ValidationError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse_structured::<IdeaList>("{\"ideas\": [ "),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(
            parse_structured::<IdeaList>("Here are your ideas!"),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn test_code_fenced_payload_is_unwrapped() {
        let fenced = format!("```json\n{}\n```", ideas_payload(3));
        let parsed: IdeaList = parse_structured(&fenced).unwrap();
        assert_eq!(parsed.ideas.len(), 3);
    }

    #[test]
    fn test_json_schema_rendering() {
        let schema = QuestionList::shape().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["required"], json!(["questions"]));
        let questions = &schema["properties"]["questions"];
        assert_eq!(questions["minItems"], 5);
        assert_eq!(questions["maxItems"], 5);
        let options = &questions["items"]["properties"]["options"];
        assert_eq!(options["minItems"], 3);
        assert_eq!(options["items"]["type"], "string");
    }
}
