//! Elicitation: a tool asking the end user for structured input mid-call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name → expected shape.
pub type InputSchema = BTreeMap<String, FieldSchema>;

/// The shape of one requested field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldSchema {
    String,
    Number,
    Integer,
    Boolean,
    Enum { values: Vec<String> },
    Object { fields: InputSchema },
}

impl FieldSchema {
    /// Whether `value` has the shape this field asks for.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Enum { values } => value
                .as_str()
                .is_some_and(|v| values.iter().any(|allowed| allowed == v)),
            Self::Object { fields } => value
                .as_object()
                .is_some_and(|obj| missing_or_invalid(fields, obj).is_none()),
        }
    }
}

/// First field of `schema` that `content` lacks or gets wrong.
fn missing_or_invalid<'a>(
    schema: &'a InputSchema,
    content: &serde_json::Map<String, serde_json::Value>,
) -> Option<&'a str> {
    schema.iter().find_map(|(name, field)| match content.get(name) {
        Some(value) if field.accepts(value) => None,
        _ => Some(name.as_str()),
    })
}

/// What the user did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElicitationAction {
    Accept,
    Decline,
    Cancel,
}

impl std::fmt::Display for ElicitationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Cancel => "cancel",
        })
    }
}

/// A pending question from a tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitationRequest {
    pub request_id: String,
    pub server: String,
    pub prompt: String,
    #[serde(default)]
    pub schema: InputSchema,
}

/// The answer to an [`ElicitationRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitationResponse {
    pub request_id: String,
    pub action: ElicitationAction,
    /// One value per schema field; present only when accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ElicitationResponse {
    pub fn accept(
        request_id: impl Into<String>,
        content: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            action: ElicitationAction::Accept,
            content: Some(content),
        }
    }

    pub fn decline(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            action: ElicitationAction::Decline,
            content: None,
        }
    }

    pub fn cancel(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            action: ElicitationAction::Cancel,
            content: None,
        }
    }

    /// Check an accepted response against the request's schema.
    ///
    /// Returns the name of the first missing or mistyped field.
    pub fn validate(&self, schema: &InputSchema) -> Result<(), String> {
        if self.action != ElicitationAction::Accept {
            return Ok(());
        }
        let empty = serde_json::Map::new();
        let content = self.content.as_ref().unwrap_or(&empty);
        match missing_or_invalid(schema, content) {
            Some(field) => Err(field.to_string()),
            None => Ok(()),
        }
    }
}
