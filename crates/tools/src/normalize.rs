//! Result normalization: every server output shape becomes one `ToolResult`.
//!
//! Three shapes are recognised, tried in order:
//! - **Structured**: an object with `results` and optional `artifacts`,
//!   `display`, `meta_data`. `results.error` marks failure.
//! - **Content list**: `{"content": [{"type": "text", "text": ...}, ...],
//!   "isError": bool}`. A `structuredContent` object carrying `results` is
//!   preferred over the text items when present.
//! - **Legacy**: anything else. Strings pass through, other values become
//!   compact JSON. No artifacts.

use serde_json::Value;

use stepclaw_core::{Artifact, ErrorKind, ToolResult};

/// Normalize a raw server output for the call `call_id`.
pub fn normalize(call_id: &str, output: Value) -> ToolResult {
    match output {
        Value::Object(mut map) if map.contains_key("results") => {
            let results = map.remove("results").unwrap_or(Value::Null);
            let artifacts = map.remove("artifacts").map(parse_artifacts).unwrap_or_default();
            let display = map.remove("display").filter(|v| !v.is_null());
            let metadata = map.remove("meta_data").filter(|v| !v.is_null());
            structured(call_id, results, artifacts, display, metadata)
        }
        Value::Object(mut map) if map.get("content").is_some_and(Value::is_array) => {
            if let Some(Value::Object(inner)) = map.remove("structuredContent")
                && inner.contains_key("results")
            {
                return normalize(call_id, Value::Object(inner));
            }
            let is_error = map.get("isError").and_then(Value::as_bool).unwrap_or(false);
            let items = match map.remove("content") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            content_list(call_id, items, is_error)
        }
        other => ToolResult::success(call_id, render(&other)),
    }
}

fn structured(
    call_id: &str,
    results: Value,
    artifacts: Vec<Artifact>,
    display: Option<Value>,
    metadata: Option<Value>,
) -> ToolResult {
    let error = results
        .get("error")
        .filter(|e| !e.is_null())
        .map(render);

    let mut result = match error {
        Some(message) => ToolResult::failure(call_id, ErrorKind::ToolInvocationFailed, message),
        None => ToolResult::success(call_id, render(&results)),
    };
    result.artifacts = artifacts;
    result.display = display;
    result.metadata = metadata;
    result
}

fn content_list(call_id: &str, items: Vec<Value>, is_error: bool) -> ToolResult {
    let mut texts = Vec::new();
    let mut artifacts = Vec::new();

    for (i, item) in items.into_iter().enumerate() {
        match item.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    texts.push(text.to_string());
                }
            }
            Some(kind @ ("image" | "audio" | "blob")) => artifacts.push(Artifact {
                name: format!("{kind}-{}", i + 1),
                media_type: item
                    .get("mimeType")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                data: item.get("data").and_then(Value::as_str).map(str::to_string),
                size: None,
                description: None,
            }),
            _ => texts.push(render(&item)),
        }
    }

    let content = texts.join("\n");
    let mut result = if is_error {
        ToolResult::failure(call_id, ErrorKind::ToolInvocationFailed, content)
    } else {
        ToolResult::success(call_id, content)
    };
    result.artifacts = artifacts;
    result
}

fn parse_artifacts(value: Value) -> Vec<Artifact> {
    let Value::Array(items) = value else {
        tracing::warn!("Ignoring non-array artifacts field");
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Artifact>(item) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed artifact");
                None
            }
        })
        .collect()
}

/// Strings as-is, everything else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
