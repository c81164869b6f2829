//! Argument preparation: bind caller identity and attached files into a
//! tool call before it reaches the server.
//!
//! The model never gets the last word on these fields: `username` is always
//! the caller, and file fields that name an attached resource are rewritten
//! to that resource's reference.

use serde_json::{Map, Value};

use stepclaw_core::{AgentContext, ToolDefinition};

/// Identity-bound argument.
pub const USERNAME_FIELD: &str = "username";

/// Fields that may carry a file name or list of file names.
const FILE_FIELDS: &[&str] = &["filename", "file_path", "file_names"];

/// Filled with the user-facing name when a file field is rewritten.
const ORIGINAL_FILENAME_FIELD: &str = "original_filename";

/// One field the preparation step overwrote.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentOverride {
    pub field: String,
    /// What the model had supplied, if anything
    pub previous: Option<Value>,
    pub value: Value,
}

/// Arguments ready for invocation, plus the audit trail of overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedArguments {
    pub arguments: Value,
    pub overrides: Vec<ArgumentOverride>,
}

/// Prepare `arguments` for `definition` on behalf of the caller in `context`.
pub fn prepare(definition: &ToolDefinition, arguments: Value, context: &AgentContext) -> PreparedArguments {
    let mut args = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".into(), other);
            map
        }
    };
    let mut overrides = Vec::new();

    if definition.declares(USERNAME_FIELD) || args.contains_key(USERNAME_FIELD) {
        set(&mut args, USERNAME_FIELD, Value::String(context.caller.clone()), &mut overrides);
    }

    let mut original_name = None;
    for field in FILE_FIELDS {
        if !definition.declares(field) {
            continue;
        }
        let Some(current) = args.get(*field).cloned() else {
            continue;
        };
        if let Some((rewritten, first_name)) = rewrite_file_value(&current, context) {
            original_name = original_name.or(first_name);
            set(&mut args, field, rewritten, &mut overrides);
        }
    }

    if let Some(name) = original_name
        && definition.declares(ORIGINAL_FILENAME_FIELD)
    {
        set(&mut args, ORIGINAL_FILENAME_FIELD, Value::String(name), &mut overrides);
    }

    PreparedArguments {
        arguments: Value::Object(args),
        overrides,
    }
}

/// Rewrite a file value (string or list of strings) naming attached resources.
///
/// Returns the new value and the first user-facing name replaced, or `None`
/// when nothing matched.
fn rewrite_file_value(value: &Value, context: &AgentContext) -> Option<(Value, Option<String>)> {
    match value {
        Value::String(name) => {
            let resource = context.resource(name)?;
            Some((Value::String(resource.reference.clone()), Some(resource.name.clone())))
        }
        Value::Array(items) => {
            let mut first = None;
            let mut changed = false;
            let rewritten = items
                .iter()
                .map(|item| match item.as_str().and_then(|n| context.resource(n)) {
                    Some(resource) => {
                        changed = true;
                        first.get_or_insert_with(|| resource.name.clone());
                        Value::String(resource.reference.clone())
                    }
                    None => item.clone(),
                })
                .collect();
            changed.then(|| (Value::Array(rewritten), first))
        }
        _ => None,
    }
}

/// Set a field, recording an override when the value changes.
fn set(args: &mut Map<String, Value>, field: &str, value: Value, overrides: &mut Vec<ArgumentOverride>) {
    let previous = args.insert(field.to_string(), value.clone());
    if previous.as_ref() != Some(&value) {
        overrides.push(ArgumentOverride {
            field: field.to_string(),
            previous,
            value,
        });
    }
}
