//! Action extraction: turn one model step into at most one action.
//!
//! Models without native tool calling embed calls as JSON in their text.
//! Extraction prefers a native action, then scans the text for balanced
//! JSON objects in a handful of known shapes, then falls back to final
//! answer markers. It is total: malformed input yields `Action::None`.
//!
//! Synthesized call ids are UUID v5 over the tool name and canonical
//! arguments, so the same text always yields the same call.

use serde_json::{Map, Value};
use uuid::Uuid;

use stepclaw_core::{ModelStep, ToolCall};

/// Argument keys tried for each name key, in order.
const NAME_SHAPES: &[(&str, &[&str])] = &[
    ("name", &["arguments", "args", "parameters"]),
    ("function", &["args", "arguments", "parameters"]),
    ("tool", &["parameters", "args", "arguments"]),
];

/// Substrings that suggest the text carries an embedded call.
const CALL_INDICATORS: &[&str] = &[
    "\"name\"",
    "\"function\"",
    "\"tool\"",
    "\"arguments\"",
    "\"args\"",
    "\"parameters\"",
    "\"cmd\"",
    "action input:",
];

const FINAL_TAG_OPEN: &str = "<final_answer>";
const FINAL_TAG_CLOSE: &str = "</final_answer>";

/// A resolved intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ToolCall(ToolCall),
    FinalAnswer(String),
    /// Reasoning only
    None,
}

/// The action plus the text left once any embedded call is removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub action: Action,
    pub visible_text: String,
}

/// Extract the action from `step`, matching names against `available_tools`.
pub fn extract(step: &ModelStep, available_tools: &[String]) -> Extraction {
    if let Some(native) = &step.action {
        let name = find_matching_tool(&native.name, available_tools)
            .map(str::to_string)
            .unwrap_or_else(|| native.name.clone());
        let arguments = coerce_arguments(native.arguments.clone());
        let id = if native.id.is_empty() {
            call_id(&name, &arguments)
        } else {
            native.id.clone()
        };
        return Extraction {
            action: Action::ToolCall(ToolCall::new(id, name, arguments)),
            visible_text: collapse_whitespace(&step.text),
        };
    }

    if (should_attempt_content_parsing(&step.text) || mentions_tool(&step.text, available_tools))
        && let Some((call, range)) = embedded_call(&step.text, available_tools)
    {
        let mut visible = String::with_capacity(step.text.len());
        visible.push_str(&step.text[..range.0]);
        visible.push(' ');
        visible.push_str(&step.text[range.1..]);
        tracing::debug!(tool = %call.name, "Extracted tool call from model text");
        return Extraction {
            action: Action::ToolCall(call),
            visible_text: collapse_whitespace(&visible),
        };
    }

    let visible_text = collapse_whitespace(&step.text);
    if let Some(answer) = final_answer_text(&step.text) {
        return Extraction {
            action: Action::FinalAnswer(answer),
            visible_text,
        };
    }
    if step.finished == Some(true) {
        return Extraction {
            action: Action::FinalAnswer(step.text.trim().to_string()),
            visible_text,
        };
    }

    Extraction {
        action: Action::None,
        visible_text,
    }
}

/// Cheap check before scanning: needs a `{` and a call indicator.
pub fn should_attempt_content_parsing(text: &str) -> bool {
    if !text.contains('{') {
        return false;
    }
    let lower = text.to_lowercase();
    CALL_INDICATORS.iter().any(|ind| lower.contains(ind))
}

/// Whether a quoted tool name appears next to a `{`, as in
/// `{"search_web": {...}}`.
fn mentions_tool(text: &str, available_tools: &[String]) -> bool {
    text.contains('{')
        && available_tools
            .iter()
            .any(|t| text.contains(&format!("\"{t}\"")))
}

/// Byte ranges of top-level balanced `{...}` blocks, string and escape aware.
///
/// An unmatched `{` is skipped and scanning resumes at the next byte.
pub fn json_blocks(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{'
            && let Some(end) = matching_brace(bytes, i)
        {
            blocks.push((i, end + 1));
            i = end + 1;
            continue;
        }
        i += 1;
    }
    blocks
}

fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (j, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

/// First block that parses as a call, with its byte range.
fn embedded_call(text: &str, available_tools: &[String]) -> Option<(ToolCall, (usize, usize))> {
    let blocks = json_blocks(text);

    for &(start, end) in &blocks {
        let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&text[start..end]) else {
            continue;
        };
        if let Some(call) = parse_call_object(&obj, available_tools) {
            return Some((call, (start, end)));
        }
    }

    react_action(text, &blocks, available_tools)
}

/// Try `obj` against the known call shapes.
fn parse_call_object(obj: &Map<String, Value>, available_tools: &[String]) -> Option<ToolCall> {
    for (name_key, arg_keys) in NAME_SHAPES {
        let Some(name) = obj.get(*name_key) else {
            continue;
        };
        let name = name.as_str().filter(|n| !n.is_empty())?;
        let arguments = arg_keys
            .iter()
            .find_map(|k| obj.get(*k))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        return Some(build_call(name, arguments, available_tools));
    }

    if obj.contains_key("cmd") {
        tracing::debug!("Ignoring shell command payload in model text");
        return None;
    }

    // `{"tool_name": {...}}`
    obj.iter().find_map(|(key, arguments)| {
        find_matching_tool(key, available_tools)
            .map(|tool| build_call(tool, arguments.clone(), available_tools))
    })
}

/// Classic `Action: name` / `Action Input: {...}` lines.
fn react_action(
    text: &str,
    blocks: &[(usize, usize)],
    available_tools: &[String],
) -> Option<(ToolCall, (usize, usize))> {
    let input_at = find_ascii_ci(text, "action input:")?;
    let action_at = rfind_ascii_ci(&text[..input_at], "action:")?;
    let name = text[action_at + "action:".len()..input_at].trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }

    let &(start, end) = blocks.iter().find(|(start, _)| *start > input_at)?;
    let arguments = serde_json::from_str::<Value>(&text[start..end]).ok()?;
    Some((build_call(name, arguments, available_tools), (start, end)))
}

fn build_call(name: &str, arguments: Value, available_tools: &[String]) -> ToolCall {
    let name = match find_matching_tool(name, available_tools) {
        Some(tool) => tool.to_string(),
        None => {
            if !available_tools.is_empty() {
                tracing::warn!(tool = name, "Extracted tool is not among the available tools");
            }
            name.to_string()
        }
    };
    let arguments = coerce_arguments(arguments);
    ToolCall::new(call_id(&name, &arguments), name, arguments)
}

/// Arguments are always an object: JSON strings are parsed, anything else
/// that is not an object is wrapped as `{"input": value}`.
fn coerce_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Object(_) => arguments,
        Value::Null => Value::Object(Map::new()),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ => wrap_input(Value::String(s)),
        },
        other => wrap_input(other),
    }
}

fn wrap_input(value: Value) -> Value {
    let mut map = Map::new();
    map.insert("input".into(), value);
    Value::Object(map)
}

/// Match a model-supplied name to an available tool.
///
/// Exact (case-insensitive, `-` and spaces as `_`), then containment either
/// way, then overlap of `_`-separated parts.
pub fn find_matching_tool<'a>(name: &str, available_tools: &'a [String]) -> Option<&'a str> {
    let wanted = name.to_lowercase().replace(['-', ' '], "_");
    if wanted.is_empty() {
        return None;
    }

    if let Some(tool) = available_tools.iter().find(|t| t.to_lowercase() == wanted) {
        return Some(tool.as_str());
    }

    if let Some(tool) = available_tools.iter().find(|t| {
        let t = t.to_lowercase();
        t.contains(&wanted) || wanted.contains(&t)
    }) {
        return Some(tool.as_str());
    }

    let wanted_parts: Vec<&str> = wanted.split('_').filter(|p| !p.is_empty()).collect();
    let needed = wanted_parts.len().min(2);
    if needed == 0 {
        return None;
    }
    available_tools
        .iter()
        .find(|t| {
            let lower = t.to_lowercase();
            let parts: Vec<&str> = lower.split('_').collect();
            wanted_parts.iter().filter(|p| parts.contains(p)).count() >= needed
        })
        .map(String::as_str)
}

/// Deterministic id for a synthesized call.
pub fn call_id(name: &str, arguments: &Value) -> String {
    // serde_json maps are key-ordered, so this rendering is canonical
    let key = format!("{name}\n{arguments}");
    format!("call_{}", Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).simple())
}

/// Text after a final answer marker, if one is present.
///
/// Recognised: `Final Answer:` (any case), `FINAL ANSWER`, and a
/// `<final_answer>` tag. Prose that merely mentions a final answer in
/// lower case does not match.
pub fn final_answer_text(text: &str) -> Option<String> {
    if let Some(at) = find_ascii_ci(text, FINAL_TAG_OPEN) {
        let rest = &text[at + FINAL_TAG_OPEN.len()..];
        let body = match find_ascii_ci(rest, FINAL_TAG_CLOSE) {
            Some(close) => &rest[..close],
            None => rest,
        };
        return Some(body.trim().to_string());
    }

    let after = find_ascii_ci(text, "final answer:")
        .map(|at| at + "final answer:".len())
        .or_else(|| text.find("FINAL ANSWER").map(|at| at + "FINAL ANSWER".len()))?;
    let body = text[after..].trim_start_matches([':', ' ', '\t', '\n', '\r']).trim();
    Some(body.to_string())
}

/// Byte offset of `needle` in `haystack`, ASCII case-insensitive.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

fn rfind_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .rposition(|w| w.eq_ignore_ascii_case(needle))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tools(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn tool_call(extraction: &Extraction) -> &ToolCall {
        match &extraction.action {
            Action::ToolCall(call) => call,
            other => panic!("expected a tool call, got {other:?}"),
        }
    }

    #[test]
    fn tool_parameters_shape_in_plain_text() {
        let step = ModelStep::text(r#"{"tool": "search", "parameters": {"q": "x"}}"#);
        let extraction = extract(&step, &[]);
        let call = tool_call(&extraction);
        assert_eq!(call.name, "search");
        assert_eq!(call.arguments, json!({"q": "x"}));
        assert!(call.id.starts_with("call_"));
        assert_eq!(extraction.visible_text, "");
    }

    #[test]
    fn name_arguments_shape_with_string_arguments() {
        let step = ModelStep::text(
            r#"Let me check. {"name": "weather_lookup", "arguments": "{\"city\": \"Oslo\"}"} Done."#,
        );
        let extraction = extract(&step, &tools(&["weather_lookup"]));
        assert_eq!(tool_call(&extraction).arguments, json!({"city": "Oslo"}));
        assert_eq!(extraction.visible_text, "Let me check. Done.");
    }

    #[test]
    fn function_args_shape_and_plain_string_wrapped() {
        let step = ModelStep::text(r#"{"function": "search_web", "args": "rust async"}"#);
        let extraction = extract(&step, &tools(&["search_web"]));
        assert_eq!(tool_call(&extraction).arguments, json!({"input": "rust async"}));
    }

    #[test]
    fn tool_name_as_key() {
        let step = ModelStep::text(r#"Calling {"pdfbasic_extract_pdf_text": {"filename": "a.pdf"}}"#);
        let extraction = extract(&step, &tools(&["pdfbasic_extract_pdf_text"]));
        let call = tool_call(&extraction);
        assert_eq!(call.name, "pdfbasic_extract_pdf_text");
        assert_eq!(call.arguments["filename"], "a.pdf");
    }

    #[test]
    fn cmd_payload_ignored() {
        let step = ModelStep::text(r#"{"cmd": ["bash", "-lc", "ls"]}"#);
        assert_eq!(extract(&step, &tools(&["search_web"])).action, Action::None);
    }

    #[test]
    fn fuzzy_name_matching() {
        let available = tools(&["pdfbasic_extract_pdf_text", "search_web"]);
        assert_eq!(find_matching_tool("Search-Web", &available), Some("search_web"));
        assert_eq!(find_matching_tool("web", &available), Some("search_web"));
        assert_eq!(find_matching_tool("extract_text", &available), Some("pdfbasic_extract_pdf_text"));
        assert_eq!(find_matching_tool("weather", &available), None);
    }

    #[test]
    fn unknown_name_kept() {
        let step = ModelStep::text(r#"{"name": "delete_everything", "arguments": {}}"#);
        let extraction = extract(&step, &tools(&["search_web"]));
        assert_eq!(tool_call(&extraction).name, "delete_everything");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_scanner() {
        let text = r#"note {"name": "echo", "arguments": {"text": "a } b \" {"}} tail"#;
        let blocks = json_blocks(text);
        assert_eq!(blocks.len(), 1);
        let (start, end) = blocks[0];
        assert!(serde_json::from_str::<Value>(&text[start..end]).is_ok());
    }

    #[test]
    fn unbalanced_input_is_harmless() {
        for text in ["{", "{{{\"name\"", "}{", "{\"name\": }", "\u{1F600}{\"tool\""] {
            let extraction = extract(&ModelStep::text(text), &[]);
            assert_eq!(extraction.action, Action::None, "{text}");
        }
    }

    #[test]
    fn react_action_lines() {
        let step = ModelStep::text(
            "Thought: I should search.\nAction: search_web\nAction Input: {\"query\": \"tokio\"}",
        );
        let extraction = extract(&step, &tools(&["search_web"]));
        let call = tool_call(&extraction);
        assert_eq!(call.name, "search_web");
        assert_eq!(call.arguments, json!({"query": "tokio"}));
        assert_eq!(
            extraction.visible_text,
            "Thought: I should search. Action: search_web Action Input:"
        );
    }

    #[test]
    fn native_action_preferred() {
        let native = ToolCall::new("abc", "search_web", json!({"q": "rust"}));
        let step = ModelStep::with_action(r#"{"tool": "other", "parameters": {}}"#, native.clone());
        let extraction = extract(&step, &tools(&["search_web", "other"]));
        assert_eq!(tool_call(&extraction), &native);
    }

    #[test]
    fn final_answer_markers() {
        let step = ModelStep::text("Thought: I know it.\nFinal Answer: 42");
        assert_eq!(extract(&step, &[]).action, Action::FinalAnswer("42".into()));

        let step = ModelStep::text("FINAL ANSWER - it is blue");
        assert_eq!(
            extract(&step, &[]).action,
            Action::FinalAnswer("- it is blue".into())
        );

        let step = ModelStep::text("<final_answer>Paris</final_answer>");
        assert_eq!(extract(&step, &[]).action, Action::FinalAnswer("Paris".into()));
    }

    #[test]
    fn lowercase_mention_is_not_a_marker() {
        let step = ModelStep::text("I will give the final answer after one more search.");
        assert_eq!(extract(&step, &[]).action, Action::None);
    }

    #[test]
    fn completion_flag_uses_whole_text() {
        let step = ModelStep::finished("  The answer is 7.  ");
        assert_eq!(
            extract(&step, &[]).action,
            Action::FinalAnswer("The answer is 7.".into())
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        let step = ModelStep::text(r#"{"tool": "search", "parameters": {"b": 2, "a": 1}}"#);
        let first = extract(&step, &tools(&["search"]));
        let second = extract(&step, &tools(&["search"]));
        assert_eq!(first, second);
    }

    #[test]
    fn plain_prose_skips_scan() {
        assert!(!should_attempt_content_parsing("Just thinking out loud."));
        assert!(!should_attempt_content_parsing("{ braces but no indicators }"));
        assert!(should_attempt_content_parsing(r#"{"tool": "x"}"#));
    }
}
