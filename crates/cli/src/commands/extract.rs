//! `stepclaw extract`: Run action extraction offline.
//!
//! Useful for checking how a model's raw output will be interpreted.

use serde_json::{Value, json};
use tokio::io::AsyncReadExt;

use stepclaw_agent::{Action, Extraction, extract};
use stepclaw_core::ModelStep;

pub async fn run(text: Option<String>, tools: &[String], finished: bool) -> Result<(), Box<dyn std::error::Error>> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let step = if finished {
        ModelStep::finished(text)
    } else {
        ModelStep::text(text)
    };
    let extraction = extract(&step, tools);
    println!("{}", serde_json::to_string_pretty(&render(&extraction))?);
    Ok(())
}

/// JSON view of an extraction.
pub fn render(extraction: &Extraction) -> Value {
    let mut out = match &extraction.action {
        Action::ToolCall(call) => json!({
            "action": "tool_call",
            "call": call,
        }),
        Action::FinalAnswer(answer) => json!({
            "action": "final_answer",
            "answer": answer,
        }),
        Action::None => json!({ "action": "none" }),
    };
    out["visible_text"] = Value::String(extraction.visible_text.clone());
    out
}
