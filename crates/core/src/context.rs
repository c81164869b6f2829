//! Run context: who is asking, in which session, with what attached.
//!
//! An [`AgentContext`] is built by the caller before a run and is read-only
//! to the loop. Tool argument preparation reads the caller identity and the
//! attached resources from it; the loop itself only reads the session id.

use serde::{Deserialize, Serialize};

use crate::message::ConversationId;

/// A resource attached to the session that the model cannot see directly.
///
/// `reference` is opaque to the core (a download URL, a storage key, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedResource {
    /// The user-facing name, e.g. `report.pdf`
    pub name: String,

    /// Where the tool server can fetch it from
    pub reference: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl AttachedResource {
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
            media_type: None,
        }
    }

    /// Lowercased extension including the dot (`.pdf`), or empty.
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => format!(".{}", ext.to_lowercase()),
            _ => String::new(),
        }
    }
}

/// Identifies one run of the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    /// Session identifier (used in events and logs)
    pub session_id: String,

    /// The caller's identity (username); drives authorization and is
    /// injected into identity-bound tool arguments
    pub caller: String,

    /// Files and other resources attached to the session
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<AttachedResource>,

    /// Tools the user explicitly selected; `None` means "everything I may use"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_tools: Option<Vec<String>>,

    /// Handle to the conversation history
    pub conversation_id: ConversationId,
}

impl AgentContext {
    pub fn new(session_id: impl Into<String>, caller: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            caller: caller.into(),
            resources: Vec::new(),
            selected_tools: None,
            conversation_id: ConversationId::new(),
        }
    }

    pub fn with_resource(mut self, resource: AttachedResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_selected_tools(mut self, tools: Vec<String>) -> Self {
        self.selected_tools = Some(tools);
        self
    }

    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = id;
        self
    }

    /// Look up an attached resource by its user-facing name.
    pub fn resource(&self, name: &str) -> Option<&AttachedResource> {
        self.resources.iter().find(|r| r.name == name)
    }
}
