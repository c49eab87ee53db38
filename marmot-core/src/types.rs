//! Core types for Marmot
//!
//! These types form the representation boundary for checkpoint persistence
//! and the model-client wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new ID using UUID v7 (time-ordered)
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Parse from string
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a job (a dispatch unit that may own many runs over time)
    JobId
);
uuid_id!(
    /// Identifier of a single run
    RunId
);
uuid_id!(
    /// Identifier of a persisted checkpoint
    CheckpointId
);
uuid_id!(
    /// Identifier of an emitted event envelope
    EventId
);

/// A piece of content produced by a tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text { text: String },
    /// Inline image, base64-encoded
    Image { data: String, mime_type: String },
    /// Inline file, base64-encoded
    File {
        data: String,
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ContentPart {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The textual content of this part, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Join the text parts of a slice into one newline-separated string.
///
/// Non-text parts are skipped; binary payloads never end up in transcripts.
pub fn joined_text(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(ContentPart::as_text)
        .fold(String::new(), |mut acc, text| {
            if !acc.is_empty() {
                acc.push('\n');
            }
            acc.push_str(text);
            acc
        })
}

/// A message in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// Expert instruction (injected at run start)
    System { content: String },
    /// User input
    User { content: String },
    /// Model output (may include tool calls)
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Results from tool execution
    #[serde(rename = "tool_results")]
    ToolResults { results: Vec<ToolCallResult> },
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolCall {
    /// Unique ID for this tool use (assigned by the model)
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// Arguments as JSON
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Resolved result of one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolCallResult {
    /// Matches the requesting tool call's id
    pub tool_call_id: String,
    /// Name of the tool that produced this result
    pub tool_name: String,
    /// Content parts returned by the tool
    pub parts: Vec<ContentPart>,
    /// Whether the provider reported this invocation as failed
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Successful result
    pub fn ok(call: &ToolCall, parts: Vec<ContentPart>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            parts,
            is_error: false,
        }
    }

    /// Error result carried as a single text part
    pub fn error_text(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            parts: vec![ContentPart::text(message)],
            is_error: true,
        }
    }
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}
