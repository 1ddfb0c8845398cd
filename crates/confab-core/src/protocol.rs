//! Wire protocol frames for the agent chat socket.
//!
//! Every message exchanged with the backend is one JSON text frame with a
//! `type` discriminant field. Inbound frames are [`ServerFrame`]s, outbound
//! frames are [`ClientFrame`]s.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// One file attachment as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// Original file name.
    pub filename: String,
    /// Base64-encoded file body.
    pub content_base64: String,
    /// MIME type of the file.
    pub mime_type: String,
}

/// Structured tool annotation attached to a full agent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Short title, e.g. the tool that produced the message.
    pub title: String,
    /// Free-form details rendered under the title.
    pub details: String,
}

/// Typing indicator state carried by `typing_indicator` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypingStatus {
    /// Show the indicator.
    Start,
    /// Hide the indicator.
    Stop,
}

/// The user's answer to a permission request.
///
/// On the wire this is `false` (deny), `true` (allow once), or the string
/// `"always"` (allow and remember), so serialization is hand-written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    /// Do not run the tool.
    Deny,
    /// Run the tool this one time.
    AllowOnce,
    /// Run the tool now and whenever it is requested again.
    AlwaysAllow,
}

impl Serialize for PermissionDecision {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Deny => serializer.serialize_bool(false),
            Self::AllowOnce => serializer.serialize_bool(true),
            Self::AlwaysAllow => serializer.serialize_str("always"),
        }
    }
}

impl<'de> Deserialize<'de> for PermissionDecision {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(Self::AllowOnce),
            Raw::Flag(false) => Ok(Self::Deny),
            Raw::Word(w) if w == "always" => Ok(Self::AlwaysAllow),
            Raw::Word(w) => Err(serde::de::Error::custom(format!(
                "unknown permission decision: {w:?}"
            ))),
        }
    }
}

/// Client -> Server: frames sent to the agent backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A user turn: text plus any staged attachments.
    UserMessage {
        /// The typed message, may be empty when only files are sent.
        text: String,
        /// All attachments staged for this turn.
        files: Vec<FileAttachment>,
    },
    /// Answer to a pending `permission_request`.
    PermissionResponse {
        /// The decision for the requested tool invocation.
        allow: PermissionDecision,
    },
    /// Keepalive probe; the backend answers with `pong`.
    Ping,
}

/// Server -> Client: frames received from the agent backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A complete, non-streamed agent message.
    AgentMessage {
        /// Markdown message body.
        content: String,
        /// Optional inline tool annotation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_info: Option<ToolInfo>,
    },
    /// One incremental chunk of a streamed agent message.
    AgentMessageStream {
        /// Text fragment to append to the live buffer.
        content: String,
    },
    /// Model reasoning, rendered as a distinct block.
    Thoughts {
        /// Markdown reasoning body.
        content: String,
    },
    /// The agent is invoking a tool.
    ToolCall {
        /// Name of the tool.
        tool_name: String,
        /// Stringified tool arguments.
        tool_args: String,
    },
    /// A tool invocation finished.
    ToolResult {
        /// Name of the tool.
        tool_name: String,
        /// Free-form result text, displayed verbatim.
        result: String,
    },
    /// Show or hide the typing indicator.
    TypingIndicator {
        /// Whether to show or hide.
        status: TypingStatus,
    },
    /// A backend-reported error, rendered as a styled block.
    Error {
        /// Markdown error body.
        content: String,
    },
    /// The backend asks whether a tool may run.
    PermissionRequest {
        /// Name of the tool awaiting permission.
        tool_name: String,
        /// Stringified tool arguments.
        tool_args: String,
    },
    /// Informational notice (skipped tools, rate-limit waits, and the like).
    InfoMessage {
        /// Markdown notice body.
        content: String,
    },
    /// Keepalive reply to a client `ping`.
    Pong,
    /// Any discriminant this client does not know. Logged and ignored by the
    /// dispatcher rather than dropped inside the decoder.
    #[serde(other)]
    Unknown,
}

/// Decode one inbound text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] when the payload is not a frame
/// object at all. An unrecognized `type` is NOT an error; it decodes to
/// [`ServerFrame::Unknown`].
pub fn decode_server_frame(text: &str) -> Result<ServerFrame, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Malformed)
}

/// Encode one outbound frame to its wire form.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_client_frame(frame: &ClientFrame) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(ProtocolError::Encode)
}

// =============================================================================
// Tests
// =============================================================================
