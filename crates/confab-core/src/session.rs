//! The inbound frame dispatcher.
//!
//! A [`Session`] owns the transcript and routes every decoded frame to
//! exactly one mutation. It also holds permission requests: one active
//! prompt at a time, further requests queued in arrival order.

use std::collections::VecDeque;

use crate::protocol::{ServerFrame, TypingStatus};
use crate::transcript::{AttachmentMeta, EntryKind, Transcript};

/// A tool invocation awaiting the user's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    /// Name of the tool.
    pub tool_name: String,
    /// Stringified tool arguments.
    pub tool_args: String,
}

/// Dispatch state for one chat connection.
#[derive(Debug, Default)]
pub struct Session {
    transcript: Transcript,
    active_permission: Option<PermissionRequest>,
    pending_permissions: VecDeque<PermissionRequest>,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The conversation transcript.
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Route one inbound frame.
    ///
    /// Any frame that is not a streaming continuation (`agent_message_stream`
    /// or `thoughts`) invalidates the streaming target before it is
    /// processed. Returns `true` if the display changed.
    pub fn apply(&mut self, frame: ServerFrame) -> bool {
        if !matches!(
            frame,
            ServerFrame::AgentMessageStream { .. } | ServerFrame::Thoughts { .. }
        ) {
            self.transcript.close_stream();
        }

        match frame {
            ServerFrame::AgentMessage { content, tool_info } => {
                self.transcript.push(EntryKind::Agent {
                    markdown: content,
                    tool_info,
                });
                true
            }
            ServerFrame::AgentMessageStream { content } => {
                self.transcript.append_stream(&content);
                true
            }
            ServerFrame::Thoughts { content } => {
                self.transcript.push(EntryKind::Thoughts { markdown: content });
                true
            }
            ServerFrame::ToolCall {
                tool_name,
                tool_args,
            } => {
                self.transcript.push(EntryKind::ToolCall {
                    tool_name,
                    tool_args,
                });
                true
            }
            ServerFrame::ToolResult { tool_name, result } => {
                self.transcript.push(EntryKind::ToolResult { tool_name, result });
                true
            }
            ServerFrame::TypingIndicator { status } => {
                self.transcript.set_typing(status == TypingStatus::Start);
                true
            }
            ServerFrame::Error { content } => {
                self.transcript.push(EntryKind::Error { markdown: content });
                true
            }
            ServerFrame::PermissionRequest {
                tool_name,
                tool_args,
            } => {
                let request = PermissionRequest {
                    tool_name,
                    tool_args,
                };
                if self.active_permission.is_none() {
                    self.active_permission = Some(request);
                } else {
                    self.pending_permissions.push_back(request);
                }
                true
            }
            ServerFrame::InfoMessage { content } => {
                self.transcript.push(EntryKind::Info { markdown: content });
                true
            }
            ServerFrame::Pong => false,
            ServerFrame::Unknown => {
                tracing::debug!("ignoring frame with unknown discriminant");
                false
            }
        }
    }

    /// Append the user's own turn to the transcript.
    ///
    /// Called by the send path once the outbound frame has been assembled.
    /// Does not touch the streaming target; only inbound frames do.
    pub fn record_user_message(&mut self, text: String, attachments: Vec<AttachmentMeta>) {
        self.transcript.push(EntryKind::User { text, attachments });
    }

    // =========================================================================
    // Permission Queue
    // =========================================================================

    /// The request currently awaiting the user's decision, if any.
    #[must_use]
    pub fn active_permission(&self) -> Option<&PermissionRequest> {
        self.active_permission.as_ref()
    }

    /// How many further requests are queued behind the active one.
    #[must_use]
    pub fn pending_permissions(&self) -> usize {
        self.pending_permissions.len()
    }

    /// Dismiss the active request after its response has been sent, and
    /// promote the next queued request, if any, to active.
    ///
    /// Returns the dismissed request.
    pub fn resolve_permission(&mut self) -> Option<PermissionRequest> {
        let resolved = self.active_permission.take();
        self.active_permission = self.pending_permissions.pop_front();
        resolved
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolInfo;
    use crate::transcript::TranscriptEntry;

    fn stream(content: &str) -> ServerFrame {
        ServerFrame::AgentMessageStream {
            content: content.to_string(),
        }
    }

    fn agent_markdown(entry: &TranscriptEntry) -> &str {
        match &entry.kind {
            EntryKind::Agent { markdown, .. } => markdown,
            other => panic!("expected Agent entry, got {other:?}"),
        }
    }

    // =========================================================================
    // Streaming Dispatch Tests
    // =========================================================================

    #[test]
    fn stream_frames_accumulate_in_order() {
        let mut session = Session::new();
        for chunk in ["He", "llo", ", ", "world"] {
            session.apply(stream(chunk));
        }

        let entries = session.transcript().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(agent_markdown(&entries[0]), "Hello, world");
    }

    #[test]
    fn non_stream_frame_closes_the_stream() {
        let mut session = Session::new();
        session.apply(stream("first half"));
        session.apply(ServerFrame::ToolCall {
            tool_name: "shell".to_string(),
            tool_args: "ls".to_string(),
        });
        session.apply(stream("second message"));

        let entries = session.transcript().entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(agent_markdown(&entries[0]), "first half");
        assert_eq!(agent_markdown(&entries[2]), "second message");
    }

    #[test]
    fn thoughts_do_not_close_the_stream() {
        let mut session = Session::new();
        session.apply(stream("before"));
        session.apply(ServerFrame::Thoughts {
            content: "hmm".to_string(),
        });
        session.apply(stream(" after"));

        let entries = session.transcript().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(agent_markdown(&entries[0]), "before after");
    }

    #[test]
    fn typing_indicator_closes_the_stream() {
        let mut session = Session::new();
        session.apply(stream("partial"));
        session.apply(ServerFrame::TypingIndicator {
            status: TypingStatus::Stop,
        });

        assert!(!session.transcript().is_streaming());
        session.apply(stream("fresh"));
        assert_eq!(session.transcript().entries().len(), 2);
    }

    #[test]
    fn full_agent_message_is_not_a_stream_target() {
        let mut session = Session::new();
        session.apply(ServerFrame::AgentMessage {
            content: "complete".to_string(),
            tool_info: Some(ToolInfo {
                title: "fs.read".to_string(),
                details: "read 3 lines".to_string(),
            }),
        });
        session.apply(stream("streamed"));

        let entries = session.transcript().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(agent_markdown(&entries[0]), "complete");
        assert_eq!(agent_markdown(&entries[1]), "streamed");
    }

    // =========================================================================
    // Typing Indicator Tests
    // =========================================================================

    #[test]
    fn typing_indicator_start_is_idempotent() {
        let mut session = Session::new();
        session.apply(ServerFrame::TypingIndicator {
            status: TypingStatus::Start,
        });
        session.apply(ServerFrame::TypingIndicator {
            status: TypingStatus::Start,
        });
        assert!(session.transcript().typing());
    }

    #[test]
    fn typing_indicator_stop_without_start_is_a_noop() {
        let mut session = Session::new();
        session.apply(ServerFrame::TypingIndicator {
            status: TypingStatus::Stop,
        });
        assert!(!session.transcript().typing());
        assert!(session.transcript().is_empty());
    }

    // =========================================================================
    // Permission Queue Tests
    // =========================================================================

    #[test]
    fn first_permission_request_becomes_active() {
        let mut session = Session::new();
        session.apply(ServerFrame::PermissionRequest {
            tool_name: "shell".to_string(),
            tool_args: "rm -rf /tmp/x".to_string(),
        });

        let active = session.active_permission().unwrap();
        assert_eq!(active.tool_name, "shell");
        assert_eq!(session.pending_permissions(), 0);
    }

    #[test]
    fn concurrent_permission_requests_queue_in_order() {
        let mut session = Session::new();
        for tool in ["first", "second", "third"] {
            session.apply(ServerFrame::PermissionRequest {
                tool_name: tool.to_string(),
                tool_args: String::new(),
            });
        }

        assert_eq!(session.active_permission().unwrap().tool_name, "first");
        assert_eq!(session.pending_permissions(), 2);

        let resolved = session.resolve_permission().unwrap();
        assert_eq!(resolved.tool_name, "first");
        assert_eq!(session.active_permission().unwrap().tool_name, "second");

        session.resolve_permission();
        assert_eq!(session.active_permission().unwrap().tool_name, "third");

        session.resolve_permission();
        assert!(session.active_permission().is_none());
    }

    #[test]
    fn resolve_with_no_active_request_is_a_noop() {
        let mut session = Session::new();
        assert!(session.resolve_permission().is_none());
    }

    // =========================================================================
    // User Turn Tests
    // =========================================================================

    #[test]
    fn user_message_does_not_close_the_stream() {
        let mut session = Session::new();
        session.apply(stream("partial"));
        session.record_user_message("interrupting".to_string(), vec![]);
        session.apply(stream(" continued"));

        let entries = session.transcript().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(agent_markdown(&entries[0]), "partial continued");
        assert!(matches!(entries[1].kind, EntryKind::User { .. }));
    }

    // =========================================================================
    // Ignored Frame Tests
    // =========================================================================

    #[test]
    fn pong_and_unknown_frames_change_nothing() {
        let mut session = Session::new();
        assert!(!session.apply(ServerFrame::Pong));
        assert!(!session.apply(ServerFrame::Unknown));
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn unknown_frame_still_closes_the_stream() {
        // Unknown discriminants are non-stream frames; the reset-before-
        // dispatch rule applies to them too.
        let mut session = Session::new();
        session.apply(stream("partial"));
        session.apply(ServerFrame::Unknown);
        session.apply(stream("fresh"));

        assert_eq!(session.transcript().entries().len(), 2);
    }

    // =========================================================================
    // Message Flow Simulation Tests
    // =========================================================================

    #[test]
    fn simulate_turn_with_tools_and_stream() {
        let frames = vec![
            r#"{"type":"typing_indicator","status":"start"}"#,
            r#"{"type":"thoughts","content":"I should list the directory."}"#,
            r#"{"type":"tool_call","tool_name":"fs.ls","tool_args":"{'path': '.'}"}"#,
            r#"{"type":"tool_result","tool_name":"fs.ls","result":"a.py\nb.py"}"#,
            r#"{"type":"agent_message_stream","content":"There are "}"#,
            r#"{"type":"agent_message_stream","content":"two files."}"#,
            r#"{"type":"typing_indicator","status":"stop"}"#,
        ];

        let mut session = Session::new();
        for json in frames {
            let frame = crate::protocol::decode_server_frame(json).unwrap();
            session.apply(frame);
        }

        let entries = session.transcript().entries();
        assert_eq!(entries.len(), 4);
        assert!(matches!(entries[0].kind, EntryKind::Thoughts { .. }));
        assert!(matches!(entries[1].kind, EntryKind::ToolCall { .. }));
        assert!(matches!(entries[2].kind, EntryKind::ToolResult { .. }));
        assert_eq!(agent_markdown(&entries[3]), "There are two files.");
        assert!(!session.transcript().typing());
        assert!(!session.transcript().is_streaming());
    }
}
