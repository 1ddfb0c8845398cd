//! The conversation transcript and the streaming accumulator.
//!
//! The transcript is an append-only sequence of entries. The only entry
//! ever mutated after the fact is the single live streaming entry, whose
//! content is a projection of the raw stream buffer. The typing indicator
//! is a singleton flag next to the entries, shown and hidden idempotently.

use chrono::{DateTime, Utc};

use crate::protocol::ToolInfo;

/// Coarse media category of an attachment, derived from its MIME type.
///
/// Drives which icon a renderer picks for the attachment chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// `image/*`
    Image,
    /// `video/*`
    Video,
    /// `audio/*`
    Audio,
    /// `application/pdf`
    Pdf,
    /// `text/*`
    Text,
    /// Everything else.
    Other,
}

impl MediaKind {
    /// Classify a MIME type string.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else if mime.starts_with("application/pdf") {
            Self::Pdf
        } else if mime.starts_with("text/") {
            Self::Text
        } else {
            Self::Other
        }
    }

    /// Icon shown in attachment chips.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Image => "🖼",
            Self::Video => "🎞",
            Self::Audio => "🎵",
            Self::Pdf => "📕",
            Self::Text => "📄",
            Self::Other => "📎",
        }
    }
}

/// Display metadata for one attachment of a user entry.
///
/// Carries only what the renderer needs; the encoded body travels in the
/// outbound frame and is never kept here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMeta {
    /// Original file name.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
    /// MIME type.
    pub mime_type: String,
}

impl AttachmentMeta {
    /// Coarse category for icon selection.
    #[must_use]
    pub fn media_kind(&self) -> MediaKind {
        MediaKind::from_mime(&self.mime_type)
    }
}

/// What one transcript entry contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A user turn: text plus attachment chips.
    User {
        /// The typed message, possibly empty.
        text: String,
        /// Metadata for each attached file.
        attachments: Vec<AttachmentMeta>,
    },
    /// An agent message, streamed or complete, rendered as Markdown.
    Agent {
        /// Raw Markdown body. For the live streaming entry this is the
        /// projection of the stream buffer.
        markdown: String,
        /// Optional inline tool annotation.
        tool_info: Option<ToolInfo>,
    },
    /// Model reasoning, rendered as a distinct block.
    Thoughts {
        /// Raw Markdown body.
        markdown: String,
    },
    /// A tool invocation announcement.
    ToolCall {
        /// Tool name.
        tool_name: String,
        /// Stringified arguments.
        tool_args: String,
    },
    /// A tool invocation result, displayed verbatim.
    ToolResult {
        /// Tool name.
        tool_name: String,
        /// Whitespace-preserving result text.
        result: String,
    },
    /// A backend-reported error.
    Error {
        /// Raw Markdown body.
        markdown: String,
    },
    /// An informational notice.
    Info {
        /// Raw Markdown body.
        markdown: String,
    },
}

/// One rendered entry of the transcript.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    /// When the entry was appended, UTC.
    pub at: DateTime<Utc>,
    /// The entry content.
    pub kind: EntryKind,
}

/// The live streaming target: which entry receives chunks, and the raw
/// buffer that is the source of truth for its content.
#[derive(Debug)]
struct StreamTarget {
    entry: usize,
    buffer: String,
}

/// Append-only conversation history.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    stream: Option<StreamTarget>,
    typing: bool,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in arrival order.
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Whether no entries have been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a new entry, stamped with the current time.
    pub fn push(&mut self, kind: EntryKind) {
        self.entries.push(TranscriptEntry {
            at: Utc::now(),
            kind,
        });
    }

    // =========================================================================
    // Stream Accumulator
    // =========================================================================

    /// Start a new streamed agent entry with `initial` as its first chunk.
    pub fn begin_stream(&mut self, initial: &str) {
        self.push(EntryKind::Agent {
            markdown: initial.to_string(),
            tool_info: None,
        });
        self.stream = Some(StreamTarget {
            entry: self.entries.len() - 1,
            buffer: initial.to_string(),
        });
    }

    /// Append one chunk to the live stream.
    ///
    /// The raw buffer grows and the whole buffer is re-projected into the
    /// target entry, a full replace rather than a diff. With no live target this
    /// falls back to starting a new stream rather than erroring.
    pub fn append_stream(&mut self, chunk: &str) {
        match self.stream.as_mut() {
            Some(target) => {
                target.buffer.push_str(chunk);
                if let Some(TranscriptEntry {
                    kind: EntryKind::Agent { markdown, .. },
                    ..
                }) = self.entries.get_mut(target.entry)
                {
                    markdown.clone_from(&target.buffer);
                }
            }
            None => self.begin_stream(chunk),
        }
    }

    /// Invalidate the streaming target. The finished entry keeps its
    /// accumulated content; later chunks start a fresh entry.
    pub fn close_stream(&mut self) {
        self.stream = None;
    }

    /// Whether a streaming target is live.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    // =========================================================================
    // Typing Indicator
    // =========================================================================

    /// Show or hide the typing indicator. Idempotent in both directions.
    pub fn set_typing(&mut self, on: bool) {
        self.typing = on;
    }

    /// Whether the typing indicator is shown.
    #[must_use]
    pub fn typing(&self) -> bool {
        self.typing
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_markdown(entry: &TranscriptEntry) -> &str {
        match &entry.kind {
            EntryKind::Agent { markdown, .. } => markdown,
            other => panic!("expected Agent entry, got {other:?}"),
        }
    }

    #[test]
    fn stream_chunks_accumulate_into_one_entry() {
        let mut transcript = Transcript::new();
        transcript.append_stream("He");
        transcript.append_stream("llo");
        transcript.append_stream(", world");

        assert_eq!(transcript.entries().len(), 1);
        assert_eq!(agent_markdown(&transcript.entries()[0]), "Hello, world");
    }

    #[test]
    fn append_without_target_starts_a_stream() {
        let mut transcript = Transcript::new();
        assert!(!transcript.is_streaming());

        transcript.append_stream("first");
        assert!(transcript.is_streaming());
        assert_eq!(transcript.entries().len(), 1);
    }

    #[test]
    fn closed_stream_keeps_content_and_new_chunks_start_fresh() {
        let mut transcript = Transcript::new();
        transcript.append_stream("one");
        transcript.close_stream();
        transcript.append_stream("two");

        assert_eq!(transcript.entries().len(), 2);
        assert_eq!(agent_markdown(&transcript.entries()[0]), "one");
        assert_eq!(agent_markdown(&transcript.entries()[1]), "two");
    }

    #[test]
    fn non_stream_push_does_not_disturb_the_buffer() {
        // The dispatcher decides when to invalidate; pushing alone must not.
        let mut transcript = Transcript::new();
        transcript.append_stream("partial");
        transcript.push(EntryKind::Info {
            markdown: "notice".to_string(),
        });
        transcript.append_stream(" more");

        assert_eq!(agent_markdown(&transcript.entries()[0]), "partial more");
    }

    #[test]
    fn typing_indicator_is_idempotent() {
        let mut transcript = Transcript::new();
        transcript.set_typing(true);
        transcript.set_typing(true);
        assert!(transcript.typing());

        transcript.set_typing(false);
        transcript.set_typing(false);
        assert!(!transcript.typing());
    }

    #[test]
    fn media_kind_classification() {
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("audio/ogg"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Pdf);
        assert_eq!(MediaKind::from_mime("text/markdown"), MediaKind::Text);
        assert_eq!(
            MediaKind::from_mime("application/octet-stream"),
            MediaKind::Other
        );
        assert_eq!(MediaKind::from_mime(""), MediaKind::Other);
    }
}
