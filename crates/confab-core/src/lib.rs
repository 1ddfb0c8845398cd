//! Core types and state machines for confab.
//!
//! This crate holds everything about the chat client that does not touch a
//! socket or a terminal:
//!
//! - **Protocol**: the JSON frame types exchanged with the agent backend
//! - **Transcript**: the append-only conversation history and the streaming
//!   accumulator for incremental agent text
//! - **Session**: the dispatcher that routes inbound frames to transcript
//!   mutations and manages pending permission requests
//!
//! # Example
//!
//! ```
//! use confab_core::{decode_server_frame, Session};
//!
//! let mut session = Session::new();
//! let frame = decode_server_frame(
//!     r#"{"type":"agent_message_stream","content":"Hello"}"#
//! ).unwrap();
//! session.apply(frame);
//! assert_eq!(session.transcript().entries().len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod protocol;
pub mod session;
pub mod transcript;

pub use error::ProtocolError;
pub use protocol::{
    decode_server_frame, encode_client_frame, ClientFrame, FileAttachment, PermissionDecision,
    ServerFrame, ToolInfo, TypingStatus,
};
pub use session::{PermissionRequest, Session};
pub use transcript::{AttachmentMeta, EntryKind, MediaKind, Transcript, TranscriptEntry};
