//! Application state.
//!
//! Glues the dispatch session, attachment staging, input editing, link
//! state, and the modal input modes together. All mutation happens on the
//! main event-loop task.

use std::time::Duration;

use confab_core::{ClientFrame, PermissionDecision, Session};

use crate::staging::{StagedFile, Staging};
use crate::ws::{WsEvent, WsHandle};

/// Input mode for modal operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Normal operation: typing goes to the message input.
    #[default]
    Normal,
    /// Prompting for a file path to stage.
    AttachingFile,
    /// A permission request modal is up.
    Permission,
}

/// The client's view of the socket session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// First connect attempt in flight.
    Connecting,
    /// The socket is open.
    Open,
    /// The link dropped; the supervisor retries after the delay.
    Down {
        /// Delay before the next attempt.
        retry_in: Duration,
    },
}

impl LinkState {
    /// Short status label for the header bar.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "connected",
            Self::Down { .. } => "offline",
        }
    }
}

/// Application state.
pub struct App {
    /// Dispatch state: transcript plus permission queue.
    pub session: Session,
    /// Attachments picked but not yet sent.
    pub staging: Staging,
    /// Outbound frame handle.
    ws: WsHandle,
    /// Link state as last reported by the supervisor.
    pub link: LinkState,
    /// Endpoint shown in the header.
    pub server_url: String,
    /// Current input buffer.
    pub input: String,
    /// Cursor position in input.
    pub cursor_position: usize,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Transcript scroll position (0 = bottom).
    pub chat_scroll: usize,
    /// Status message to display.
    pub status_message: Option<String>,
    /// Error message to display.
    pub error_message: Option<String>,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Animation frame counter for the typing indicator.
    pub animation_frame: usize,
    /// Saved chat input while a dialog borrows the input buffer.
    saved_chat_input: Option<(String, usize)>,
}

impl App {
    /// Create the application around a connection handle.
    #[must_use]
    pub fn new(ws: WsHandle, server_url: String) -> Self {
        Self {
            session: Session::new(),
            staging: Staging::new(),
            ws,
            link: LinkState::Connecting,
            server_url,
            input: String::new(),
            cursor_position: 0,
            input_mode: InputMode::Normal,
            chat_scroll: 0,
            status_message: None,
            error_message: None,
            should_quit: false,
            animation_frame: 0,
            saved_chat_input: None,
        }
    }

    /// Tick the animation frame (call on each render).
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Current spinner character for the typing indicator.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clear the error message.
    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// Whether the socket is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Open
    }

    // =========================================================================
    // Chat Scrolling
    // =========================================================================

    /// Scroll the transcript up (view older entries).
    pub fn scroll_chat_up(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_add(amount);
    }

    /// Scroll the transcript down (view newer entries).
    pub fn scroll_chat_down(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_sub(amount);
    }

    // =========================================================================
    // Input Handling
    // =========================================================================

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, c: char) {
        self.input.insert(self.cursor_position, c);
        self.cursor_position += c.len_utf8();
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            let prev = self.input[..self.cursor_position]
                .chars()
                .next_back()
                .map_or(1, char::len_utf8);
            self.cursor_position -= prev;
            self.input.remove(self.cursor_position);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_char_forward(&mut self) {
        if self.cursor_position < self.input.len() {
            self.input.remove(self.cursor_position);
        }
    }

    /// Move cursor left.
    pub fn move_cursor_left(&mut self) {
        if self.cursor_position > 0 {
            let prev = self.input[..self.cursor_position]
                .chars()
                .next_back()
                .map_or(1, char::len_utf8);
            self.cursor_position -= prev;
        }
    }

    /// Move cursor right.
    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.len() {
            let next = self.input[self.cursor_position..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
            self.cursor_position += next;
        }
    }

    /// Move cursor to the start.
    pub fn move_cursor_start(&mut self) {
        self.cursor_position = 0;
    }

    /// Move cursor to the end.
    pub fn move_cursor_end(&mut self) {
        self.cursor_position = self.input.len();
    }

    /// Clear the input.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Take the current input (clears it).
    pub fn take_input(&mut self) -> String {
        let input = std::mem::take(&mut self.input);
        self.cursor_position = 0;
        input
    }

    // =========================================================================
    // Dialog Modes
    // =========================================================================

    /// Enter the attach-file dialog, saving the chat input.
    pub fn enter_attach_mode(&mut self) {
        self.saved_chat_input = Some((std::mem::take(&mut self.input), self.cursor_position));
        self.cursor_position = 0;
        self.input_mode = InputMode::AttachingFile;
    }

    /// Leave the current dialog, restoring the saved chat input.
    pub fn exit_dialog_mode(&mut self) {
        self.input_mode = InputMode::Normal;
        if let Some((input, cursor)) = self.saved_chat_input.take() {
            self.input = input;
            self.cursor_position = cursor;
        }
        // A permission request may have arrived while the dialog was up.
        self.maybe_show_permission();
    }

    /// Put the permission modal up if a request is active and no other
    /// dialog is borrowing the screen.
    pub fn maybe_show_permission(&mut self) {
        if self.input_mode == InputMode::Normal && self.session.active_permission().is_some() {
            self.input_mode = InputMode::Permission;
        }
    }

    // =========================================================================
    // Attachment Staging
    // =========================================================================

    /// Probe and stage the file at `path`.
    pub async fn attach_file(&mut self, path: &str) {
        match StagedFile::probe(path).await {
            Ok(file) => {
                let name = file.name().to_string();
                if self.staging.add(file) {
                    self.set_status(format!("Attached {name}"));
                } else {
                    // Silent dedup: same (name, size) stays staged once.
                    self.set_status(format!("{name} is already attached"));
                }
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Drop the most recently staged attachment.
    pub fn remove_last_attachment(&mut self) {
        let last = self.staging.len().wrapping_sub(1);
        if let Some(file) = self.staging.remove(last) {
            self.set_status(format!("Removed {}", file.name()));
        }
    }

    // =========================================================================
    // Send Path
    // =========================================================================

    /// Send gating: non-blank text or at least one staged file.
    #[must_use]
    pub fn can_send(&self) -> bool {
        !self.input.trim().is_empty() || !self.staging.is_empty()
    }

    /// Encode all staged attachments, emit one combined `user_message`
    /// frame, and record the turn in the transcript.
    ///
    /// A failed attachment read aborts the send, surfaces the error, and
    /// leaves both the input and the staging list intact.
    pub async fn send_current(&mut self) {
        if !self.can_send() {
            return;
        }
        if !self.is_connected() {
            self.set_error("Not connected");
            return;
        }

        let files = match self.staging.encode_all().await {
            Ok(files) => files,
            Err(e) => {
                self.set_error(e.to_string());
                return;
            }
        };

        let text = self.input.trim().to_string();
        let frame = ClientFrame::UserMessage {
            text: text.clone(),
            files,
        };
        if let Err(e) = self.ws.send(&frame).await {
            self.set_error(e.to_string());
            return;
        }

        self.session.record_user_message(text, self.staging.metas());
        self.clear_input();
        self.staging.clear();
        self.chat_scroll = 0;
        self.status_message = None;
    }

    /// Send a keepalive probe if the link is open.
    pub async fn send_keepalive(&mut self) {
        if self.is_connected() {
            if let Err(e) = self.ws.send(&ClientFrame::Ping).await {
                tracing::warn!(error = %e, "keepalive failed");
            }
        }
    }

    // =========================================================================
    // Permission Prompt
    // =========================================================================

    /// Answer the active permission request and promote the next one.
    pub async fn respond_permission(&mut self, decision: PermissionDecision) {
        let Some(request) = self.session.active_permission() else {
            return;
        };
        let tool_name = request.tool_name.clone();

        let frame = ClientFrame::PermissionResponse { allow: decision };
        if let Err(e) = self.ws.send(&frame).await {
            // Keep the modal up; the user can answer again once the link
            // is back.
            self.set_error(e.to_string());
            return;
        }

        self.session.resolve_permission();
        let verdict = match decision {
            PermissionDecision::Deny => "denied",
            PermissionDecision::AllowOnce => "allowed once",
            PermissionDecision::AlwaysAllow => "always allowed",
        };
        self.set_status(format!("{tool_name}: {verdict}"));

        if self.session.active_permission().is_none() {
            self.input_mode = InputMode::Normal;
        }
    }

    // =========================================================================
    // Socket Events
    // =========================================================================

    /// Handle one supervisor event.
    ///
    /// Returns `true` if the UI should be redrawn immediately.
    pub fn handle_ws_event(&mut self, event: WsEvent) -> bool {
        match event {
            WsEvent::Up => {
                self.link = LinkState::Open;
                self.set_status("Connected");
                true
            }
            WsEvent::Down { reason, retry_in } => {
                self.link = LinkState::Down { retry_in };
                self.set_error(format!(
                    "Connection lost: {reason} (retrying in {}s)",
                    retry_in.as_secs().max(1)
                ));
                true
            }
            WsEvent::Frame(frame) => {
                let redraw = self.session.apply(frame);
                self.maybe_show_permission();
                if redraw {
                    // Keep the view pinned to the newest entry.
                    self.chat_scroll = 0;
                }
                redraw
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
