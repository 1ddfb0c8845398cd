//! UI rendering with ratatui.
//!
//! One renderer per transcript entry kind, plus the chrome: header bar,
//! attachment tray, input line, status bar, and the modal dialogs.

use chrono::{DateTime, Local, Utc};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
};
use ratatui::Frame;

use confab_core::{AttachmentMeta, EntryKind, ToolInfo, TranscriptEntry};

use crate::app::{App, InputMode, LinkState};
use crate::markdown::render_markdown;

/// Horizontal padding for transcript content.
const CHAT_PADDING: u16 = 2;

/// Render the UI.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let tray_height = u16::from(!app.staging.is_empty());
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),           // Header bar
            Constraint::Min(3),              // Transcript
            Constraint::Length(tray_height), // Attachment tray
            Constraint::Length(1),           // Separator
            Constraint::Length(1),           // Input line
            Constraint::Length(1),           // Status bar
        ])
        .split(area);

    render_header_bar(frame, app, layout[0]);
    render_transcript(frame, app, layout[1]);
    if tray_height > 0 {
        render_attachment_tray(frame, app, layout[2]);
    }
    render_input_line(frame, app, layout[3], layout[4]);
    render_status_bar(frame, app, layout[5]);

    match app.input_mode {
        InputMode::AttachingFile => render_attach_dialog(frame, app, area),
        InputMode::Permission => render_permission_modal(frame, app, area),
        InputMode::Normal => {}
    }
}

/// Render the header bar with the client name, endpoint, and link state.
fn render_header_bar(frame: &mut Frame, app: &App, area: Rect) {
    let state_text = app.link.label();
    let state_style = match app.link {
        LinkState::Open => Style::default().fg(Color::Green),
        LinkState::Connecting => Style::default().fg(Color::Yellow),
        LinkState::Down { .. } => Style::default().fg(Color::Red),
    };

    let title = "CONFAB";
    let right = format!("{} [{state_text}]", app.server_url);
    let gap = (area.width as usize).saturating_sub(title.len() + right.len());

    let line = Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat(gap)),
        Span::raw(app.server_url.as_str()),
        Span::raw(" ["),
        Span::styled(state_text, state_style),
        Span::raw("]"),
    ]);

    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

/// Render the transcript with scrolling and a scrollbar.
fn render_transcript(frame: &mut Frame, app: &App, area: Rect) {
    let chat_area = Rect::new(
        area.x + CHAT_PADDING,
        area.y,
        area.width.saturating_sub(CHAT_PADDING * 2 + 1), // +1 for scrollbar
        area.height,
    );
    let content_width = chat_area.width as usize;

    let transcript = app.session.transcript();
    if transcript.is_empty() && !transcript.typing() {
        let help = if app.is_connected() {
            "Type a message and press Enter to send. Ctrl+O attaches a file."
        } else {
            "Waiting for the connection..."
        };
        frame.render_widget(
            Paragraph::new(help)
                .style(Style::default().fg(Color::DarkGray))
                .wrap(Wrap { trim: true }),
            chat_area,
        );
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for entry in transcript.entries() {
        lines.extend(entry_lines(entry, content_width));
        lines.push(Line::from(""));
    }

    if transcript.typing() {
        lines.push(typing_indicator_line(app));
    }

    let text = Text::from(lines);
    let visible_lines = chat_area.height as usize;
    let total_wrapped_lines = wrapped_line_count(&text, content_width);

    // chat_scroll counts lines up from the bottom; the paragraph scrolls
    // down from the top.
    let max_scroll = total_wrapped_lines.saturating_sub(visible_lines);
    let effective_scroll = app.chat_scroll.min(max_scroll);
    let scroll_offset = max_scroll.saturating_sub(effective_scroll);

    frame.render_widget(
        Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .scroll((u16::try_from(scroll_offset).unwrap_or(u16::MAX), 0)),
        chat_area,
    );

    if total_wrapped_lines > visible_lines {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut state = ScrollbarState::new(total_wrapped_lines)
            .position(scroll_offset)
            .viewport_content_length(visible_lines);
        frame.render_stateful_widget(scrollbar, area, &mut state);
    }
}

/// Dispatch one entry to its renderer.
fn entry_lines(entry: &TranscriptEntry, width: usize) -> Vec<Line<'static>> {
    match &entry.kind {
        EntryKind::User { text, attachments } => user_lines(entry.at, text, attachments, width),
        EntryKind::Agent {
            markdown,
            tool_info,
        } => agent_lines(entry.at, markdown, tool_info.as_ref(), width),
        EntryKind::Thoughts { markdown } => thoughts_lines(entry.at, markdown, width),
        EntryKind::ToolCall {
            tool_name,
            tool_args,
        } => tool_call_lines(entry.at, tool_name, tool_args),
        EntryKind::ToolResult { tool_name, result } => {
            tool_result_lines(entry.at, tool_name, result)
        }
        EntryKind::Error { markdown } => error_lines(entry.at, markdown, width),
        EntryKind::Info { markdown } => info_lines(entry.at, markdown, width),
    }
}

/// `[Label] HH:MM` heading shared by all entry kinds.
fn entry_header(label: &'static str, color: Color, at: DateTime<Utc>) -> Line<'static> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::styled(
            format!(" {}", at.with_timezone(&Local).format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

/// A user turn: text plus one chip per attachment.
fn user_lines(
    at: DateTime<Utc>,
    text: &str,
    attachments: &[AttachmentMeta],
    width: usize,
) -> Vec<Line<'static>> {
    let mut lines = vec![entry_header("[You]", Color::Cyan, at)];
    if !text.is_empty() {
        lines.extend(render_markdown(text, width));
    }
    for meta in attachments {
        lines.push(attachment_chip(meta));
    }
    lines
}

/// One attachment chip, icon chosen by coarse media kind.
fn attachment_chip(meta: &AttachmentMeta) -> Line<'static> {
    Line::from(vec![
        Span::raw(format!("  {} ", meta.media_kind().icon())),
        Span::styled(meta.name.clone(), Style::default().fg(Color::White)),
        Span::styled(
            format!(" ({})", human_size(meta.size)),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

/// An agent message: markdown body plus the optional tool-info block.
fn agent_lines(
    at: DateTime<Utc>,
    markdown: &str,
    tool_info: Option<&ToolInfo>,
    width: usize,
) -> Vec<Line<'static>> {
    let mut lines = vec![entry_header("[Agent]", Color::Green, at)];
    lines.extend(render_markdown(markdown, width));
    if let Some(info) = tool_info {
        lines.push(Line::from(vec![
            Span::styled("▎ ", Style::default().fg(Color::Green)),
            Span::styled(
                info.title.clone(),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        ]));
        for detail in info.details.split('\n') {
            lines.push(Line::from(vec![
                Span::styled("▎ ", Style::default().fg(Color::Green)),
                Span::styled(detail.to_string(), Style::default().fg(Color::Gray)),
            ]));
        }
    }
    lines
}

/// Model reasoning, visually set apart from regular agent text.
fn thoughts_lines(at: DateTime<Utc>, markdown: &str, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![entry_header("[Thoughts]", Color::Magenta, at)];
    for rendered in render_markdown(markdown, width) {
        let mut spans = vec![Span::styled("▎ ", Style::default().fg(Color::Magenta))];
        spans.extend(rendered.spans.into_iter().map(|span| {
            Span::styled(
                span.content,
                span.style.add_modifier(Modifier::ITALIC).fg(Color::Gray),
            )
        }));
        lines.push(Line::from(spans));
    }
    lines
}

/// A tool invocation announcement.
fn tool_call_lines(at: DateTime<Utc>, tool_name: &str, tool_args: &str) -> Vec<Line<'static>> {
    vec![
        entry_header("[Tool Call]", Color::Blue, at),
        Line::from(vec![
            Span::styled("▎ ", Style::default().fg(Color::Blue)),
            Span::styled(
                tool_name.to_string(),
                Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!(" {tool_args}"), Style::default().fg(Color::Gray)),
        ]),
    ]
}

/// A tool result, verbatim and whitespace-preserving.
fn tool_result_lines(at: DateTime<Utc>, tool_name: &str, result: &str) -> Vec<Line<'static>> {
    let mut lines = vec![entry_header("[Tool Result]", Color::Green, at)];
    lines.push(Line::from(vec![
        Span::styled("▎ ", Style::default().fg(Color::Green)),
        Span::styled(tool_name.to_string(), Style::default().fg(Color::Green)),
    ]));
    // No markdown here: results are preformatted text.
    for raw in result.split('\n') {
        lines.push(Line::from(vec![
            Span::styled("▎ ", Style::default().fg(Color::Green)),
            Span::styled(raw.to_string(), Style::default().fg(Color::White)),
        ]));
    }
    lines
}

/// A backend-reported error block.
fn error_lines(at: DateTime<Utc>, markdown: &str, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![entry_header("[Error]", Color::Red, at)];
    for rendered in render_markdown(markdown, width) {
        let mut spans = vec![Span::styled("▎ ", Style::default().fg(Color::Red))];
        spans.extend(rendered.spans);
        lines.push(Line::from(spans));
    }
    lines
}

/// An informational notice.
fn info_lines(at: DateTime<Utc>, markdown: &str, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![entry_header("[Info]", Color::Yellow, at)];
    for rendered in render_markdown(markdown, width) {
        let mut spans = vec![Span::styled("▎ ", Style::default().fg(Color::Yellow))];
        spans.extend(rendered.spans);
        lines.push(Line::from(spans));
    }
    lines
}

/// The animated "agent is typing" singleton.
fn typing_indicator_line(app: &App) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            app.spinner_char(),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(
            " Agent is typing...",
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

/// Render the staged-attachment tray above the input line.
fn render_attachment_tray(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled("📎 ", Style::default().fg(Color::Yellow))];
    for (i, file) in app.staging.files().iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled(
            file.name().to_string(),
            Style::default().fg(Color::White),
        ));
        spans.push(Span::styled(
            format!(" ({})", human_size(file.size())),
            Style::default().fg(Color::DarkGray),
        ));
    }
    spans.push(Span::styled(
        "  Ctrl+X removes last",
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Render the separator and the input line.
fn render_input_line(frame: &mut Frame, app: &App, separator_area: Rect, input_area: Rect) {
    frame.render_widget(
        Paragraph::new("─".repeat(separator_area.width as usize))
            .style(Style::default().fg(Color::DarkGray)),
        separator_area,
    );

    let in_modal = app.input_mode != InputMode::Normal;
    let input_text = if in_modal { "" } else { app.input.as_str() };

    let line = Line::from(vec![
        Span::styled("> ", Style::default().fg(Color::Cyan)),
        Span::styled(input_text, Style::default().fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(line), input_area);

    if !in_modal {
        frame.set_cursor_position((
            input_area.x + 2 + u16::try_from(app.cursor_position).unwrap_or(0),
            input_area.y,
        ));
    }
}

/// Render the status bar.
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode = match app.input_mode {
        InputMode::Normal => Span::styled(" CHAT ", Style::default().fg(Color::Black).bg(Color::Green)),
        InputMode::AttachingFile => {
            Span::styled(" ATTACH ", Style::default().fg(Color::Black).bg(Color::Yellow))
        }
        InputMode::Permission => {
            Span::styled(" PERMISSION ", Style::default().fg(Color::Black).bg(Color::Magenta))
        }
    };

    let status = if let Some(ref error) = app.error_message {
        Line::from(vec![
            mode,
            Span::styled(" ✗ ", Style::default().fg(Color::Red).bold()),
            Span::styled(error.clone(), Style::default().fg(Color::Red)),
        ])
    } else if let Some(ref message) = app.status_message {
        Line::from(vec![
            mode,
            Span::styled(format!(" {message}"), Style::default().fg(Color::Green)),
        ])
    } else {
        Line::from(vec![
            mode,
            Span::raw(" "),
            Span::styled("Enter", Style::default().fg(Color::Yellow)),
            Span::raw(":send "),
            Span::styled("Ctrl+O", Style::default().fg(Color::Yellow)),
            Span::raw(":attach "),
            Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
            Span::raw(":scroll "),
            Span::styled("Ctrl+C", Style::default().fg(Color::Yellow)),
            Span::raw(":quit"),
        ])
    };

    frame.render_widget(
        Paragraph::new(status).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

/// Render the attach-file dialog.
fn render_attach_dialog(frame: &mut Frame, app: &App, area: Rect) {
    let dialog_width = 60.min(area.width.saturating_sub(4));
    let dialog_height = 7.min(area.height.saturating_sub(4));
    let dialog_area = Rect::new(
        area.x + (area.width.saturating_sub(dialog_width)) / 2,
        area.y + (area.height.saturating_sub(dialog_height)) / 2,
        dialog_width,
        dialog_height,
    );

    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" Attach File ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Label
            Constraint::Length(3), // Input box
            Constraint::Length(1), // Help text
        ])
        .split(inner);

    frame.render_widget(
        Paragraph::new("File path:").style(Style::default().fg(Color::White)),
        layout[0],
    );

    let input = Paragraph::new(app.input.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        );
    frame.render_widget(input, layout[1]);

    frame.render_widget(
        Paragraph::new("Enter to attach, Esc to cancel")
            .style(Style::default().fg(Color::DarkGray)),
        layout[2],
    );

    frame.set_cursor_position((
        layout[1].x + u16::try_from(app.cursor_position).unwrap_or(0) + 1,
        layout[1].y + 1,
    ));
}

/// Render the permission request modal.
fn render_permission_modal(frame: &mut Frame, app: &App, area: Rect) {
    let Some(request) = app.session.active_permission() else {
        return;
    };

    let dialog_area = centered_rect(60, 40, area);
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" Permission Request ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));
    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let mut lines = vec![
        Line::from(vec![
            Span::raw("The agent wants to run "),
            Span::styled(
                request.tool_name.clone(),
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            request.tool_args.clone(),
            Style::default().fg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("[y]", Style::default().fg(Color::Green).bold()),
            Span::raw(" Allow once  "),
            Span::styled("[a]", Style::default().fg(Color::Cyan).bold()),
            Span::raw(" Always allow  "),
            Span::styled("[n]", Style::default().fg(Color::Red).bold()),
            Span::raw(" Deny"),
        ]),
    ];

    let pending = app.session.pending_permissions();
    if pending > 0 {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("({pending} more waiting)"),
            Style::default().fg(Color::DarkGray),
        )));
    }

    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(Color::White))
            .wrap(Wrap { trim: true }),
        inner,
    );
}

/// Human-readable file size.
fn human_size(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes_f / 1024.0)
    } else {
        format!("{:.1} MB", bytes_f / (1024.0 * 1024.0))
    }
}

/// Calculate the number of visual lines after text wrapping.
fn wrapped_line_count(text: &Text, available_width: usize) -> usize {
    if available_width == 0 {
        return text.lines.len();
    }

    text.lines
        .iter()
        .map(|line| {
            let width = line.width();
            if width == 0 {
                1
            } else {
                width.div_ceil(available_width)
            }
        })
        .sum()
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

// =============================================================================
// Tests
// =============================================================================
