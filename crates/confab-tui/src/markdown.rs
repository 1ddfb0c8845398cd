//! Markdown to styled terminal text.
//!
//! Converts a raw Markdown buffer into `ratatui` lines. GitHub-flavored
//! extensions are enabled and soft line breaks render as real line breaks,
//! matching how agent messages are authored.
//!
//! Syntax highlighting assets (syntect) are expensive to load, so they are
//! built once on a background thread; renders that happen before the load
//! completes fall back to plain code lines.

use std::sync::OnceLock;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

/// Highlighting assets, loaded once.
struct HighlightAssets {
    syntaxes: SyntaxSet,
    theme: Theme,
}

static ASSETS: OnceLock<HighlightAssets> = OnceLock::new();

fn load_assets() -> &'static HighlightAssets {
    ASSETS.get_or_init(|| {
        let mut themes = ThemeSet::load_defaults();
        HighlightAssets {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            // A stock syntect theme; present in every load_defaults() set.
            theme: themes
                .themes
                .remove("base16-ocean.dark")
                .unwrap_or_default(),
        }
    })
}

/// Kick off asset loading without blocking the caller.
pub fn preload_highlighting() {
    std::thread::spawn(|| {
        let _ = load_assets();
    });
}

/// Render a Markdown buffer into styled lines.
///
/// `width` bounds decorative elements (rules, code fences); text itself is
/// wrapped later by the paragraph widget.
#[must_use]
pub fn render_markdown(text: &str, width: usize) -> Vec<Line<'static>> {
    Renderer::new(width).run(text)
}

/// Walks pulldown-cmark events and assembles styled lines.
struct Renderer {
    width: usize,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    /// `Some` while inside a fenced/indented code block.
    code: Option<CodeCapture>,
    /// One entry per open list; `Some(n)` carries the next ordered index.
    lists: Vec<Option<u64>>,
    quote_depth: usize,
}

struct CodeCapture {
    lang: Option<String>,
    body: String,
}

impl Renderer {
    fn new(width: usize) -> Self {
        Self {
            width,
            lines: Vec::new(),
            current: Vec::new(),
            styles: vec![Style::default()],
            code: None,
            lists: Vec::new(),
            quote_depth: 0,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, patch: impl FnOnce(Style) -> Style) {
        self.styles.push(patch(self.style()));
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn break_line(&mut self) {
        let mut spans = std::mem::take(&mut self.current);
        if self.quote_depth > 0 {
            spans.insert(
                0,
                Span::styled("▏ ".repeat(self.quote_depth), Style::default().fg(Color::Blue)),
            );
        }
        self.lines.push(Line::from(spans));
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.break_line();
        }
    }

    fn blank_line(&mut self) {
        self.flush();
        if matches!(self.lines.last(), Some(line) if !line.spans.is_empty()) {
            self.lines.push(Line::from(""));
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(code) = self.code.as_mut() {
            code.body.push_str(text);
            return;
        }

        let style = self.style();
        let mut first = true;
        for part in text.split('\n') {
            if !first {
                self.break_line();
            }
            first = false;
            if !part.is_empty() {
                self.current.push(Span::styled(part.to_string(), style));
            }
        }
    }

    fn run(mut self, text: &str) -> Vec<Line<'static>> {
        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;

        for event in Parser::new_ext(text, options) {
            match event {
                Event::Start(tag) => self.start(tag),
                Event::End(tag) => self.end(tag),
                Event::Text(body) => self.text(&body),
                Event::Code(code) => {
                    self.current.push(Span::styled(
                        code.to_string(),
                        Style::default().fg(Color::Yellow).bg(Color::Rgb(45, 45, 45)),
                    ));
                }
                // Soft breaks become real line breaks, the way the backend
                // authors its messages.
                Event::SoftBreak | Event::HardBreak => self.break_line(),
                Event::Rule => {
                    self.flush();
                    self.lines.push(Line::from(Span::styled(
                        "─".repeat(self.width.clamp(1, 60)),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
                _ => {}
            }
        }

        self.flush();
        while matches!(self.lines.last(), Some(line) if line.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Heading { level, .. } => {
                self.blank_line();
                let color = if level == HeadingLevel::H1 {
                    Color::Magenta
                } else {
                    Color::Cyan
                };
                self.push_style(|s| s.fg(color).add_modifier(Modifier::BOLD));
            }
            Tag::Paragraph => self.flush(),
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
                self.push_style(|s| s.fg(Color::Gray));
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                    _ => None,
                };
                self.code = Some(CodeCapture {
                    lang,
                    body: String::new(),
                });
            }
            Tag::List(first_index) => {
                if self.lists.is_empty() {
                    self.flush();
                }
                self.lists.push(first_index);
            }
            Tag::Item => {
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let marker = match self.lists.last_mut() {
                    Some(Some(index)) => {
                        let marker = format!("{indent}{index}. ");
                        *index += 1;
                        marker
                    }
                    _ => format!("{indent}• "),
                };
                self.current
                    .push(Span::styled(marker, Style::default().fg(Color::Cyan)));
            }
            Tag::Emphasis => self.push_style(|s| s.add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(|s| s.add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self.push_style(|s| s.add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { .. } => {
                self.push_style(|s| s.fg(Color::Blue).add_modifier(Modifier::UNDERLINED));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => {
                self.pop_style();
                self.flush();
            }
            TagEnd::Paragraph => self.blank_line(),
            TagEnd::BlockQuote(_) => {
                self.pop_style();
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    self.emit_code_block(&code);
                }
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                self.pop_style();
            }
            _ => {}
        }
    }

    fn emit_code_block(&mut self, code: &CodeCapture) {
        let fence = Style::default().fg(Color::DarkGray);
        let fence_width = self.width.clamp(4, 48);

        let header = match &code.lang {
            Some(lang) => {
                let tail = fence_width.saturating_sub(lang.len() + 4);
                Line::from(vec![
                    Span::styled("┌─ ", fence),
                    Span::styled(lang.clone(), Style::default().fg(Color::Cyan)),
                    Span::styled(" ".to_string() + &"─".repeat(tail), fence),
                ])
            }
            None => Line::from(Span::styled("┌".to_string() + &"─".repeat(fence_width - 1), fence)),
        };
        self.lines.push(header);

        for spans in highlight_code(&code.body, code.lang.as_deref()) {
            let mut line = vec![Span::styled("│ ", fence)];
            line.extend(spans);
            self.lines.push(Line::from(line));
        }

        self.lines.push(Line::from(Span::styled(
            "└".to_string() + &"─".repeat(fence_width - 1),
            fence,
        )));
        self.lines.push(Line::from(""));
    }
}

/// Highlight a code block, one `Vec<Span>` per line.
///
/// Falls back to plain dimmed text when the assets have not finished
/// loading yet or the language is unknown.
fn highlight_code(body: &str, lang: Option<&str>) -> Vec<Vec<Span<'static>>> {
    let plain = || {
        body.lines()
            .map(|line| {
                vec![Span::styled(
                    line.to_string(),
                    Style::default().fg(Color::White),
                )]
            })
            .collect()
    };

    let Some(assets) = ASSETS.get() else {
        return plain();
    };
    let Some(lang) = lang else {
        return plain();
    };
    let Some(syntax) = assets
        .syntaxes
        .find_syntax_by_token(lang)
        .or_else(|| assets.syntaxes.find_syntax_by_extension(lang))
    else {
        return plain();
    };

    let mut highlighter = HighlightLines::new(syntax, &assets.theme);
    let mut result = Vec::new();

    for line in LinesWithEndings::from(body) {
        let Ok(ranges) = highlighter.highlight_line(line, &assets.syntaxes) else {
            result.push(vec![Span::styled(
                line.trim_end_matches(['\n', '\r']).to_string(),
                Style::default().fg(Color::White),
            )]);
            continue;
        };

        let mut spans = Vec::new();
        for (style, text) in ranges {
            let text = text.trim_end_matches(['\n', '\r']);
            if text.is_empty() {
                continue;
            }
            let mut out = Style::default().fg(Color::Rgb(
                style.foreground.r,
                style.foreground.g,
                style.foreground.b,
            ));
            if style.font_style.contains(FontStyle::BOLD) {
                out = out.add_modifier(Modifier::BOLD);
            }
            if style.font_style.contains(FontStyle::ITALIC) {
                out = out.add_modifier(Modifier::ITALIC);
            }
            spans.push(Span::styled(text.to_string(), out));
        }
        result.push(spans);
    }

    result
}

// =============================================================================
// Tests
// =============================================================================
