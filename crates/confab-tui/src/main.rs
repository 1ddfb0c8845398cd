//! Confab - terminal chat client for an AI-agent backend.
//!
//! This is the entry point for the `confab` binary.

mod app;
mod markdown;
mod staging;
mod ui;
mod ws;

use std::io;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;

use confab_core::PermissionDecision;

use app::{App, InputMode};
use ws::WsEvent;

/// Keepalive probe interval while the link is open.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Confab - terminal chat client for an AI-agent backend.
#[derive(Parser, Debug)]
#[command(name = "confab")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend server, e.g. `localhost:8000` or `wss://agent.example.com`.
    #[arg(long, env = "CONFAB_SERVER", default_value = "localhost:8000")]
    server: String,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter("confab=debug,confab_tui=debug,confab_core=debug,warn")
            .with_writer(std::io::stderr)
            .init();
    }

    // Highlighting assets load in the background; early paints fall back
    // to plain code lines.
    markdown::preload_highlighting();

    let url = ws::endpoint_url(&args.server);
    let (handle, mut ws_rx) = ws::spawn(url.clone());
    let mut app = App::new(handle, url);

    // Setup terminal with mouse capture enabled
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_event_loop(&mut terminal, &mut app, &mut ws_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

/// Main event loop.
///
/// Redraws immediately on every socket event so streamed text appears as
/// it arrives.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    ws_rx: &mut mpsc::Receiver<WsEvent>,
) -> anyhow::Result<()> {
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);

    loop {
        app.tick_animation();
        terminal.draw(|f| ui::render(f, app))?;

        let tick_rate = if app.session.transcript().typing() {
            Duration::from_millis(80) // keep the spinner smooth
        } else {
            Duration::from_millis(100)
        };

        tokio::select! {
            // Terminal events - poll with short timeout
            () = tokio::time::sleep(tick_rate) => {
                while event::poll(Duration::from_millis(0)).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        handle_input(app, evt).await;
                    }
                }
            }

            // Socket events - immediate redraw for real-time streaming
            Some(event) = ws_rx.recv() => {
                if app.handle_ws_event(event) {
                    terminal.draw(|f| ui::render(f, app))?;
                }
            }

            // Keepalive probe
            _ = keepalive.tick() => {
                app.send_keepalive().await;
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Handle one terminal event.
async fn handle_input(app: &mut App, event: Event) {
    match event {
        Event::Key(key) => {
            // Only handle key press events
            if key.kind != KeyEventKind::Press {
                return;
            }

            match app.input_mode {
                InputMode::Normal => handle_chat_key(app, key.code, key.modifiers).await,
                InputMode::AttachingFile => handle_attach_key(app, key.code).await,
                InputMode::Permission => handle_permission_key(app, key.code).await,
            }
        }
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => app.scroll_chat_up(3),
            MouseEventKind::ScrollDown => app.scroll_chat_down(3),
            _ => {}
        },
        _ => {}
    }
}

/// Keys in normal chat mode.
async fn handle_chat_key(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
    match code {
        KeyCode::Enter => {
            if app.can_send() {
                app.send_current().await;
            }
        }
        KeyCode::Esc => app.clear_error(),
        KeyCode::PageUp => app.scroll_chat_up(10),
        KeyCode::PageDown => app.scroll_chat_down(10),
        KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char(c) if modifiers.contains(KeyModifiers::CONTROL) => match c {
            'c' | 'q' => app.should_quit = true,
            'o' => app.enter_attach_mode(),
            'x' => app.remove_last_attachment(),
            'a' => app.move_cursor_start(),
            'e' => app.move_cursor_end(),
            'u' => app.clear_input(),
            _ => {}
        },
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        KeyCode::End => app.move_cursor_end(),
        _ => {}
    }
}

/// Keys in the attach-file dialog.
async fn handle_attach_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Esc => app.exit_dialog_mode(),
        KeyCode::Enter => {
            if !app.input.is_empty() {
                let path = app.take_input();
                app.attach_file(&path).await;
            }
            app.exit_dialog_mode();
        }
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        _ => {}
    }
}

/// Keys while the permission modal is up.
///
/// There is no cancel-without-response path: the modal stays until one of
/// the three decisions is taken.
async fn handle_permission_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char('y' | 'Y') => app.respond_permission(PermissionDecision::AllowOnce).await,
        KeyCode::Char('a' | 'A') => {
            app.respond_permission(PermissionDecision::AlwaysAllow).await;
        }
        KeyCode::Char('n' | 'N') => app.respond_permission(PermissionDecision::Deny).await,
        _ => {}
    }
}
