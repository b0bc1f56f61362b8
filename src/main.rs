//! termsession - loopback terminal demo
//!
//! Opens a terminal session sized to the host console and echoes everything
//! typed back into it, so the session's input, title, scrolling, and buffer
//! operations can be exercised by hand without a shell.
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+Q | Quit |
//! | Shift+PageUp/PageDown | Scroll one page |
//! | Shift+Up/Down | Scroll one line |
//! | Shift+Home/End | Scroll to top/bottom |
//! | F5 / F6 | Alternate / primary buffer |
//! | F7 | Reset |
//! | F8 | Clear |

use std::cell::RefCell;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::SetTitle;
use crossterm::execute;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use termsession::config::data_dir;
use termsession::ui::Renderer;
use termsession::{FixedContainer, SessionConfig, TerminalSession};

/// Command line options
#[derive(Default)]
struct Options {
    config_path: Option<PathBuf>,
    cursor_blink: Option<bool>,
    take_focus: Option<bool>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

const BANNER: &str = concat!(
    "\x1b]0;termsession\x07",
    "\x1b[32mtermsession loopback\x1b[0m\r\n",
    "\r\n",
    "Typed input is echoed back. \x1b[1mCtrl+Q\x1b[0m quits.\r\n",
    "Shift+PageUp/PageDown, Shift+Up/Down, Shift+Home/End scroll.\r\n",
    "F5/F6 switch buffers, F7 resets, F8 clears.\r\n",
    "\r\n",
);

fn print_help() {
    eprintln!("termsession {} - loopback terminal session", VERSION);
    eprintln!();
    eprintln!("Usage: termsession [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>   Config file (default: ~/.termsession/config.toml)");
    eprintln!("  -b, --blink           Blinking cursor");
    eprintln!("      --no-focus        Do not take focus on start");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
}

fn parse_args() -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args.next().ok_or("--config requires a path")?;
                options.config_path = Some(PathBuf::from(path));
            }
            "-b" | "--blink" => options.cursor_blink = Some(true),
            "--no-focus" => options.take_focus = Some(false),
            "-v" | "--version" => {
                eprintln!("termsession {}", VERSION);
                std::process::exit(0);
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => return Err(format!("Unknown option: {}", other)),
        }
    }
    Ok(options)
}

/// Log to `~/.termsession/termsession.log`; `RUST_LOG` overrides the level
fn init_logging() {
    let log_path = data_dir()
        .map(|dir| dir.join("termsession.log"))
        .unwrap_or_else(|| PathBuf::from("termsession.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn load_config(options: &Options) -> anyhow::Result<SessionConfig> {
    let mut config = match &options.config_path {
        Some(path) => SessionConfig::load_from(path)?,
        None => SessionConfig::load(),
    };
    if let Some(blink) = options.cursor_blink {
        config.cursor_blink = blink;
    }
    if let Some(focus) = options.take_focus {
        config.take_focus = focus;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("termsession {} starting...", VERSION);

    let config = load_config(&options)?;

    let mut renderer = Renderer::new();
    renderer.init()?;

    let result = run(&config, &mut renderer);

    let _ = renderer.cleanup();
    if let Err(e) = &result {
        error!("Exited with error: {}", e);
    }
    result
}

/// Pixel size of a host console of `cols` x `rows` cells
fn console_pixels(config: &SessionConfig, cols: u16, rows: u16) -> (u32, u32) {
    (
        cols as u32 * config.cell.width + config.scrollbar_width,
        rows as u32 * config.cell.height,
    )
}

fn run(config: &SessionConfig, renderer: &mut Renderer) -> anyhow::Result<()> {
    let (cols, rows) = Renderer::size()?;
    let (width, height) = console_pixels(config, cols, rows);
    let container = Rc::new(FixedContainer::new(width, height));

    let mut session = TerminalSession::from_config(container.clone(), config)?;
    info!("Console {}x{}, session {}", cols, rows, session.dimensions());

    let pending: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = pending.clone();
    session.on_input(move |data| sink.borrow_mut().push(data.to_string()));
    session.on_title_change(|title| {
        let _ = execute!(std::io::stdout(), SetTitle(title));
    });

    session.write(BANNER);
    renderer.render(session.engine_mut().state_mut())?;

    run_main_loop(&mut session, &container, config, &pending, renderer)?;

    session.destroy();
    Ok(())
}

fn run_main_loop(
    session: &mut TerminalSession,
    container: &FixedContainer,
    config: &SessionConfig,
    pending: &RefCell<Vec<String>>,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    let poll_timeout = Duration::from_millis(50);

    loop {
        if event::poll(poll_timeout)? {
            match event::read()? {
                Event::Key(key_event) => {
                    if key_event.kind != KeyEventKind::Press {
                        continue;
                    }
                    if is_quit(&key_event) {
                        info!("Quit requested");
                        break;
                    }
                    if !handle_command_key(session, &key_event) {
                        session.handle_key(&key_event);
                    }
                }
                Event::Resize(cols, rows) => {
                    let (width, height) = console_pixels(config, cols, rows);
                    container.set_size(width, height);
                    let dims = session.fit();
                    info!("Resize: console {}x{}, session {}", cols, rows, dims);
                }
                Event::Paste(text) => session.paste(&text),
                Event::Mouse(mouse_event) => session.handle_mouse(&mouse_event),
                Event::FocusGained => session.focus(),
                Event::FocusLost => session.blur(),
            }
        }

        // Loop input back as program output
        let echoed: Vec<String> = pending.borrow_mut().drain(..).collect();
        for data in echoed {
            session.write(&loopback(&data));
        }

        renderer.render(session.engine_mut().state_mut())?;
        let _ = std::io::stdout().flush();
    }

    Ok(())
}

fn is_quit(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q'))
}

/// Session operations bound to keys. Returns `true` when the key was consumed.
fn handle_command_key(session: &mut TerminalSession, key: &KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::SHIFT) {
        match key.code {
            KeyCode::PageUp => session.scroll_by_pages(-1),
            KeyCode::PageDown => session.scroll_by_pages(1),
            KeyCode::Up => session.scroll_by(-1),
            KeyCode::Down => session.scroll_by(1),
            KeyCode::Home => session.scroll_to_top(),
            KeyCode::End => session.scroll_to_bottom(),
            _ => return false,
        }
        return true;
    }

    match key.code {
        KeyCode::F(5) => session.switch_to_alternate_buffer(),
        KeyCode::F(6) => session.switch_to_primary_buffer(),
        KeyCode::F(7) => session.reset(),
        KeyCode::F(8) => session.clear(),
        _ => return false,
    }
    true
}

/// What a cooked tty would echo for `data`
fn loopback(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    for ch in data.chars() {
        match ch {
            '\r' => out.push_str("\r\n"),
            '\x7f' => out.push_str("\x08 \x08"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_translates_enter_and_backspace() {
        assert_eq!(loopback("ab\r"), "ab\r\n");
        assert_eq!(loopback("x\x7f"), "x\x08 \x08");
    }

    #[test]
    fn test_console_pixels_include_scrollbar() {
        let config = SessionConfig {
            scrollbar_width: 12,
            ..SessionConfig::default()
        };
        assert_eq!(console_pixels(&config, 80, 24), (80 * 9 + 12, 24 * 17));
    }
}
