//! Terminal lifecycle: raw mode + alternate screen + hidden cursor for the
//! whole process, with an idempotent restore that runs on drop, on panic and
//! on the signal path. No exit path may leave the terminal raw.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK: Once = Once::new();

/// Holds the terminal in playback mode. Dropping it restores the terminal;
/// so does a panic or [`restore_terminal`] called from any other path.
#[derive(Debug)]
pub struct TerminalSession {
    _private: (),
}

impl TerminalSession {
    pub fn enter() -> Result<Self> {
        enable_raw_mode().context("failed to enter raw terminal mode")?;
        if let Err(error) = execute!(
            io::stdout(),
            EnterAlternateScreen,
            Hide,
            Clear(ClearType::All)
        ) {
            let _ = disable_raw_mode();
            return Err(error).context("failed to switch to the alternate screen");
        }
        SESSION_ACTIVE.store(true, Ordering::SeqCst);
        install_panic_hook();
        Ok(Self { _private: () })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        restore_terminal();
    }
}

/// Idempotent: the first caller wins, later calls are no-ops.
pub fn restore_terminal() {
    if SESSION_ACTIVE.swap(false, Ordering::SeqCst) {
        let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
        let _ = disable_raw_mode();
    }
}

fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            restore_terminal();
            previous(info);
        }));
    });
}

/// Character grid available for playback, defaulting to 80x24 when the size
/// cannot be probed. One row is reserved for the status line.
pub fn display_dimensions() -> (u16, u16) {
    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    (cols, rows.saturating_sub(1).max(1))
}
