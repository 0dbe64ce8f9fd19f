//! Playback engine: paces rendered frames against the wall clock, paints
//! them at the cursor home, and keeps the status line on the bottom row.

use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};

use crate::config::PlayerConfig;
use crate::store::{CycleOutcome, FrameStore, StatusSnapshot, Tick};

/// The engine starts once a frame is ready or this much time has passed,
/// whichever comes first; starting early just means buffering briefly.
const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// Re-check interval while paused.
const PAUSE_POLL: Duration = Duration::from_millis(100);

const CONTROLS_LEGEND: &str = "Spc:Pause, +/-:Speed, L/R:Seek, U/D:Track, Q:Quit";
const FINISHED_LINE: &str = "Playback finished. Press UP/DOWN for next/prev, or Q to quit.";

/// Runs one cycle's playback to completion. Returns how the cycle ended; an
/// `Err` means the terminal itself rejected a write, which is fatal for the
/// cycle (the caller cancels and tears down).
pub fn run(
    store: &FrameStore,
    config: &PlayerConfig,
    out: &mut impl Write,
) -> Result<CycleOutcome> {
    store.wait_first_frame(STARTUP_GRACE);

    loop {
        match store.next_tick() {
            Tick::Cancelled => return Ok(store.take_outcome()),
            Tick::Finished => {
                if config.loop_playback {
                    return Ok(CycleOutcome::Finished);
                }
                draw_status(out, config.height, FINISHED_LINE)?;
                return Ok(store.wait_user_action());
            }
            Tick::Buffering { frame, total } => {
                let line = buffering_line(frame, total, config.fps);
                draw_status(out, config.height, &line)?;
                store.wait_ready(frame);
            }
            Tick::Paused(status) => {
                let line = status_line("PAUSED", &status, config.fps);
                draw_status(out, config.height, &line)?;
                store.sleep_cancellable(PAUSE_POLL);
            }
            Tick::Frame {
                index: _,
                bytes,
                status,
            } => {
                let started = Instant::now();
                let line = status_line("PLAYING", &status, config.fps);
                match bytes {
                    Some(bytes) if !bytes.is_empty() => {
                        queue!(out, MoveTo(0, 0)).context("failed to home the cursor")?;
                        out.write_all(&bytes).context("failed to write frame")?;
                        draw_status(out, config.height, &line)?;
                        let period = config.frame_period(status.speed);
                        store.sleep_cancellable(period.saturating_sub(started.elapsed()));
                    }
                    // Skipped frame: no paint, no sleep, but the status line
                    // still moves.
                    _ => draw_status(out, config.height, &line)?,
                }
            }
        }
    }
}

fn draw_status(out: &mut impl Write, row: u16, text: &str) -> Result<()> {
    queue!(
        out,
        MoveTo(0, row),
        Clear(ClearType::CurrentLine),
        Print(text)
    )
    .context("failed to draw status line")?;
    out.flush().context("failed to flush terminal output")
}

fn status_line(tag: &str, status: &StatusSnapshot, fps: f64) -> String {
    format!(
        "[{tag}] {} / {} | Speed: {:.2}x | {CONTROLS_LEGEND}",
        format_clock(status.frame, fps),
        format_total(status.total, fps),
        status.speed,
    )
}

fn buffering_line(frame: u64, total: u64, fps: f64) -> String {
    format!(
        "[BUFFERING] {} / {}...",
        format_clock(frame, fps),
        format_total(total, fps),
    )
}

/// `MM:SS` derived from frame index at the target rate.
fn format_clock(frame: u64, fps: f64) -> String {
    if fps <= 0.0 {
        return "00:00".to_owned();
    }
    let seconds = (frame as f64 / fps) as u64;
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn format_total(total: u64, fps: f64) -> String {
    if total == 0 {
        "??:??".to_owned()
    } else {
        format_clock(total, fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_zero_padded() {
        assert_eq!(format_clock(0, 15.0), "00:00");
        assert_eq!(format_clock(30, 15.0), "00:02");
        assert_eq!(format_clock(915, 15.0), "01:01");
        assert_eq!(format_clock(100, 0.0), "00:00");
    }

    #[test]
    fn last_frame_of_two_second_clip_reads_full_time() {
        // 2.0s at 15 fps: frame 30 of 30.
        assert_eq!(format_clock(30, 15.0), "00:02");
        assert_eq!(format_total(30, 15.0), "00:02");
    }

    #[test]
    fn unknown_total_shows_placeholder() {
        assert_eq!(format_total(0, 15.0), "??:??");
    }

    #[test]
    fn status_line_carries_all_fields() {
        let status = StatusSnapshot {
            frame: 30,
            total: 150,
            speed: 1.25,
        };
        let line = status_line("PLAYING", &status, 15.0);
        assert_eq!(
            line,
            "[PLAYING] 00:02 / 00:10 | Speed: 1.25x | Spc:Pause, +/-:Speed, L/R:Seek, U/D:Track, Q:Quit"
        );
    }

    #[test]
    fn buffering_line_shows_ellipsis() {
        assert_eq!(buffering_line(15, 0, 15.0), "[BUFFERING] 00:01 / ??:??...");
    }
}
