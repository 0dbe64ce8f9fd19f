//! The process-lifetime input reader. A single thread polls terminal events
//! in raw mode and applies them to whichever cycle is currently active: state
//! toggles happen under the store lock, track-change and quit keys cancel the
//! running cycle. The thread outlives cycles and exits with the session.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::player::Session;
use crate::store::{FrameStore, TrackAction};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct InputReader {
    handle: Option<JoinHandle<()>>,
}

impl InputReader {
    pub fn spawn(session: Arc<Session>, seek_frames: u64) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("telecine-input".to_owned())
            .spawn(move || reader_loop(&session, seek_frames))
            .context("failed to spawn input reader thread")?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Joins the reader. Call only after the session shutdown flag is set;
    /// the poll interval bounds how long the join can take.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn reader_loop(session: &Session, seek_frames: u64) {
    loop {
        if session.is_shutdown() {
            return;
        }
        match event::poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(error) => {
                log::debug!("input poll failed, stopping reader: {error}");
                return;
            }
        }
        let key = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
            Ok(_) => continue,
            Err(error) => {
                log::debug!("input read failed, stopping reader: {error}");
                return;
            }
        };
        let Some(store) = session.active_store() else {
            continue;
        };
        apply_key(session, &store, key, seek_frames);
    }
}

fn apply_key(session: &Session, store: &FrameStore, key: KeyEvent, seek_frames: u64) {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            session.request_shutdown();
            store.cancel_with_action(TrackAction::Quit);
        }
        KeyCode::Char('q') => {
            session.request_shutdown();
            store.cancel_with_action(TrackAction::Quit);
        }
        KeyCode::Char(' ') => store.toggle_pause(),
        KeyCode::Char('+') => store.speed_up(),
        KeyCode::Char('-') => store.speed_down(),
        KeyCode::Up => store.cancel_with_action(TrackAction::Prev),
        KeyCode::Down => store.cancel_with_action(TrackAction::Next),
        KeyCode::Right => store.seek_forward(seek_frames),
        KeyCode::Left => store.seek_backward(seek_frames),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CycleOutcome;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn fixture() -> (Arc<Session>, Arc<FrameStore>) {
        let session = Arc::new(Session::new());
        let store = Arc::new(FrameStore::new(150, 75));
        session.set_active(store.clone());
        (session, store)
    }

    #[test]
    fn space_toggles_pause() {
        let (session, store) = fixture();
        apply_key(&session, &store, press(KeyCode::Char(' ')), 75);
        assert!(store.is_paused());
        apply_key(&session, &store, press(KeyCode::Char(' ')), 75);
        assert!(!store.is_paused());
    }

    #[test]
    fn plus_and_minus_walk_the_ladder() {
        let (session, store) = fixture();
        apply_key(&session, &store, press(KeyCode::Char('+')), 75);
        assert_eq!(store.speed_index(), 4);
        apply_key(&session, &store, press(KeyCode::Char('-')), 75);
        apply_key(&session, &store, press(KeyCode::Char('-')), 75);
        assert_eq!(store.speed_index(), 2);
    }

    #[test]
    fn arrows_seek_by_the_configured_window() {
        let (session, store) = fixture();
        apply_key(&session, &store, press(KeyCode::Right), 75);
        assert_eq!(store.current_frame(), 76);
        apply_key(&session, &store, press(KeyCode::Left), 75);
        assert_eq!(store.current_frame(), 1);
    }

    #[test]
    fn quit_key_cancels_and_shuts_down() {
        let (session, store) = fixture();
        apply_key(&session, &store, press(KeyCode::Char('q')), 75);
        assert!(session.is_shutdown());
        assert!(store.is_cancelled());
        assert_eq!(store.take_outcome(), CycleOutcome::Quit);
    }

    #[test]
    fn ctrl_c_acts_like_quit() {
        let (session, store) = fixture();
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        apply_key(&session, &store, key, 75);
        assert!(session.is_shutdown());
        assert_eq!(store.take_outcome(), CycleOutcome::Quit);
    }

    #[test]
    fn track_keys_cancel_with_direction() {
        let (session, store) = fixture();
        apply_key(&session, &store, press(KeyCode::Down), 75);
        assert!(store.is_cancelled());
        assert_eq!(store.take_outcome(), CycleOutcome::Next);
        assert!(!session.is_shutdown());

        let store = Arc::new(FrameStore::new(150, 75));
        session.set_active(store.clone());
        apply_key(&session, &store, press(KeyCode::Up), 75);
        assert_eq!(store.take_outcome(), CycleOutcome::Prev);
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        let (session, store) = fixture();
        apply_key(&session, &store, press(KeyCode::Char('x')), 75);
        apply_key(&session, &store, press(KeyCode::Enter), 75);
        assert!(!store.is_cancelled());
        assert!(!store.is_paused());
        assert_eq!(store.current_frame(), 1);
    }
}
