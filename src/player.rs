//! The control plane: one session spanning the whole process, one cycle per
//! video. A cycle owns its scratch directory, decoder, converter pool and
//! frame store; cancelling the cycle stops all of them without touching the
//! input reader or the terminal session.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};

use crate::config::PlayerConfig;
use crate::decoding::FrameExtractor;
use crate::input::InputReader;
use crate::playback;
use crate::playlist::{Direction, Playlist};
use crate::probe;
use crate::rendering::{RenderOptions, RenderPipeline};
use crate::scratch::{self, ScratchDir};
use crate::store::{CycleOutcome, FrameStore, TrackAction};
use crate::terminal::TerminalSession;

/// Process-wide state shared with the input reader and the signal handler.
pub struct Session {
    shutdown: AtomicBool,
    active: Mutex<Option<Arc<FrameStore>>>,
    /// Operator-facing messages held back until the terminal is restored.
    deferred: Mutex<Vec<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            active: Mutex::new(None),
            deferred: Mutex::new(Vec::new()),
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, store: Arc<FrameStore>) {
        *lock(&self.active) = Some(store);
    }

    pub fn clear_active(&self) {
        *lock(&self.active) = None;
    }

    pub fn active_store(&self) -> Option<Arc<FrameStore>> {
        lock(&self.active).clone()
    }

    pub fn defer_message(&self, message: String) {
        lock(&self.deferred).push(message);
    }

    fn drain_messages(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.deferred))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Plays the playlist until the user quits or the last natural finish. The
/// terminal enters raw mode here and is restored before this returns, on
/// every path.
pub fn run(config: PlayerConfig) -> Result<()> {
    scratch::probe_writable()?;
    let mut playlist = Playlist::scan(&config.source)?;

    if !config.quiet {
        println!(
            "Playing {} ({} in playlist) | fps={:.0} size={}x{} threads={}",
            config.source,
            playlist.len(),
            config.fps,
            config.width,
            config.height,
            config.workers,
        );
    }

    let session = Arc::new(Session::new());
    {
        let session = session.clone();
        ctrlc::set_handler(move || {
            session.request_shutdown();
            if let Some(store) = session.active_store() {
                store.cancel_with_action(TrackAction::Quit);
            }
        })
        .context("failed to install signal handler")?;
    }

    let terminal = TerminalSession::enter()?;
    let input = InputReader::spawn(session.clone(), config.seek_frames())?;

    let run_result = (|| -> Result<()> {
        loop {
            let outcome = play_cycle(&config, &session, playlist.current())?;
            session.clear_active();
            match outcome {
                CycleOutcome::Finished => {} // loop flag: same video again
                CycleOutcome::Next => playlist.advance(Direction::Next),
                CycleOutcome::Prev => playlist.advance(Direction::Prev),
                CycleOutcome::Quit => return Ok(()),
            }
            if session.is_shutdown() {
                return Ok(());
            }
        }
    })();

    session.request_shutdown();
    drop(terminal);
    input.join();

    println!("Playback finished.");
    for message in session.drain_messages() {
        eprintln!("{message}");
    }

    run_result
}

/// One full cycle: scratch, probe, decoder, converter pool, playback engine,
/// teardown. Everything spawned here is joined here.
fn play_cycle(
    config: &PlayerConfig,
    session: &Arc<Session>,
    source: &str,
) -> Result<CycleOutcome> {
    let scratch = ScratchDir::create()?;
    let mut cycle_config = config.clone();
    cycle_config.source = source.to_owned();

    let total_frames = match probe::probe_media(source, config.fps) {
        Ok(info) => info.total_frames,
        Err(error) => {
            log::warn!("could not determine duration for {source}: {error:#}");
            0
        }
    };

    let store = Arc::new(FrameStore::new(total_frames, config.seek_frames()));
    session.set_active(store.clone());

    let extractor =
        match FrameExtractor::spawn(&cycle_config, scratch.frames_dir(), store.clone()) {
            Ok(extractor) => extractor,
            Err(error) => {
                session
                    .defer_message(format!("Could not start the decoder for {source}: {error:#}"));
                session.request_shutdown();
                return Ok(CycleOutcome::Quit);
            }
        };

    let pipeline = match RenderPipeline::spawn(
        scratch.frames_dir().to_path_buf(),
        RenderOptions::from_config(config),
        store.clone(),
    ) {
        Ok(pipeline) => pipeline,
        Err(error) => {
            store.cancel();
            let _ = extractor.finish();
            return Err(error);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let outcome = match playback::run(&store, &cycle_config, &mut out) {
        Ok(outcome) => outcome,
        Err(error) => {
            session.defer_message(format!("Terminal output failed: {error:#}"));
            session.request_shutdown();
            store.take_outcome()
        }
    };
    drop(out);

    // Stop whatever is still running, then collect every thread.
    store.cancel();
    let report = extractor.finish();
    pipeline.join();

    if report.failed() {
        let mut message = format!("The decoder exited abnormally on {source}");
        if let Some(status) = report.status {
            message.push_str(&format!(" ({status})"));
        }
        if !report.stderr_tail.is_empty() {
            message.push_str(":\n");
            message.push_str(&report.stderr_tail);
        }
        session.defer_message(message);
    }
    if store.last_rendered() == 0 && store.total_frames() == 0 && !report.killed {
        session.defer_message(format!("No frames were extracted from {source}."));
    }

    Ok(outcome)
}
