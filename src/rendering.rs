//! Converter pool: a dispatcher walks frame indices in order, waiting for
//! each image artifact to appear on disk, and feeds a fixed pool of workers
//! that each run chafa synchronously and store the rendered bytes.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::config::{ColorMode, DitherMode, PlayerConfig, SymbolSet};
use crate::scratch::frame_file_name;
use crate::store::FrameStore;

const DISK_POLL: Duration = Duration::from_millis(10);
const JOB_QUEUE_DEPTH: usize = 100;

#[derive(Debug, Clone)]
struct RenderJob {
    index: u64,
    path: PathBuf,
}

/// Converter flags resolved once per cycle.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub cols: u16,
    pub rows: u16,
    pub symbols: SymbolSet,
    pub colors: ColorMode,
    pub dither: DitherMode,
    pub workers: usize,
}

impl RenderOptions {
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self {
            cols: config.width,
            rows: config.height,
            symbols: config.symbols,
            colors: config.colors,
            dither: config.dither,
            workers: config.workers.max(1),
        }
    }
}

pub struct RenderPipeline {
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl RenderPipeline {
    pub fn spawn(
        frames_dir: PathBuf,
        options: RenderOptions,
        store: Arc<FrameStore>,
    ) -> Result<Self> {
        let (sender, receiver) = bounded::<RenderJob>(JOB_QUEUE_DEPTH);

        let mut workers = Vec::with_capacity(options.workers);
        let chafa_args = Arc::new(chafa_args(&options));
        for worker_index in 0..options.workers {
            let receiver = receiver.clone();
            let store = store.clone();
            let chafa_args = chafa_args.clone();
            let handle = thread::Builder::new()
                .name(format!("telecine-render-{worker_index}"))
                .spawn(move || worker_loop(&receiver, &store, &chafa_args))
                .context("failed to spawn converter worker thread")?;
            workers.push(handle);
        }
        drop(receiver);

        let dispatcher = thread::Builder::new()
            .name("telecine-dispatch".to_owned())
            .spawn(move || dispatcher_loop(&frames_dir, &sender, &store))
            .context("failed to spawn dispatcher thread")?;

        Ok(Self {
            dispatcher: Some(dispatcher),
            workers,
        })
    }

    /// Joins the dispatcher and every worker. Call after cancelling the cycle
    /// or once playback has ended; both drain promptly.
    pub fn join(mut self) {
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Walks indices from 1 upward. Each index waits for store room (bounded
/// window) and for the artifact to exist, then goes to the pool. Stops when
/// extraction has completed and the next artifact never appeared, or on
/// cancellation. Dropping the sender closes the queue behind the workers.
fn dispatcher_loop(frames_dir: &std::path::Path, sender: &Sender<RenderJob>, store: &FrameStore) {
    let mut next: u64 = 1;
    loop {
        if !store.wait_room(next) {
            break;
        }
        let path = frames_dir.join(frame_file_name(next));
        if path.is_file() {
            store.note_dispatched(next);
            if sender
                .send(RenderJob { index: next, path })
                .is_err()
            {
                break;
            }
            next += 1;
        } else if store.extraction_complete() {
            // The decoder may have written this frame between the existence
            // check and the completion check; look once more before stopping.
            if path.is_file() {
                continue;
            }
            break;
        } else if !store.sleep_cancellable(DISK_POLL) {
            break;
        }
    }
    store.mark_dispatch_complete();
}

/// Receives jobs until the queue closes. After cancellation the loop keeps
/// draining so a dispatcher blocked on a full queue can always exit.
fn worker_loop(receiver: &Receiver<RenderJob>, store: &FrameStore, chafa_args: &[String]) {
    while let Ok(job) = receiver.recv() {
        if store.is_cancelled() {
            continue;
        }
        let bytes = match render_frame(&job, chafa_args) {
            Ok(bytes) => bytes,
            Err(error) => {
                if !store.is_cancelled() {
                    log::warn!("chafa failed for frame {}: {error:#}", job.index);
                }
                Vec::new()
            }
        };
        store.put(job.index, bytes);
    }
}

fn render_frame(job: &RenderJob, chafa_args: &[String]) -> Result<Vec<u8>> {
    let output = Command::new("chafa")
        .args(chafa_args.iter().map(String::as_str))
        .arg(&job.path)
        .output()
        .context("failed to run chafa")?;
    if !output.status.success() {
        anyhow::bail!(
            "chafa exited with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(normalize_line_endings(output.stdout))
}

fn chafa_args(options: &RenderOptions) -> Vec<String> {
    vec![
        "--size".to_owned(),
        format!("{}x{}", options.cols, options.rows),
        "--symbols".to_owned(),
        options.symbols.keyword().to_owned(),
        "--colors".to_owned(),
        options.colors.keyword().to_owned(),
        "--dither".to_owned(),
        options.dither.keyword().to_owned(),
    ]
}

/// The terminal runs in raw mode, where bare LF moves down without returning
/// the carriage; rewrite LF to CRLF, leaving existing CRLF pairs alone.
fn normalize_line_endings(bytes: Vec<u8>) -> Vec<u8> {
    let mut normalized = Vec::with_capacity(bytes.len() + bytes.len() / 16);
    let mut previous = 0_u8;
    for byte in bytes {
        if byte == b'\n' && previous != b'\r' {
            normalized.push(b'\r');
        }
        normalized.push(byte);
        previous = byte;
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColorMode, DitherMode, SymbolSet};

    fn options() -> RenderOptions {
        RenderOptions {
            cols: 80,
            rows: 23,
            symbols: SymbolSet::Block,
            colors: ColorMode::TwoFiftySix,
            dither: DitherMode::Ordered,
            workers: 4,
        }
    }

    #[test]
    fn converter_invocation_shape() {
        assert_eq!(
            chafa_args(&options()),
            [
                "--size", "80x23", "--symbols", "block", "--colors", "256", "--dither",
                "ordered"
            ]
        );
    }

    #[test]
    fn bare_lf_becomes_crlf() {
        assert_eq!(
            normalize_line_endings(b"row1\nrow2\n".to_vec()),
            b"row1\r\nrow2\r\n"
        );
    }

    #[test]
    fn existing_crlf_is_untouched() {
        assert_eq!(
            normalize_line_endings(b"row1\r\nrow2\r\n".to_vec()),
            b"row1\r\nrow2\r\n"
        );
    }

    #[test]
    fn escape_bytes_pass_through() {
        let input = b"\x1b[38;5;196mX\x1b[0m\n".to_vec();
        assert_eq!(
            normalize_line_endings(input),
            b"\x1b[38;5;196mX\x1b[0m\r\n"
        );
    }
}
