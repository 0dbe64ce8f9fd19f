//! Decoder driver: one ffmpeg child per cycle, extracting pre-scaled JPEG
//! frames into the scratch directory at the target rate.

use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::config::{PlayerConfig, ScaleMode};
use crate::scratch::FRAME_OUTPUT_TEMPLATE;
use crate::store::FrameStore;

const SUPERVISOR_POLL: Duration = Duration::from_millis(50);
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// What the decoder left behind when it stopped.
#[derive(Debug)]
pub struct ExtractionReport {
    /// Exit status; `None` when the process could not be reaped.
    pub status: Option<std::process::ExitStatus>,
    /// Bounded tail of the decoder's own stderr.
    pub stderr_tail: String,
    /// True when the cycle's cancellation killed the process.
    pub killed: bool,
}

impl ExtractionReport {
    /// A non-zero exit that was not our own kill is worth surfacing.
    pub fn failed(&self) -> bool {
        !self.killed && !self.status.map(|s| s.success()).unwrap_or(false)
    }
}

pub struct FrameExtractor {
    supervisor: Option<JoinHandle<ExtractionReport>>,
}

impl FrameExtractor {
    /// Spawns the decoder and its supervisor. The supervisor kills the child
    /// on cycle cancellation, reaps it, then flips `extraction_complete` on
    /// the store so the dispatcher and engine can wind down.
    pub fn spawn(
        config: &PlayerConfig,
        frames_dir: &Path,
        store: Arc<FrameStore>,
    ) -> Result<Self> {
        let output_template = frames_dir.join(FRAME_OUTPUT_TEMPLATE);
        let args = ffmpeg_args(
            &config.source,
            config.fps,
            config.scale,
            config.pixel_box(),
            &output_template.to_string_lossy(),
        );

        let mut child = Command::new("ffmpeg")
            .args(args.iter().map(String::as_str))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    anyhow!("ffmpeg was not found on PATH. Install ffmpeg and verify `ffmpeg -version` works.")
                } else {
                    anyhow!("failed to spawn ffmpeg decoder: {error}")
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("failed to capture ffmpeg stderr"))?;
        let stderr_worker = thread::Builder::new()
            .name("telecine-extract-stderr".to_owned())
            .spawn(move || read_stderr_tail(stderr))
            .context("failed to spawn decoder stderr reader")?;

        let supervisor = thread::Builder::new()
            .name("telecine-extract".to_owned())
            .spawn(move || {
                let mut killed = false;
                let status = loop {
                    match child.try_wait() {
                        Ok(Some(status)) => break Some(status),
                        Ok(None) => {
                            if store.is_cancelled() {
                                let _ = child.kill();
                                killed = true;
                                break child.wait().ok();
                            }
                            store.sleep_cancellable(SUPERVISOR_POLL);
                        }
                        Err(error) => {
                            log::warn!("lost track of the ffmpeg decoder: {error}");
                            let _ = child.kill();
                            break child.wait().ok();
                        }
                    }
                };
                let stderr_tail = stderr_worker.join().unwrap_or_default();
                store.mark_extraction_complete();
                ExtractionReport {
                    status,
                    stderr_tail,
                    killed,
                }
            })
            .context("failed to spawn decoder supervisor thread")?;

        Ok(Self {
            supervisor: Some(supervisor),
        })
    }

    /// Joins the supervisor and returns what the decoder left behind.
    pub fn finish(mut self) -> ExtractionReport {
        match self.supervisor.take().map(JoinHandle::join) {
            Some(Ok(report)) => report,
            _ => ExtractionReport {
                status: None,
                stderr_tail: "decoder supervisor thread panicked".to_owned(),
                killed: false,
            },
        }
    }
}

fn ffmpeg_args(
    source: &str,
    fps: f64,
    scale: ScaleMode,
    pixel_box: (u32, u32),
    output_template: &str,
) -> Vec<String> {
    vec![
        "-nostdin".to_owned(),
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "warning".to_owned(),
        "-i".to_owned(),
        source.to_owned(),
        "-vf".to_owned(),
        format!("fps={:.2},{}", fps, scale_clause(scale, pixel_box)),
        "-q:v".to_owned(),
        "2".to_owned(),
        output_template.to_owned(),
    ]
}

/// Scale filter per mode against the `cols*8 x rows*16` pixel box.
fn scale_clause(mode: ScaleMode, (width, height): (u32, u32)) -> String {
    match mode {
        ScaleMode::Fit => {
            format!("scale={width}:{height}:force_original_aspect_ratio=decrease")
        }
        ScaleMode::Fill => format!(
            "scale={width}:{height}:force_original_aspect_ratio=increase,crop={width}:{height}"
        ),
        ScaleMode::Stretch => format!("scale={width}:{height}"),
    }
}

fn read_stderr_tail(mut stderr: impl Read) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        match stderr.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => {
                tail.extend_from_slice(&chunk[..read]);
                if tail.len() > 2 * STDERR_TAIL_BYTES {
                    let cut = tail.len() - STDERR_TAIL_BYTES;
                    tail.drain(..cut);
                }
            }
            Err(_) => break,
        }
    }
    if tail.len() > STDERR_TAIL_BYTES {
        let cut = tail.len() - STDERR_TAIL_BYTES;
        tail.drain(..cut);
    }
    String::from_utf8_lossy(&tail).trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_mode_preserves_aspect_within_box() {
        assert_eq!(
            scale_clause(ScaleMode::Fit, (640, 384)),
            "scale=640:384:force_original_aspect_ratio=decrease"
        );
    }

    #[test]
    fn fill_mode_covers_then_crops() {
        assert_eq!(
            scale_clause(ScaleMode::Fill, (640, 384)),
            "scale=640:384:force_original_aspect_ratio=increase,crop=640:384"
        );
    }

    #[test]
    fn stretch_mode_scales_exactly() {
        assert_eq!(scale_clause(ScaleMode::Stretch, (640, 384)), "scale=640:384");
    }

    #[test]
    fn decoder_invocation_shape() {
        let args = ffmpeg_args(
            "movie.mp4",
            15.0,
            ScaleMode::Fit,
            (640, 384),
            "/tmp/x/frames/frame-%05d.jpg",
        );
        assert_eq!(args[0], "-nostdin");
        assert_eq!(&args[1..4], ["-hide_banner", "-loglevel", "warning"]);
        assert_eq!(&args[4..6], ["-i", "movie.mp4"]);
        assert_eq!(args[6], "-vf");
        assert_eq!(
            args[7],
            "fps=15.00,scale=640:384:force_original_aspect_ratio=decrease"
        );
        assert_eq!(&args[8..10], ["-q:v", "2"]);
        assert_eq!(args[10], "/tmp/x/frames/frame-%05d.jpg");
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let noise = vec![b'x'; 100 * 1024];
        let tail = read_stderr_tail(noise.as_slice());
        assert!(tail.len() <= STDERR_TAIL_BYTES);
        assert!(tail.ends_with('x'));
    }

    #[test]
    fn report_failure_classification() {
        let killed = ExtractionReport {
            status: None,
            stderr_tail: String::new(),
            killed: true,
        };
        assert!(!killed.failed());

        let unreaped = ExtractionReport {
            status: None,
            stderr_tail: String::new(),
            killed: false,
        };
        assert!(unreaped.failed());
    }
}
