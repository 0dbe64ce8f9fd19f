use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Template handed to the decoder; [`frame_file_name`] must produce the names
/// it expands to.
pub const FRAME_OUTPUT_TEMPLATE: &str = "frame-%05d.jpg";

const SHM_DIR: &str = "/dev/shm";

/// Name of the image artifact for a 1-based frame index.
pub fn frame_file_name(index: u64) -> String {
    format!("frame-{index:05}.jpg")
}

/// Per-cycle scratch storage. The directory (mode 0700) and everything under
/// it is removed when the value drops, which covers cycle end, error returns
/// and unwinding alike.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
    frames: PathBuf,
}

impl ScratchDir {
    pub fn create() -> Result<Self> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("telecine.");
            b
        };
        let dir = match preferred_base() {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .context("failed to create scratch directory")?;

        let frames = dir.path().join("frames");
        fs::create_dir(&frames).with_context(|| {
            format!("failed to create frame directory {}", frames.display())
        })?;

        Ok(Self { dir, frames })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the decoder writes and the converter pool reads image artifacts.
    pub fn frames_dir(&self) -> &Path {
        &self.frames
    }
}

/// Startup probe: creating and dropping one scratch directory proves the
/// scratch location is usable before the terminal is put into raw mode.
pub fn probe_writable() -> Result<()> {
    ScratchDir::create().map(|_| ())
}

/// Memory-backed temp is preferred when it exists and is actually writable.
fn preferred_base() -> Option<PathBuf> {
    let shm = Path::new(SHM_DIR);
    if !shm.is_dir() {
        return None;
    }
    let probe = shm.join(format!(".telecine-probe-{}", std::process::id()));
    match fs::File::create(&probe) {
        Ok(file) => {
            drop(file);
            let _ = fs::remove_file(&probe);
            Some(shm.to_path_buf())
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_names_match_decoder_template() {
        assert_eq!(frame_file_name(1), "frame-00001.jpg");
        assert_eq!(frame_file_name(42), "frame-00042.jpg");
        assert_eq!(frame_file_name(123456), "frame-123456.jpg");
        // The %05d template zero-pads to the same width.
        assert_eq!(FRAME_OUTPUT_TEMPLATE.replace("%05d", "00007"), frame_file_name(7));
    }

    #[test]
    fn scratch_directory_is_removed_on_drop() {
        let scratch = ScratchDir::create().expect("scratch should create");
        let root = scratch.path().to_path_buf();
        let frames = scratch.frames_dir().to_path_buf();
        assert!(root.is_dir());
        assert!(frames.is_dir());
        drop(scratch);
        assert!(!root.exists());
    }

    #[test]
    fn probe_succeeds_on_a_normal_system() {
        probe_writable().expect("scratch probe should succeed");
    }
}
