use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::config::is_url;

/// Extensions considered playable when scanning the source's directory.
pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "mov", "avi", "webm", "flv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// The videos sharing the invoking source's directory, lexicographically
/// sorted, plus a wrapping cursor. URL sources play as a one-entry playlist.
#[derive(Debug, Clone)]
pub struct Playlist {
    entries: Vec<String>,
    cursor: usize,
}

impl Playlist {
    pub fn scan(source: &str) -> Result<Self> {
        if is_url(source) {
            return Ok(Self {
                entries: vec![source.to_owned()],
                cursor: 0,
            });
        }

        let path = Path::new(source);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut entries = Vec::new();
        let listing = std::fs::read_dir(dir)
            .with_context(|| format!("failed to scan directory {}", dir.display()))?;
        for entry in listing {
            let entry = entry.with_context(|| format!("failed to scan {}", dir.display()))?;
            let entry_path = entry.path();
            if !entry_path.is_file() {
                continue;
            }
            if has_video_extension(&entry_path) {
                entries.push(entry_path.to_string_lossy().into_owned());
            }
        }
        entries.sort();

        if entries.is_empty() {
            bail!("no playable videos found in {}", dir.display());
        }

        let cursor = match position_of(&entries, path) {
            Some(index) => index,
            // The source itself may carry an extension outside the scan set;
            // it still plays, alone.
            None => {
                return Ok(Self {
                    entries: vec![source.to_owned()],
                    cursor: 0,
                });
            }
        };

        Ok(Self { entries, cursor })
    }

    pub fn current(&self) -> &str {
        &self.entries[self.cursor]
    }

    pub fn advance(&mut self, direction: Direction) {
        let len = self.entries.len();
        self.cursor = match direction {
            Direction::Next => (self.cursor + 1) % len,
            Direction::Prev => (self.cursor + len - 1) % len,
        };
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn has_video_extension(path: &Path) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_ascii_lowercase();
    VIDEO_EXTENSIONS.contains(&ext.as_str())
}

fn position_of(entries: &[String], source: &Path) -> Option<usize> {
    let canonical = source.canonicalize().ok();
    entries.iter().position(|entry| {
        let entry_path = Path::new(entry);
        if entry_path == source {
            return true;
        }
        match (&canonical, entry_path.canonicalize().ok()) {
            (Some(a), Some(b)) => *a == b,
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).expect("fixture file should create");
    }

    #[test]
    fn scan_filters_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        touch(dir.path(), "b.mkv");
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "z.webm");
        touch(dir.path(), "cover.jpg");

        let source = dir.path().join("b.mkv");
        let playlist =
            Playlist::scan(&source.to_string_lossy()).expect("playlist should scan");
        assert_eq!(playlist.len(), 3);
        assert!(playlist.current().ends_with("b.mkv"));
    }

    #[test]
    fn cursor_wraps_both_directions() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "b.mp4");
        touch(dir.path(), "c.mp4");

        let source = dir.path().join("c.mp4");
        let mut playlist =
            Playlist::scan(&source.to_string_lossy()).expect("playlist should scan");
        assert!(playlist.current().ends_with("c.mp4"));

        playlist.advance(Direction::Next);
        assert!(playlist.current().ends_with("a.mp4"));
        playlist.advance(Direction::Prev);
        assert!(playlist.current().ends_with("c.mp4"));
        playlist.advance(Direction::Prev);
        assert!(playlist.current().ends_with("b.mp4"));
    }

    #[test]
    fn url_source_plays_alone() {
        let playlist =
            Playlist::scan("https://example.com/stream.mp4").expect("URL playlist");
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist.current(), "https://example.com/stream.mp4");
    }

    #[test]
    fn unlisted_extension_falls_back_to_single_entry() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "clip.ts");

        let source = dir.path().join("clip.ts");
        let playlist =
            Playlist::scan(&source.to_string_lossy()).expect("playlist should scan");
        assert_eq!(playlist.len(), 1);
        assert!(playlist.current().ends_with("clip.ts"));
    }

    #[test]
    fn directory_without_videos_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        touch(dir.path(), "readme.md");
        let source = dir.path().join("missing.mp4");
        assert!(Playlist::scan(&source.to_string_lossy()).is_err());
    }

    #[test]
    fn extension_matching_is_case_insensitive() {
        assert!(has_video_extension(Path::new("A.MP4")));
        assert!(has_video_extension(Path::new("b.WebM")));
        assert!(!has_video_extension(Path::new("c.txt")));
        assert!(!has_video_extension(Path::new("noext")));
    }
}
