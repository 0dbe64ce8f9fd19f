//! telecine: a terminal video player.
//!
//! The pipeline runs three stages per video: ffmpeg extracts pre-scaled
//! frames into scratch storage, a pool of chafa workers renders each frame
//! to ANSI text, and the playback engine paces the result against the wall
//! clock under interactive control.

pub mod config;
pub mod decoding;
pub mod input;
pub mod playback;
pub mod player;
pub mod playlist;
pub mod probe;
pub mod rendering;
pub mod scratch;
pub mod store;
pub mod terminal;
