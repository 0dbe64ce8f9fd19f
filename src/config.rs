use std::time::Duration;

use clap::ValueEnum;

/// Approximate pixel footprint of one terminal character cell. The decoder is
/// told to pre-scale frames to `cols * 8` by `rows * 16` pixels so the
/// converter never chews on more input than the character grid can show.
pub const CHAR_PIXEL_WIDTH: u32 = 8;
pub const CHAR_PIXEL_HEIGHT: u32 = 16;

/// Extraction rates above this are capped (with a warning) before the decoder
/// is ever started.
pub const MAX_FPS: f64 = 60.0;

/// Playback rate multipliers, selected by `+`/`-` during playback.
pub const SPEED_LADDER: [f64; 7] = [0.25, 0.50, 0.75, 1.00, 1.25, 1.50, 2.00];

/// Index into [`SPEED_LADDER`] for 1.00x, the starting speed.
pub const DEFAULT_SPEED_INDEX: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScaleMode {
    /// Preserve aspect ratio, fit within the target box.
    Fit,
    /// Preserve aspect ratio, cover the box, crop center.
    Fill,
    /// Ignore aspect ratio, scale to the exact box.
    Stretch,
}

impl ScaleMode {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Fill => "fill",
            Self::Stretch => "stretch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    #[value(name = "2")]
    Two,
    #[value(name = "16")]
    Sixteen,
    #[value(name = "256")]
    TwoFiftySix,
    #[value(name = "full")]
    Full,
}

impl ColorMode {
    /// The exact string the converter's `--colors` flag takes.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Two => "2",
            Self::Sixteen => "16",
            Self::TwoFiftySix => "256",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DitherMode {
    None,
    Ordered,
    Diffusion,
}

impl DitherMode {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ordered => "ordered",
            Self::Diffusion => "diffusion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SymbolSet {
    Block,
    Ascii,
    Space,
}

impl SymbolSet {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Ascii => "ascii",
            Self::Space => "space",
        }
    }
}

/// Fully resolved playback configuration. Built once at startup from the CLI
/// and terminal dimensions; read-only afterwards.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub source: String,
    pub fps: f64,
    pub scale: ScaleMode,
    pub colors: ColorMode,
    pub dither: DitherMode,
    pub symbols: SymbolSet,
    /// Display width in character columns.
    pub width: u16,
    /// Display height in character rows; the row below it holds the status line.
    pub height: u16,
    pub workers: usize,
    pub seek_seconds: u64,
    pub loop_playback: bool,
    pub quiet: bool,
}

impl PlayerConfig {
    /// Pixel box handed to the decoder's scale filter.
    pub fn pixel_box(&self) -> (u32, u32) {
        (
            u32::from(self.width) * CHAR_PIXEL_WIDTH,
            u32::from(self.height) * CHAR_PIXEL_HEIGHT,
        )
    }

    /// How many frames one seek key press jumps.
    pub fn seek_frames(&self) -> u64 {
        ((self.seek_seconds as f64 * self.fps).round() as u64).max(1)
    }

    /// Wall-clock budget for one frame at the given speed multiplier.
    pub fn frame_period(&self, speed: f64) -> Duration {
        Duration::from_secs_f64(1.0 / (self.fps * speed))
    }
}

/// Sources the decoder fetches itself are passed through without a local
/// existence check.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_keywords_match_tool_vocabulary() {
        assert_eq!(ScaleMode::Fill.keyword(), "fill");
        assert_eq!(ColorMode::TwoFiftySix.keyword(), "256");
        assert_eq!(ColorMode::Full.keyword(), "full");
        assert_eq!(DitherMode::Diffusion.keyword(), "diffusion");
        assert_eq!(SymbolSet::Block.keyword(), "block");
    }

    #[test]
    fn speed_ladder_starts_at_unity() {
        assert_eq!(SPEED_LADDER.len(), 7);
        assert_eq!(SPEED_LADDER[DEFAULT_SPEED_INDEX], 1.00);
        assert_eq!(SPEED_LADDER[0], 0.25);
        assert_eq!(SPEED_LADDER[6], 2.00);
    }

    fn config() -> PlayerConfig {
        PlayerConfig {
            source: "movie.mp4".to_owned(),
            fps: 15.0,
            scale: ScaleMode::Fit,
            colors: ColorMode::TwoFiftySix,
            dither: DitherMode::Ordered,
            symbols: SymbolSet::Block,
            width: 80,
            height: 23,
            workers: 4,
            seek_seconds: 5,
            loop_playback: false,
            quiet: false,
        }
    }

    #[test]
    fn pixel_box_uses_character_cell_estimate() {
        assert_eq!(config().pixel_box(), (640, 368));
    }

    #[test]
    fn seek_frames_scales_with_fps() {
        assert_eq!(config().seek_frames(), 75);
        let mut slow = config();
        slow.fps = 0.1;
        slow.seek_seconds = 1;
        assert_eq!(slow.seek_frames(), 1);
    }

    #[test]
    fn frame_period_shrinks_with_speed() {
        let cfg = config();
        let base = cfg.frame_period(1.0);
        let double = cfg.frame_period(2.0);
        assert_eq!(base, Duration::from_secs_f64(1.0 / 15.0));
        assert!(double < base);
    }

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/clip.mp4"));
        assert!(is_url("http://example.com/clip.mp4"));
        assert!(!is_url("/home/user/clip.mp4"));
        assert!(!is_url("clip.mp4"));
    }
}
