use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use telecine::config::{
    is_url, ColorMode, DitherMode, PlayerConfig, ScaleMode, SymbolSet, MAX_FPS,
};
use telecine::player;
use telecine::terminal;

#[derive(Debug, Parser)]
#[command(name = "telecine")]
#[command(version)]
#[command(about = "Play videos in the terminal via ffmpeg and chafa")]
struct Cli {
    /// Video file or URL to play. Local files share a playlist with the
    /// other videos in their directory.
    source: String,

    /// Extraction and playback frame rate.
    #[arg(long, default_value_t = 15.0)]
    fps: f64,

    /// How frames are scaled into the character grid.
    #[arg(long, value_enum, default_value_t = ScaleMode::Fit)]
    scale: ScaleMode,

    /// Converter color mode.
    #[arg(long, value_enum, default_value_t = ColorMode::TwoFiftySix)]
    colors: ColorMode,

    /// Converter dithering mode.
    #[arg(long, value_enum, default_value_t = DitherMode::Ordered)]
    dither: DitherMode,

    /// Converter symbol set.
    #[arg(long, value_enum, default_value_t = SymbolSet::Block)]
    symbols: SymbolSet,

    /// Display width in columns [default: terminal width].
    #[arg(long)]
    width: Option<u16>,

    /// Display height in rows [default: terminal height minus the status line].
    #[arg(long)]
    height: Option<u16>,

    /// Converter worker threads [default: logical CPU count].
    #[arg(long)]
    threads: Option<usize>,

    /// Seconds jumped per seek key press.
    #[arg(long, default_value_t = 5)]
    seek: u64,

    /// Replay the video when it ends instead of waiting for a track change.
    #[arg(long = "loop")]
    loop_playback: bool,

    /// Suppress the pre-playback info line.
    #[arg(long)]
    quiet: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(cli)?;
    player::run(config)
}

/// Startup validation happens here, in order: arguments, then the source,
/// then the external tools. All of it precedes raw terminal mode, so any
/// failure is an ordinary stderr line and a non-zero exit.
fn build_config(cli: Cli) -> Result<PlayerConfig> {
    if !cli.fps.is_finite() || cli.fps <= 0.0 {
        bail!("--fps must be a positive number");
    }
    let mut fps = cli.fps;
    if fps > MAX_FPS {
        log::warn!("requested fps {fps:.2} is high, capping extraction at {MAX_FPS:.0}");
        fps = MAX_FPS;
    }

    if !is_url(&cli.source) && !Path::new(&cli.source).exists() {
        bail!("video source '{}' was not found", cli.source);
    }

    for tool in ["ffmpeg", "ffprobe", "chafa"] {
        which::which(tool).with_context(|| {
            format!("dependency '{tool}' was not found on PATH; install it first")
        })?;
    }

    let (term_cols, term_rows) = terminal::display_dimensions();
    let width = cli.width.unwrap_or(term_cols).max(1);
    let height = cli.height.unwrap_or(term_rows).max(1);

    let workers = cli.threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    });
    if workers == 0 {
        bail!("--threads must be at least 1");
    }

    if cli.seek == 0 {
        bail!("--seek must be at least 1 second");
    }

    Ok(PlayerConfig {
        source: cli.source,
        fps,
        scale: cli.scale,
        colors: cli.colors,
        dither: cli.dither,
        symbols: cli.symbols,
        width,
        height,
        workers,
        seek_seconds: cli.seek,
        loop_playback: cli.loop_playback,
        quiet: cli.quiet,
    })
}
