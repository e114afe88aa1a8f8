use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "riftroll",
    author,
    version,
    about = "Scrolling piano-roll visualizer for MIDI files",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// MIDI file to play.
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Configuration file; defaults to `$RIFTROLL_CONFIG` or the user config directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, global = true)]
    pub size: Option<(u32, u32)>,

    /// Target frame rate of the window.
    #[arg(long, value_name = "FPS", value_parser = parse_fps)]
    pub fps: Option<u32>,

    /// Longest rest (seconds) still drawn as one connected trace.
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds, global = true)]
    pub join_gap: Option<f64>,

    /// Close the window once the piece has scrolled off screen.
    #[arg(long)]
    pub exit_at_end: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a summary of a MIDI file: duration, note range, tracks and lines.
    Inspect(InspectArgs),
    /// Print the per-track note events of a MIDI file as JSON.
    Notes(NotesArgs),
    /// Print the effective configuration as TOML.
    Config(ConfigArgs),
    /// Render a single frame to a PNG file without opening a window.
    Snapshot(SnapshotArgs),
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct NotesArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Indent the JSON output.
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Playback time of the frame.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0, value_parser = parse_seconds)]
    pub at: f64,

    /// PNG file to write.
    #[arg(long, short, value_name = "PATH")]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print only the path the configuration was read from.
    #[arg(long)]
    pub path: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| format!("expected WxH format, e.g. 1280x720, got '{trimmed}'"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in size '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in size '{trimmed}'"))?;

    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_fps(value: &str) -> Result<u32, String> {
    let fps: u32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid frame rate '{value}'"))?;
    if !(1..=240).contains(&fps) {
        return Err(format!("frame rate {fps} must be between 1 and 240"));
    }
    Ok(fps)
}

pub fn parse_seconds(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid number of seconds '{value}'"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("seconds must be zero or positive, got '{value}'"));
    }
    Ok(seconds)
}
