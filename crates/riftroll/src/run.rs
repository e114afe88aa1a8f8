use std::fs;
use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use performance::{load_midi, LoadOptions, LoadedPerformance};
use renderer::{run_window, FrameOrchestrator, ManualTimeSource, SystemTimeSource, WindowConfig};
use settings::RiftrollConfig;
use tracing_subscriber::EnvFilter;

use crate::bindings::{apply_overrides, load_options, orchestrator_options};
use crate::cli::{ConfigArgs, InspectArgs, NotesArgs, RunArgs, SnapshotArgs};
use crate::config;
use crate::notes::{write_json, LoggingNoteSink, NoteSink};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let Some(file) = args.file.as_deref() else {
        bail!("no MIDI file given; see `riftroll --help`");
    };
    let config = effective_config(&args)?;
    let performance = load_performance(file, &load_options(&config))?;
    tracing::info!(
        file = %file.display(),
        duration = performance.model.duration,
        lines = performance.model.lines.len(),
        "starting playback"
    );

    // Audio and visuals keep separate clocks, both started here.
    LoggingNoteSink.schedule(performance.note_events())?;
    let clock = Box::new(SystemTimeSource::new());

    let window = WindowConfig {
        title: window_title(file),
        width: config.window.width,
        height: config.window.height,
        fps: config.window.fps as usize,
        exit_at_end: args.exit_at_end,
    };
    let mut orchestrator = FrameOrchestrator::new(
        performance.model,
        window.width,
        window.height,
        orchestrator_options(&config),
        clock,
    )
    .context("failed to start render workers")?;

    let summary = run_window(&mut orchestrator, &window)?;
    tracing::info!(
        frames = summary.frames,
        rotations = summary.rotations,
        seconds = summary.last_time,
        reason = ?summary.reason,
        "playback stopped"
    );
    Ok(())
}

pub fn inspect(args: &InspectArgs, run: &RunArgs) -> Result<()> {
    let config = effective_config(run)?;
    let performance = load_performance(&args.file, &load_options(&config))?;
    let model = &performance.model;
    let points: usize = model.lines.iter().map(|line| line.points.len()).sum();

    println!("file:      {}", args.file.display());
    println!("duration:  {:.3} s", model.duration);
    println!("range:     {} - {}", model.min_note, model.max_note);
    println!("tracks:    {}", performance.tracks.len());
    println!("lines:     {}", model.lines.len());
    println!("points:    {points}");
    for track in &performance.tracks {
        let name = track.name.as_deref().unwrap_or("(unnamed)");
        println!(
            "  track {:<3} {:<24} {} notes",
            track.track,
            name,
            track.notes.len()
        );
    }
    Ok(())
}

pub fn notes(args: &NotesArgs, run: &RunArgs) -> Result<()> {
    let config = effective_config(run)?;
    let performance = load_performance(&args.file, &load_options(&config))?;
    let stdout = io::stdout();
    write_json(
        stdout.lock(),
        performance.model.duration,
        performance.note_events(),
        args.pretty,
    )
}

/// Renders the frame at `args.at` headlessly: buffers are filled, waited
/// for, and the composed frame is flattened over the background.
pub fn snapshot(args: &SnapshotArgs, run: &RunArgs) -> Result<()> {
    let config = effective_config(run)?;
    let performance = load_performance(&args.file, &load_options(&config))?;
    let mut orchestrator = FrameOrchestrator::new(
        performance.model,
        config.window.width,
        config.window.height,
        orchestrator_options(&config),
        Box::new(ManualTimeSource::new(args.at)),
    )
    .context("failed to start render workers")?;

    orchestrator.tick().context("failed to render buffers")?;
    orchestrator
        .wait_for_pending()
        .context("failed to render buffers")?;
    let report = orchestrator.tick().context("failed to compose frame")?;

    let background = orchestrator.background();
    let image = orchestrator.frame_mut().to_rgba_image(background);
    image
        .save(&args.out)
        .with_context(|| format!("failed to write snapshot {}", args.out.display()))?;
    tracing::info!(
        out = %args.out.display(),
        time = report.time,
        buffers = report.blitted,
        "snapshot written"
    );
    Ok(())
}

pub fn show_config(args: &ConfigArgs, run: &RunArgs) -> Result<()> {
    let loaded = config::load(run.config.as_deref())?;
    if args.path {
        println!("{}", loaded.source.path().display());
        return Ok(());
    }
    if !loaded.from_file {
        println!("# {} not found; showing defaults", loaded.source.path().display());
    }
    let mut config = loaded.config;
    apply_overrides(&mut config, run);
    print!("{}", config.to_toml_string()?);
    Ok(())
}

pub fn load_performance(path: &Path, options: &LoadOptions) -> Result<LoadedPerformance> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read MIDI file {}", path.display()))?;
    load_midi(&bytes, options)
        .with_context(|| format!("failed to load MIDI file {}", path.display()))
}

fn effective_config(args: &RunArgs) -> Result<RiftrollConfig> {
    let loaded = config::load(args.config.as_deref())?;
    let mut config = loaded.config;
    apply_overrides(&mut config, args);
    config
        .validate()
        .context("invalid configuration after applying command-line flags")?;
    Ok(config)
}

fn window_title(file: &Path) -> String {
    match file.file_name() {
        Some(name) => format!("riftroll - {}", name.to_string_lossy()),
        None => "riftroll".to_string(),
    }
}
