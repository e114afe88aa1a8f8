//! Desktop presentation through a `minifb` window.

use anyhow::{anyhow, Context, Result};
use minifb::{Key, Window, WindowOptions};
use tracing::{debug, info};

use crate::orchestrator::FrameOrchestrator;

#[derive(Debug, Clone, PartialEq)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fps: usize,
    /// Close once the last note has scrolled past the left edge.
    pub exit_at_end: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Closed,
    Escape,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub frames: u64,
    pub rotations: u64,
    pub last_time: f64,
    pub reason: StopReason,
}

/// Opens the window and drives `orchestrator` until the user closes it.
pub fn run_window(orchestrator: &mut FrameOrchestrator, config: &WindowConfig) -> Result<SessionSummary> {
    let mut window = Window::new(
        &config.title,
        config.width as usize,
        config.height as usize,
        WindowOptions {
            resize: true,
            ..WindowOptions::default()
        },
    )
    .map_err(|err| anyhow!("failed to open window: {err}"))?;
    window.set_target_fps(config.fps);

    let mut size = window.get_size();
    orchestrator.resize(size.0 as u32, size.1 as u32);
    info!(width = size.0, height = size.1, fps = config.fps, "window opened");

    let background = orchestrator.background();
    let mut pixels: Vec<u32> = Vec::new();
    let mut frames = 0u64;
    let mut last_time = 0.0;

    let reason = loop {
        if !window.is_open() {
            break StopReason::Closed;
        }
        if window.is_key_down(Key::Escape) {
            break StopReason::Escape;
        }

        let current = window.get_size();
        if current != size {
            size = current;
            orchestrator.resize(size.0 as u32, size.1 as u32);
        }

        let report = orchestrator.tick().context("render session failed")?;
        frames += 1;
        last_time = report.time;

        let frame = orchestrator.frame_mut();
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        if width == 0 || height == 0 || (width, height) != size {
            window.update();
        } else {
            frame.write_argb(&mut pixels, background);
            window
                .update_with_buffer(&pixels, width, height)
                .map_err(|err| anyhow!("failed to present frame: {err}"))?;
        }

        if config.exit_at_end && scrolled_off(orchestrator, report.time) {
            break StopReason::Finished;
        }
    };

    debug!(frames, ?reason, "window loop finished");
    Ok(SessionSummary {
        frames,
        rotations: orchestrator.rotations(),
        last_time,
        reason,
    })
}

/// True once the last note end has travelled from the rift to the left edge.
fn scrolled_off(orchestrator: &FrameOrchestrator, time: f64) -> bool {
    let layout = orchestrator.layout();
    if !layout.is_drawable() {
        return false;
    }
    time > orchestrator.model().duration + layout.rift_end / layout.px_per_sec
}
