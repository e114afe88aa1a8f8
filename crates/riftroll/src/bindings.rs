use performance::{Color, LoadOptions};
use renderer::{GlowPass, LayoutOptions, OrchestratorOptions, TrackStyle};
use settings::{LayoutSettings, RiftrollConfig, StyleSettings};

use crate::cli::RunArgs;

/// Applies command-line overrides on top of file values.
pub fn apply_overrides(config: &mut RiftrollConfig, args: &RunArgs) {
    if let Some((width, height)) = args.size {
        config.window.width = width;
        config.window.height = height;
    }
    if let Some(fps) = args.fps {
        config.window.fps = fps;
    }
    if let Some(join_gap) = args.join_gap {
        config.model.join_gap = join_gap;
    }
}

pub fn load_options(config: &RiftrollConfig) -> LoadOptions {
    LoadOptions {
        join_gap: config.model.join_gap,
    }
}

pub fn orchestrator_options(config: &RiftrollConfig) -> OrchestratorOptions {
    let [r, g, b] = config.style.background;
    OrchestratorOptions {
        layout: layout_options(&config.layout),
        style: track_style(&config.style),
        background: Color::rgb(r, g, b),
    }
}

fn layout_options(layout: &LayoutSettings) -> LayoutOptions {
    LayoutOptions {
        seconds_per_screen_height: layout.seconds_per_screen_height,
        rift_seconds: layout.rift_seconds,
        rift_lead_fraction: layout.rift_lead_fraction,
        rift_min_fraction: layout.rift_min_fraction,
        vertical_margin: layout.vertical_margin,
        blur_margin: layout.blur_margin,
    }
}

fn track_style(style: &StyleSettings) -> TrackStyle {
    TrackStyle {
        passes: style
            .glow
            .iter()
            .map(|pass| GlowPass {
                width: pass.width,
                blur: pass.blur,
            })
            .collect(),
        rift_width: style.rift_width,
    }
}
