//! Per-frame composition of prerendered buffers and the live rift region.
//!
//! Two buffer slots each hold one screen width of prerendered scrolling
//! content. The older slot trails the newer one by exactly one slot duration.
//! When playback passes the committed buffer time, the older slot is
//! re-rendered one duration past it; once that arrives the two swap roles.
//!
//! ```text
//!          older slot           newer slot        live     rift
//!   ◀──────────────────────┬───────────────────┬─────────────┤
//!                          │                   rift_start    rift_end
//! ```

use performance::{Color, PerformanceModel};
use tracing::{debug, info, trace, warn};

use crate::clock::BoxedTimeSource;
use crate::geometry::{Rift, ViewWindow};
use crate::surface::{Rect, Surface};
use crate::track::{TrackRenderer, TrackStyle};
use crate::worker::{BufferImage, PendingRender, RenderRequest, RenderWorker, WorkerError};

const SLOT_COUNT: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render worker {worker} stopped unexpectedly")]
    WorkerLost { worker: usize },
    #[error(transparent)]
    Worker(WorkerError),
}

impl From<WorkerError> for RenderError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Disconnected(worker) => Self::WorkerLost { worker },
            other => Self::Worker(other),
        }
    }
}

/// Size-independent layout knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutOptions {
    /// Seconds of music that fit in one screen height of horizontal travel.
    pub seconds_per_screen_height: f64,
    /// Width of the rift fade band, in seconds.
    pub rift_seconds: f64,
    /// Preferred distance of the rift from the right edge, in screen heights.
    pub rift_lead_fraction: f64,
    /// Leftmost allowed rift position, as a fraction of the width.
    pub rift_min_fraction: f64,
    /// Empty band above and below the note range, as a fraction of the height.
    pub vertical_margin: f64,
    /// Extra pixels drawn beyond every edge so glow is not cut off.
    pub blur_margin: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            seconds_per_screen_height: 6.0,
            rift_seconds: 0.15,
            rift_lead_fraction: 1.0 / 3.0,
            rift_min_fraction: 0.8,
            vertical_margin: 0.2,
            blur_margin: 100.0,
        }
    }
}

/// Everything derived from the viewport size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub px_per_sec: f64,
    pub slot_duration: f64,
    pub rift_pixels: u32,
    pub rift_start: f64,
    pub rift_end: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub blur_margin: f64,
}

impl Layout {
    /// Derives scroll speed, slot duration and rift placement for a viewport.
    pub fn compute(width: u32, height: u32, options: &LayoutOptions) -> Self {
        let (w, h) = (f64::from(width), f64::from(height));
        let px_per_sec = h / options.seconds_per_screen_height;
        let rift_pixels = (options.rift_seconds * px_per_sec).round().max(1.0) as u32;
        let rift_end = (w - h * options.rift_lead_fraction)
            .max(w * options.rift_min_fraction)
            .round();
        let rift_start = (rift_end - f64::from(rift_pixels) - options.blur_margin).max(0.0);

        Self {
            width,
            height,
            px_per_sec,
            slot_duration: w / px_per_sec,
            rift_pixels,
            rift_start,
            rift_end,
            min_y: options.vertical_margin * h,
            max_y: (1.0 - options.vertical_margin) * h,
            blur_margin: options.blur_margin,
        }
    }

    /// Pixels from `rift_start` to `rift_end`, the live band.
    pub fn rift_length(&self) -> f64 {
        self.rift_end - self.rift_start
    }

    /// False for layouts that cannot scroll, e.g. a zero-sized window.
    pub fn is_drawable(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.px_per_sec.is_finite()
            && self.px_per_sec > 0.0
            && self.slot_duration.is_finite()
            && self.slot_duration > 0.0
    }

    /// A whole screen ending at `boundary`, drawn for a buffer slot.
    pub fn buffer_window(&self, boundary: f64) -> ViewWindow {
        let width = f64::from(self.width);
        ViewWindow {
            time: boundary,
            start_x: -self.blur_margin,
            end_x: width + self.blur_margin,
            min_y: self.min_y,
            max_y: self.max_y,
            px_per_sec: self.px_per_sec,
            anchor_x: width,
            rift: None,
        }
    }

    /// The region around the rift drawn every frame.
    pub fn live_window(&self, time: f64) -> ViewWindow {
        ViewWindow {
            time,
            start_x: self.rift_start - self.blur_margin,
            end_x: self.rift_end,
            min_y: self.min_y,
            max_y: self.max_y,
            px_per_sec: self.px_per_sec,
            anchor_x: self.rift_end,
            rift: Some(Rift {
                end_x: self.rift_end,
                pixels: self.rift_pixels,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOptions {
    pub layout: LayoutOptions,
    pub style: TrackStyle,
    /// Fill colour of prerendered buffers.
    pub background: Color,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            layout: LayoutOptions::default(),
            style: TrackStyle::default(),
            background: Color::rgb(0, 0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Nothing rendered yet.
    Init,
    /// Both slots were invalidated and are being refilled.
    Resizing,
    /// Both slots hold current images.
    Running,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub time: f64,
    pub state: OrchestratorState,
    /// Render requests sent this tick.
    pub dispatched: usize,
    /// Buffer images composited this tick.
    pub blitted: usize,
    /// Whether the slots swapped roles this tick.
    pub rotated: bool,
}

#[derive(Debug, Default)]
struct BufferSlot {
    image: Option<BufferImage>,
    generation: u64,
}

pub struct FrameOrchestrator {
    clock: BoxedTimeSource,
    model: PerformanceModel,
    options: OrchestratorOptions,
    live: TrackRenderer,
    workers: Vec<RenderWorker>,
    slots: [BufferSlot; SLOT_COUNT],
    older: usize,
    pending: Vec<PendingRender>,
    buffer_time: f64,
    rotations: u64,
    layout: Layout,
    needs_layout: bool,
    state: OrchestratorState,
    frame: Surface,
}

impl FrameOrchestrator {
    /// Spawns the render workers and hands each a copy of `model`. Playback
    /// time is read from `clock`, which should start at zero now.
    pub fn new(
        model: PerformanceModel,
        width: u32,
        height: u32,
        options: OrchestratorOptions,
        clock: BoxedTimeSource,
    ) -> Result<Self, RenderError> {
        let mut workers = Vec::with_capacity(SLOT_COUNT);
        for index in 0..SLOT_COUNT {
            let worker = RenderWorker::spawn(index, options.style.clone())?;
            worker.load(&model)?;
            workers.push(worker);
        }
        info!(
            lines = model.lines.len(),
            duration = model.duration,
            width,
            height,
            "render session started"
        );

        Ok(Self {
            clock,
            live: TrackRenderer::new(options.style.clone()),
            layout: Layout::compute(width, height, &options.layout),
            model,
            options,
            workers,
            slots: Default::default(),
            older: 0,
            pending: Vec::new(),
            buffer_time: 0.0,
            rotations: 0,
            needs_layout: true,
            state: OrchestratorState::Init,
            frame: Surface::new(width, height),
        })
    }

    /// Records a new viewport size; the next tick relayouts and refills.
    pub fn resize(&mut self, width: u32, height: u32) {
        debug!(width, height, "viewport resized");
        self.layout = Layout::compute(width, height, &self.options.layout);
        self.needs_layout = true;
    }

    /// Runs one frame: applies finished renders, dispatches the next one when
    /// playback has passed the committed time, and composes the frame.
    pub fn tick(&mut self) -> Result<FrameReport, RenderError> {
        let time = self.clock.now();
        let mut report = FrameReport {
            time,
            state: self.state,
            dispatched: 0,
            blitted: 0,
            rotated: false,
        };

        report.rotated = self.collect_finished(false)?;

        if self.needs_layout {
            self.needs_layout = false;
            report.dispatched = self.refill(time)?;
        } else if self.layout.is_drawable() && !self.has_current_pending() && time > self.buffer_time {
            let duration = self.layout.slot_duration;
            let boundary = time - time.rem_euclid(duration) + duration;
            self.dispatch(self.older, boundary)?;
            report.dispatched = 1;
        }

        self.update_state();
        report.blitted = self.compose(time);
        report.state = self.state;
        trace!(
            time,
            dispatched = report.dispatched,
            blitted = report.blitted,
            rotated = report.rotated,
            "frame"
        );
        Ok(report)
    }

    /// Blocks until every outstanding render has been applied or dropped.
    pub fn wait_for_pending(&mut self) -> Result<(), RenderError> {
        self.collect_finished(true)?;
        self.update_state();
        Ok(())
    }

    /// The composed frame of the last tick.
    pub fn frame(&self) -> &Surface {
        &self.frame
    }

    /// Mutable access for reading pixels back, which rasterises pending
    /// drawing.
    pub fn frame_mut(&mut self) -> &mut Surface {
        &mut self.frame
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn model(&self) -> &PerformanceModel {
        &self.model
    }

    /// Colour the window shows where the frame is transparent.
    pub fn background(&self) -> Color {
        self.options.background
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Boundary time of the newer slot.
    pub fn committed_time(&self) -> f64 {
        self.buffer_time
    }

    /// Index of the slot currently playing the older role.
    pub fn older_slot(&self) -> usize {
        self.older
    }

    /// Slot swaps since the session started.
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    pub fn slot_ready(&self, slot: usize) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|slot| slot.image.is_some())
    }

    /// Boundary time the image in `slot` was rendered for.
    pub fn slot_boundary(&self, slot: usize) -> Option<f64> {
        self.slots
            .get(slot)?
            .image
            .as_ref()
            .map(|image| image.boundary)
    }

    /// Pixel size of the image in `slot`.
    pub fn slot_size(&self, slot: usize) -> Option<(u32, u32)> {
        self.slots
            .get(slot)?
            .image
            .as_ref()
            .map(|buffer| buffer.image.dimensions())
    }

    /// Renders dispatched but not yet applied, stale ones included.
    pub fn pending_renders(&self) -> usize {
        self.pending.len()
    }

    fn has_current_pending(&self) -> bool {
        self.pending
            .iter()
            .any(|pending| pending.generation() == self.slots[pending.slot()].generation)
    }

    /// Applies finished renders. Returns whether the slots rotated.
    fn collect_finished(&mut self, block: bool) -> Result<bool, RenderError> {
        let mut waiting = Vec::with_capacity(self.pending.len());
        let mut finished = Vec::new();
        for pending in self.pending.drain(..) {
            let result = if block {
                Some(pending.wait())
            } else {
                pending.try_take()
            };
            match result {
                Some(result) => finished.push((pending, result)),
                None => waiting.push(pending),
            }
        }
        self.pending = waiting;

        let mut rotated = false;
        for (pending, result) in finished {
            rotated |= self.apply(&pending, result)?;
        }
        Ok(rotated)
    }

    fn apply(
        &mut self,
        pending: &PendingRender,
        result: Result<BufferImage, WorkerError>,
    ) -> Result<bool, RenderError> {
        let slot = pending.slot();
        if pending.generation() != self.slots[slot].generation {
            debug!(
                slot,
                generation = pending.generation(),
                current = self.slots[slot].generation,
                "dropping stale render"
            );
            return match result {
                Err(WorkerError::Disconnected(worker)) => Err(RenderError::WorkerLost { worker }),
                _ => Ok(false),
            };
        }

        let image = match result {
            Ok(image) => image,
            Err(WorkerError::Disconnected(worker)) => return Err(RenderError::WorkerLost { worker }),
            Err(err) => {
                warn!(slot, %err, "render failed; keeping previous buffer");
                return Ok(false);
            }
        };

        let refill = self.slots[slot].image.is_none();
        self.slots[slot].image = Some(image);
        if refill {
            debug!(slot, boundary = pending.boundary(), "buffer slot filled");
            return Ok(false);
        }

        self.older = (slot + 1) % SLOT_COUNT;
        self.buffer_time = pending.boundary();
        self.rotations += 1;
        debug!(
            slot,
            buffer_time = self.buffer_time,
            rotations = self.rotations,
            "buffer committed"
        );
        Ok(true)
    }

    /// Invalidates both slots and renders the screen around `time` afresh.
    fn refill(&mut self, time: f64) -> Result<usize, RenderError> {
        for slot in &mut self.slots {
            slot.generation += 1;
            slot.image = None;
        }
        self.older = 0;
        self.state = OrchestratorState::Resizing;
        self.frame.resize(self.layout.width, self.layout.height);

        if !self.layout.is_drawable() {
            debug!(
                width = self.layout.width,
                height = self.layout.height,
                "layout cannot scroll; rendering suspended"
            );
            return Ok(0);
        }

        let duration = self.layout.slot_duration;
        let base = time - time.rem_euclid(duration);
        self.dispatch(0, base)?;
        self.dispatch(1, base + duration)?;
        self.buffer_time = base + duration;
        debug!(base, slot_duration = duration, "buffers invalidated");
        Ok(SLOT_COUNT)
    }

    fn dispatch(&mut self, slot: usize, boundary: f64) -> Result<(), RenderError> {
        let request = RenderRequest {
            width: self.layout.width,
            height: self.layout.height,
            window: self.layout.buffer_window(boundary),
            background: self.options.background,
        };
        let generation = self.slots[slot].generation;
        let pending = self.workers[slot].render(slot, generation, request)?;
        debug!(slot, generation, boundary, "render dispatched");
        self.pending.push(pending);
        Ok(())
    }

    fn update_state(&mut self) {
        if self.state == OrchestratorState::Resizing && self.slots.iter().all(|slot| slot.image.is_some()) {
            self.state = OrchestratorState::Running;
        }
    }

    /// Draws the live region and blits whatever buffers are ready.
    fn compose(&mut self, time: f64) -> usize {
        self.frame.clear();
        if !self.layout.is_drawable() {
            return 0;
        }

        let layout = self.layout;
        self.live
            .render_scene(&self.model, &mut self.frame, &layout.live_window(time));

        let newer = (self.older + 1) % SLOT_COUNT;
        let leads = [
            (self.older, 2.0 * layout.slot_duration),
            (newer, layout.slot_duration),
        ];
        let mut blitted = 0;
        for (slot, lead) in leads {
            let render_w = (time - self.buffer_time + lead) * layout.px_per_sec - layout.rift_length();
            let Some(buffer) = &self.slots[slot].image else {
                continue;
            };
            if render_w <= 0.0 {
                continue;
            }
            let height = f64::from(layout.height);
            self.frame.draw_image(
                &buffer.image,
                Rect::new(0.0, 0.0, render_w, height),
                Rect::new(layout.rift_start - render_w, 0.0, render_w, height),
            );
            blitted += 1;
        }
        blitted
    }
}
