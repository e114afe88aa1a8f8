//! Off-screen render threads.
//!
//! Each worker owns a surface, a track renderer and its own copy of the
//! performance. Requests are served strictly in order; the reply to each one
//! travels back on a one-shot channel wrapped in a [`PendingRender`].

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use performance::{Color, PerformanceModel};
use tracing::{debug, trace};

use crate::geometry::ViewWindow;
use crate::surface::{Bitmap, Surface};
use crate::track::{TrackRenderer, TrackStyle};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("render requested before a performance was loaded")]
    NotLoaded,
    #[error("render worker {0} has stopped")]
    Disconnected(usize),
    #[error("failed to spawn render worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// What to draw and at which size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub width: u32,
    pub height: u32,
    pub window: ViewWindow,
    pub background: Color,
}

/// A finished render, tagged with the time it was drawn for.
#[derive(Debug, Clone)]
pub struct BufferImage {
    pub image: Bitmap,
    pub boundary: f64,
}

type RenderReply = Result<BufferImage, WorkerError>;

enum WorkerCommand {
    Load(Box<PerformanceModel>),
    Render {
        request: RenderRequest,
        reply: Sender<RenderReply>,
    },
}

/// Handle to a render that may still be running.
#[derive(Debug)]
pub struct PendingRender {
    worker: usize,
    slot: usize,
    generation: u64,
    boundary: f64,
    reply: Receiver<RenderReply>,
}

impl PendingRender {
    /// Index of the worker doing the render.
    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Time the image ends at, in seconds.
    pub fn boundary(&self) -> f64 {
        self.boundary
    }

    /// Returns the result if the worker has finished, without blocking.
    pub fn try_take(&self) -> Option<RenderReply> {
        match self.reply.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(WorkerError::Disconnected(self.worker))),
        }
    }

    /// Blocks until the worker replies.
    pub fn wait(&self) -> RenderReply {
        self.reply
            .recv()
            .map_err(|_| WorkerError::Disconnected(self.worker))?
    }
}

pub struct RenderWorker {
    index: usize,
    commands: Option<Sender<WorkerCommand>>,
    join_handle: Option<JoinHandle<()>>,
}

impl RenderWorker {
    /// Starts a named render thread. It has nothing to draw until
    /// [`RenderWorker::load`] is called.
    pub fn spawn(index: usize, style: TrackStyle) -> Result<Self, WorkerError> {
        let (commands_tx, commands_rx) = unbounded();
        let handle = thread::Builder::new()
            .name(format!("riftroll-render-{index}"))
            .spawn(move || run_worker(index, style, commands_rx))
            .map_err(WorkerError::Spawn)?;

        Ok(Self {
            index,
            commands: Some(commands_tx),
            join_handle: Some(handle),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Hands the worker its own deep copy of `model`.
    pub fn load(&self, model: &PerformanceModel) -> Result<(), WorkerError> {
        self.send(WorkerCommand::Load(Box::new(model.clone())))
    }

    /// Queues a render for `slot`; the reply carries `generation` back.
    pub fn render(
        &self,
        slot: usize,
        generation: u64,
        request: RenderRequest,
    ) -> Result<PendingRender, WorkerError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(WorkerCommand::Render {
            request,
            reply: reply_tx,
        })?;
        Ok(PendingRender {
            worker: self.index,
            slot,
            generation,
            boundary: request.window.time,
            reply: reply_rx,
        })
    }

    fn send(&self, command: WorkerCommand) -> Result<(), WorkerError> {
        self.commands
            .as_ref()
            .ok_or(WorkerError::Disconnected(self.index))?
            .send(command)
            .map_err(|_| WorkerError::Disconnected(self.index))
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(index: usize, style: TrackStyle, commands: Receiver<WorkerCommand>) {
    let mut surface = Surface::new(0, 0);
    let mut renderer = TrackRenderer::new(style);
    let mut model: Option<PerformanceModel> = None;
    debug!(worker = index, "render worker started");

    for command in commands.iter() {
        match command {
            WorkerCommand::Load(loaded) => {
                debug!(worker = index, lines = loaded.lines.len(), "render worker loaded performance");
                renderer.reset();
                model = Some(*loaded);
            }
            WorkerCommand::Render { request, reply } => {
                let result = match &model {
                    Some(model) => Ok(render_buffer(&mut surface, &mut renderer, model, &request)),
                    None => Err(WorkerError::NotLoaded),
                };
                trace!(worker = index, boundary = request.window.time, "render finished");
                // The orchestrator drops receivers it no longer cares about.
                let _ = reply.send(result);
            }
        }
    }

    debug!(worker = index, "render worker stopped");
}

fn render_buffer(
    surface: &mut Surface,
    renderer: &mut TrackRenderer,
    model: &PerformanceModel,
    request: &RenderRequest,
) -> BufferImage {
    surface.resize(request.width, request.height);
    surface.fill(request.background);
    renderer.render_scene(model, surface, &request.window);
    BufferImage {
        image: surface.snapshot(),
        boundary: request.window.time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use performance::{Line, Point};

    fn model() -> PerformanceModel {
        PerformanceModel {
            duration: 4.0,
            min_note: 60.0,
            max_note: 72.0,
            lines: vec![Line::new(
                vec![
                    Point::new(0.0, 60.0, true, false),
                    Point::new(4.0, 72.0, false, true),
                ],
                Color::rgb(0, 200, 255),
            )],
        }
    }

    fn request(time: f64) -> RenderRequest {
        RenderRequest {
            width: 80,
            height: 40,
            window: ViewWindow {
                time,
                start_x: -10.0,
                end_x: 90.0,
                min_y: 8.0,
                max_y: 32.0,
                px_per_sec: 20.0,
                anchor_x: 80.0,
                rift: None,
            },
            background: Color::rgb(0, 0, 0),
        }
    }

    #[test]
    fn render_before_load_fails() {
        let worker = RenderWorker::spawn(0, TrackStyle::default()).unwrap();
        let pending = worker.render(0, 1, request(4.0)).unwrap();
        assert!(matches!(pending.wait(), Err(WorkerError::NotLoaded)));
    }

    #[test]
    fn renders_are_sized_and_tagged() {
        let worker = RenderWorker::spawn(1, TrackStyle::default()).unwrap();
        worker.load(&model()).unwrap();
        let pending = worker.render(1, 7, request(4.0)).unwrap();
        assert_eq!(pending.worker(), 1);
        assert_eq!(pending.slot(), 1);
        assert_eq!(pending.generation(), 7);
        assert_eq!(pending.boundary(), 4.0);

        let buffer = pending.wait().unwrap();
        assert_eq!(buffer.boundary, 4.0);
        assert_eq!(buffer.image.dimensions(), (80, 40));
        assert!(buffer.image.is_opaque());
        assert!(buffer.image.to_rgba_image().pixels().any(|pixel| pixel[2] > 0));
    }

    #[test]
    fn requests_complete_in_order() {
        let worker = RenderWorker::spawn(2, TrackStyle::default()).unwrap();
        worker.load(&model()).unwrap();
        let first = worker.render(0, 1, request(1.0)).unwrap();
        let second = worker.render(0, 2, request(2.0)).unwrap();
        assert_eq!(second.wait().unwrap().boundary, 2.0);
        // The earlier reply is already waiting once the later one arrived.
        assert_eq!(first.try_take().unwrap().unwrap().boundary, 1.0);
    }

    #[test]
    fn stopped_worker_is_reported() {
        let (reply_tx, reply_rx) = bounded::<RenderReply>(1);
        drop(reply_tx);
        let pending = PendingRender {
            worker: 3,
            slot: 0,
            generation: 0,
            boundary: 0.0,
            reply: reply_rx,
        };
        assert!(matches!(pending.try_take(), Some(Err(WorkerError::Disconnected(3)))));
        assert!(matches!(pending.wait(), Err(WorkerError::Disconnected(3))));
    }
}
