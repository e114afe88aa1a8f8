//! Piano-roll rendering for `riftroll`.
//!
//! ```text
//!   clock ──▶ FrameOrchestrator ──▶ frame Surface ──▶ window
//!                 │      ▲
//!        Render   │      │ BufferImage
//!                 ▼      │
//!            RenderWorker × 2 (TrackRenderer + own Surface)
//! ```
//!
//! The orchestrator draws only the narrow region around the rift every
//! frame; everything left of it comes from two prerendered buffers that the
//! workers refresh in the background.

pub mod clock;
pub mod geometry;
pub mod orchestrator;
mod raster;
pub mod surface;
pub mod track;
pub mod window;
pub mod worker;

pub use clock::{BoxedTimeSource, ManualTimeSource, SystemTimeSource, TimeSource};
pub use geometry::{Coords, GeometryError, Projection, Rift, ViewWindow};
pub use orchestrator::{
    FrameOrchestrator, FrameReport, Layout, LayoutOptions, OrchestratorOptions, OrchestratorState,
    RenderError,
};
pub use surface::{Bitmap, Path, Rect, StrokeStyle, Surface};
pub use track::{advance_cursor, GlowPass, LineCursor, TrackRenderer, TrackStyle};
pub use window::{run_window, SessionSummary, StopReason, WindowConfig};
pub use worker::{BufferImage, PendingRender, RenderRequest, RenderWorker, WorkerError};
