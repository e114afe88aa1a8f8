//! Drawing target built on `vello_cpu`.
//!
//! Commands are recorded into a [`RenderContext`] and rasterised lazily, the
//! first time pixels are read back. Glow is rendered separately: the stroke is
//! drawn as coverage into a scratch pixmap, blurred, tinted and then placed
//! under the stroke as an image paint.

use std::fmt;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use performance::Color;
use vello_cpu::kurbo::{self, Affine, BezPath, Shape};
use vello_cpu::peniko;
use vello_cpu::{Image, ImageSource, Pixmap, RenderContext};

use crate::raster::CoverageMask;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// A rectangle from its top-left corner and size.
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// How a path is stroked. Caps and joins are always round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f64,
    /// Glow radius in pixels, drawn in the stroke colour underneath it.
    pub blur: f64,
}

impl StrokeStyle {
    /// A solid stroke without glow.
    pub fn new(color: Color, width: f64) -> Self {
        Self {
            color,
            width,
            blur: 0.0,
        }
    }

    pub fn with_blur(mut self, blur: f64) -> Self {
        self.blur = blur;
        self
    }

    fn glow_radius(&self) -> usize {
        if self.blur > 0.0 {
            (self.blur / 2.0).round().max(1.0) as usize
        } else {
            0
        }
    }

    fn glow_spread(&self) -> f64 {
        3.0 * self.glow_radius() as f64
    }

    /// Distance from the path beyond which the stroke and its glow leave no
    /// visible trace.
    pub fn reach(&self) -> f64 {
        self.width / 2.0 + 1.0 + self.glow_spread()
    }
}

/// A polyline made of independent sub-paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    subpaths: Vec<Vec<(f64, f64)>>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new sub-path at `(x, y)`.
    pub fn move_to(&mut self, x: f64, y: f64) {
        self.subpaths.push(vec![(x, y)]);
    }

    /// Extends the current sub-path; starts one if there is none.
    pub fn line_to(&mut self, x: f64, y: f64) {
        match self.subpaths.last_mut() {
            Some(current) => current.push((x, y)),
            None => self.move_to(x, y),
        }
    }

    /// Moves the sub-paths of `other` onto the end of this path.
    pub fn append(&mut self, other: Path) {
        self.subpaths.extend(other.subpaths);
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.iter().all(|subpath| subpath.is_empty())
    }

    pub fn subpaths(&self) -> &[Vec<(f64, f64)>] {
        &self.subpaths
    }
}

/// Axis-aligned bounds as `(x0, y0, x1, y1)`.
type Bounds = (f64, f64, f64, f64);

/// The part of segment `a`-`b` between `x_min` and `x_max`, in the
/// segment's own direction.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    x_min: f64,
    x_max: f64,
) -> Option<((f64, f64), (f64, f64))> {
    if a.0.max(b.0) < x_min || a.0.min(b.0) > x_max {
        return None;
    }
    let dx = b.0 - a.0;
    if dx == 0.0 {
        return Some((a, b));
    }
    let at = |x: f64| {
        let t = ((x - a.0) / dx).clamp(0.0, 1.0);
        if t == 0.0 {
            a
        } else if t == 1.0 {
            b
        } else {
            (x, a.1 + (b.1 - a.1) * t)
        }
    };
    let (from, to) = if dx > 0.0 { (x_min, x_max) } else { (x_max, x_min) };
    Some((at(from), at(to)))
}

/// Geometry of a path cut to an x range. Inside the range it matches the
/// path exactly.
struct Outline {
    lines: BezPath,
    /// Sub-paths of zero length, painted as filled dots.
    dots: Vec<BezPath>,
    bounds: Option<Bounds>,
}

impl Outline {
    fn build(path: &Path, x_min: f64, x_max: f64, radius: f64) -> Self {
        let mut outline = Outline {
            lines: BezPath::new(),
            dots: Vec::new(),
            bounds: None,
        };
        for subpath in path.subpaths() {
            let [first, rest @ ..] = subpath.as_slice() else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            if rest.iter().all(|point| point == first) {
                let (x, y) = *first;
                if (x_min..=x_max).contains(&x) {
                    outline
                        .dots
                        .push(kurbo::Circle::new((x, y), radius).to_path(0.1));
                    outline.include((x, y));
                }
                continue;
            }

            let mut pen: Option<(f64, f64)> = None;
            for pair in subpath.windows(2) {
                let Some((from, to)) = clip_segment(pair[0], pair[1], x_min, x_max) else {
                    pen = None;
                    continue;
                };
                if pen != Some(from) {
                    outline.lines.move_to(from);
                    outline.include(from);
                }
                outline.lines.line_to(to);
                outline.include(to);
                pen = Some(to);
            }
        }
        outline
    }

    fn include(&mut self, (x, y): (f64, f64)) {
        self.bounds = Some(match self.bounds {
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            None => (x, y, x, y),
        });
    }

    fn draw(&self, ctx: &mut RenderContext, width: f64) {
        ctx.set_stroke(
            kurbo::Stroke::new(width)
                .with_caps(kurbo::Cap::Round)
                .with_join(kurbo::Join::Round),
        );
        if !self.lines.elements().is_empty() {
            ctx.stroke_path(&self.lines);
        }
        for dot in &self.dots {
            ctx.fill_path(dot);
        }
    }
}

fn paint(color: Color) -> peniko::Color {
    peniko::Color::from_rgba8(color.r, color.g, color.b, color.a)
}

fn paint_image(ctx: &mut RenderContext, image: Arc<Pixmap>, transform: Affine, area: kurbo::Rect) {
    ctx.set_transform(transform);
    ctx.set_paint(Image {
        image: ImageSource::Pixmap(image),
        sampler: peniko::ImageSampler::default(),
    });
    ctx.fill_rect(&area);
    ctx.set_transform(Affine::IDENTITY);
}

fn unpremultiply(pixel: &[u8]) -> [u8; 4] {
    let alpha = pixel[3];
    if alpha == 0 {
        return [0; 4];
    }
    let channel = |value: u8| ((u32::from(value) * 255 + u32::from(alpha) / 2) / u32::from(alpha)).min(255) as u8;
    [channel(pixel[0]), channel(pixel[1]), channel(pixel[2]), alpha]
}

fn pixel_at(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
    let index = (y as usize * usize::from(pixmap.width()) + x as usize) * 4;
    unpremultiply(&pixmap.data_as_u8_slice()[index..index + 4])
}

/// Rendered pixels handed from workers to the main thread. Cloning is cheap.
#[derive(Clone)]
pub struct Bitmap {
    pixmap: Arc<Pixmap>,
    opaque: bool,
}

impl Bitmap {
    fn new(pixmap: Pixmap) -> Self {
        let opaque = pixmap
            .data_as_u8_slice()
            .chunks_exact(4)
            .all(|pixel| pixel[3] == 255);
        Self {
            pixmap: Arc::new(pixmap),
            opaque,
        }
    }

    pub fn width(&self) -> u32 {
        u32::from(self.pixmap.width())
    }

    pub fn height(&self) -> u32 {
        u32::from(self.pixmap.height())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// True when every pixel has full alpha.
    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    /// Straight-alpha RGBA of one pixel. Panics outside the bitmap.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width() && y < self.height(), "pixel ({x}, {y}) out of bounds");
        pixel_at(&self.pixmap, x, y)
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width(), self.height(), |x, y| Rgba(pixel_at(&self.pixmap, x, y)))
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("opaque", &self.opaque)
            .finish()
    }
}

/// An unscaled blit of opaque rows, applied after the scene is rasterised.
struct RowCopy {
    source: Arc<Pixmap>,
    src_x: usize,
    src_y: usize,
    dst_x: usize,
    dst_y: usize,
    width: usize,
    height: usize,
}

impl RowCopy {
    fn apply(&self, target: &mut [u8], target_width: usize) {
        let source = self.source.data_as_u8_slice();
        let source_width = usize::from(self.source.width());
        let len = self.width * 4;
        for row in 0..self.height {
            let from = ((self.src_y + row) * source_width + self.src_x) * 4;
            let to = ((self.dst_y + row) * target_width + self.dst_x) * 4;
            target[to..to + len].copy_from_slice(&source[from..from + len]);
        }
    }

    fn record(&self, ctx: &mut RenderContext) {
        let (src_x, src_y) = (self.src_x as f64, self.src_y as f64);
        paint_image(
            ctx,
            Arc::clone(&self.source),
            Affine::translate((self.dst_x as f64 - src_x, self.dst_y as f64 - src_y)),
            kurbo::Rect::new(src_x, src_y, src_x + self.width as f64, src_y + self.height as f64),
        );
    }
}

/// Integer span `[lo, hi)` of target pixels whose nearest sample
/// `x + 0.5 + offset` falls in `[start, end)`, and the source shift.
fn copy_span(dst_start: f64, dst_len: f64, limit: f64, offset: f64, start: f64, end: f64) -> (i64, i64, i64) {
    let lo = dst_start
        .round()
        .max(0.0)
        .max((start - 0.5 - offset).ceil());
    let hi = (dst_start + dst_len)
        .round()
        .min(limit)
        .min((end - 0.5 - offset).ceil());
    (lo as i64, hi as i64, (0.5 + offset).floor() as i64)
}

/// Software drawing target. Sizes are limited to `u16::MAX` per side.
pub struct Surface {
    width: u16,
    height: u16,
    pixmap: Pixmap,
    /// `None` while either side is zero.
    scene: Option<RenderContext>,
    glow: Option<RenderContext>,
    copies: Vec<RowCopy>,
    /// The scene holds commands that `pixmap` does not show yet.
    pending: bool,
    /// `pixmap` content that the next scene starts from.
    retained: bool,
    clip: Option<Rect>,
}

impl Surface {
    /// A transparent surface. Zero-sized surfaces accept and ignore drawing.
    pub fn new(width: u32, height: u32) -> Self {
        let width = u16::try_from(width).unwrap_or(u16::MAX);
        let height = u16::try_from(height).unwrap_or(u16::MAX);
        let scene = (width > 0 && height > 0).then(|| RenderContext::new(width, height));
        Self {
            width,
            height,
            pixmap: Pixmap::new(width, height),
            scene,
            glow: None,
            copies: Vec::new(),
            pending: false,
            retained: false,
            clip: None,
        }
    }

    pub fn width(&self) -> u32 {
        u32::from(self.width)
    }

    pub fn height(&self) -> u32 {
        u32::from(self.height)
    }

    /// Resizes and clears. A no-op resize keeps the contents and the clip.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (self.width(), self.height()) != (width, height) {
            let clip = self.clip;
            *self = Self::new(width, height);
            self.clip = clip;
        }
    }

    /// Limits strokes to the part of the surface that will be shown. Geometry
    /// further than its reach outside the clip is skipped; what lies inside
    /// is drawn exactly as without a clip.
    pub fn set_clip(&mut self, clip: Option<Rect>) {
        self.clip = clip;
    }

    pub fn clip(&self) -> Option<Rect> {
        self.clip
    }

    /// Makes every pixel fully transparent.
    pub fn clear(&mut self) {
        if let Some(ctx) = self.scene.as_mut() {
            ctx.reset();
        }
        self.copies.clear();
        self.retained = false;
        self.pending = true;
    }

    /// Overwrites every pixel with `color`.
    pub fn fill(&mut self, color: Color) {
        self.clear();
        let area = kurbo::Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height));
        if let Some(ctx) = self.scene() {
            ctx.set_paint(paint(color));
            ctx.fill_rect(&area);
        }
    }

    pub fn stroke(&mut self, path: &Path, style: &StrokeStyle) {
        if style.color.a == 0 || style.width <= 0.0 || self.scene.is_none() {
            return;
        }

        let (view_x0, view_y0, view_x1, view_y1) = self.view();
        let reach = style.reach();
        let outline = Outline::build(path, view_x0 - reach, view_x1 + reach, style.width / 2.0);
        let Some((min_x, min_y, max_x, max_y)) = outline.bounds else {
            return;
        };
        if max_y + reach < view_y0 || min_y - reach > view_y1 {
            return;
        }

        let radius = style.glow_radius();
        if radius > 0 {
            let spread = style.glow_spread();
            let x0 = (min_x - reach).max(view_x0 - spread).floor();
            let y0 = (min_y - reach).max(view_y0 - spread).floor();
            let x1 = (max_x + reach).min(view_x1 + spread).ceil();
            let y1 = (max_y + reach).min(view_y1 + spread).ceil();
            self.glow(&outline, style, radius, (x0, y0, x1, y1));
        }

        if let Some(ctx) = self.scene() {
            ctx.set_paint(paint(style.color));
            outline.draw(ctx, style.width);
        }
    }

    /// Copies `src_rect` of `source` into `dst_rect`. Both rectangles are
    /// clipped to their images. Unscaled copies of opaque bitmaps bypass the
    /// rasteriser and use nearest sampling.
    pub fn draw_image(&mut self, source: &Bitmap, src_rect: Rect, dst_rect: Rect) {
        if src_rect.is_empty() || dst_rect.is_empty() || self.scene.is_none() {
            return;
        }
        let scale_x = dst_rect.width / src_rect.width;
        let scale_y = dst_rect.height / src_rect.height;
        if source.is_opaque() && (scale_x - 1.0).abs() < 1e-9 && (scale_y - 1.0).abs() < 1e-9 {
            self.queue_copy(source, src_rect, dst_rect);
            return;
        }

        let area = kurbo::Rect::new(
            src_rect.x.max(0.0),
            src_rect.y.max(0.0),
            (src_rect.x + src_rect.width).min(f64::from(source.width())),
            (src_rect.y + src_rect.height).min(f64::from(source.height())),
        );
        if area.width() <= 0.0 || area.height() <= 0.0 {
            return;
        }
        let transform = Affine::translate((
            dst_rect.x - src_rect.x * scale_x,
            dst_rect.y - src_rect.y * scale_y,
        )) * Affine::scale_non_uniform(scale_x, scale_y);
        let image = Arc::clone(&source.pixmap);
        if let Some(ctx) = self.scene() {
            paint_image(ctx, image, transform, area);
        }
    }

    /// Moves the pixels out, leaving a cleared surface of the same size.
    pub fn snapshot(&mut self) -> Bitmap {
        self.render();
        self.retained = false;
        Bitmap::new(std::mem::replace(
            &mut self.pixmap,
            Pixmap::new(self.width, self.height),
        ))
    }

    /// Straight-alpha RGBA of one pixel. Panics outside the surface.
    pub fn pixel(&mut self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width() && y < self.height(), "pixel ({x}, {y}) out of bounds");
        self.render();
        pixel_at(&self.pixmap, x, y)
    }

    /// An opaque copy of the surface flattened over `background`.
    pub fn to_rgba_image(&mut self, background: Color) -> RgbaImage {
        let mut words = Vec::new();
        self.write_argb(&mut words, background);
        let width = self.width();
        RgbaImage::from_fn(width, self.height(), |x, y| {
            let [_, r, g, b] = words[(y * width + x) as usize].to_be_bytes();
            Rgba([r, g, b, 255])
        })
    }

    /// Writes the surface as `0RGB` words over an opaque `background`.
    pub fn write_argb(&mut self, out: &mut Vec<u32>, background: Color) {
        self.render();
        let under = |premul: u8, alpha: u8, back: u8| {
            let value = u32::from(premul) + (u32::from(back) * (255 - u32::from(alpha)) + 127) / 255;
            value.min(255)
        };
        out.clear();
        out.extend(self.pixmap.data_as_u8_slice().chunks_exact(4).map(|pixel| {
            let alpha = pixel[3];
            (under(pixel[0], alpha, background.r) << 16)
                | (under(pixel[1], alpha, background.g) << 8)
                | under(pixel[2], alpha, background.b)
        }));
    }

    /// Visible area: the clip within the surface.
    fn view(&self) -> Bounds {
        let (width, height) = (f64::from(self.width), f64::from(self.height));
        match self.clip {
            Some(clip) => (
                clip.x.max(0.0),
                clip.y.max(0.0),
                (clip.x + clip.width).min(width),
                (clip.y + clip.height).min(height),
            ),
            None => (0.0, 0.0, width, height),
        }
    }

    /// Marks the pixmap stale, carrying its content into the scene.
    fn touch(&mut self) {
        if self.pending {
            return;
        }
        self.pending = true;
        if !self.retained {
            return;
        }
        if let Some(ctx) = self.scene.as_mut() {
            let base = std::mem::replace(&mut self.pixmap, Pixmap::new(self.width, self.height));
            let area = kurbo::Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height));
            paint_image(ctx, Arc::new(base), Affine::IDENTITY, area);
        }
    }

    /// The scene, ready for commands drawn above everything so far.
    fn scene(&mut self) -> Option<&mut RenderContext> {
        self.touch();
        let ctx = self.scene.as_mut()?;
        for copy in self.copies.drain(..) {
            copy.record(ctx);
        }
        Some(ctx)
    }

    fn queue_copy(&mut self, source: &Bitmap, src_rect: Rect, dst_rect: Rect) {
        let (x_lo, x_hi, shift_x) = copy_span(
            dst_rect.x,
            dst_rect.width,
            f64::from(self.width),
            src_rect.x - dst_rect.x,
            src_rect.x.max(0.0),
            (src_rect.x + src_rect.width).min(f64::from(source.width())),
        );
        let (y_lo, y_hi, shift_y) = copy_span(
            dst_rect.y,
            dst_rect.height,
            f64::from(self.height),
            src_rect.y - dst_rect.y,
            src_rect.y.max(0.0),
            (src_rect.y + src_rect.height).min(f64::from(source.height())),
        );
        if x_lo >= x_hi || y_lo >= y_hi {
            return;
        }
        self.touch();
        self.copies.push(RowCopy {
            source: Arc::clone(&source.pixmap),
            src_x: (x_lo + shift_x) as usize,
            src_y: (y_lo + shift_y) as usize,
            dst_x: x_lo as usize,
            dst_y: y_lo as usize,
            width: (x_hi - x_lo) as usize,
            height: (y_hi - y_lo) as usize,
        });
    }

    /// Renders `outline` as coverage into `region`, blurs it and records the
    /// tinted result beneath whatever is drawn next.
    fn glow(&mut self, outline: &Outline, style: &StrokeStyle, radius: usize, region: Bounds) {
        let (x0, y0, x1, y1) = region;
        let width = (x1 - x0).clamp(0.0, f64::from(u16::MAX)) as u16;
        let height = (y1 - y0).clamp(0.0, f64::from(u16::MAX)) as u16;
        if width == 0 || height == 0 {
            return;
        }

        let reuse = matches!(&self.glow, Some(ctx) if ctx.width() == width && ctx.height() == height);
        if !reuse {
            self.glow = Some(RenderContext::new(width, height));
        }
        let Some(ctx) = self.glow.as_mut() else {
            return;
        };
        ctx.reset();
        ctx.set_transform(Affine::translate((-x0, -y0)));
        ctx.set_paint(peniko::Color::from_rgba8(255, 255, 255, 255));
        outline.draw(ctx, style.width);
        ctx.flush();
        let mut coverage = Pixmap::new(width, height);
        ctx.render_to_pixmap(&mut coverage);

        let mut mask = CoverageMask::from_alpha(
            usize::from(width),
            usize::from(height),
            coverage.data_as_u8_slice(),
        );
        mask.blur(radius);
        let tinted = Pixmap::from_parts_with_opacity(mask.tint(style.color), width, height, true);

        if let Some(ctx) = self.scene() {
            paint_image(
                ctx,
                Arc::new(tinted),
                Affine::translate((x0, y0)),
                kurbo::Rect::new(0.0, 0.0, f64::from(width), f64::from(height)),
            );
        }
    }

    /// Rasterises pending commands into the pixmap.
    fn render(&mut self) {
        if !self.pending {
            return;
        }
        self.pending = false;
        self.retained = true;
        let Some(ctx) = self.scene.as_mut() else {
            return;
        };
        self.pixmap.data_as_u8_slice_mut().fill(0);
        ctx.flush();
        ctx.render_to_pixmap(&mut self.pixmap);
        ctx.reset();

        let target_width = usize::from(self.width);
        let target = self.pixmap.data_as_u8_slice_mut();
        for copy in self.copies.drain(..) {
            copy.apply(target, target_width);
        }
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pending", &self.pending)
            .field("queued_copies", &self.copies.len())
            .field("clip", &self.clip)
            .finish()
    }
}
