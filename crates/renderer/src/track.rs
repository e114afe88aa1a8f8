//! Stroking of lines and the rift band.

use performance::{Color, Line, PerformanceModel, Point};
use tracing::warn;

use crate::geometry::{Coords, Projection, Rift, ViewWindow};
use crate::surface::{Path, Rect, StrokeStyle, Surface};

/// One stroke pass of every line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlowPass {
    pub width: f64,
    pub blur: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackStyle {
    /// Passes are drawn in order, each over the previous.
    pub passes: Vec<GlowPass>,
    pub rift_width: f64,
}

impl Default for TrackStyle {
    fn default() -> Self {
        Self {
            passes: vec![
                GlowPass {
                    width: 6.0,
                    blur: 40.0,
                },
                GlowPass {
                    width: 6.0,
                    blur: 10.0,
                },
            ],
            rift_width: 24.0,
        }
    }
}

/// Window of point indices worth drawing for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineCursor {
    pub start: usize,
    pub end: usize,
}

/// Moves `cursor` to the smallest index range covering `[start_x, end_x]`,
/// keeping one point past each edge when there is one.
///
/// Both ends scan from where they were left, so consecutive frames only pay
/// for the points that scrolled in or out.
pub fn advance_cursor(
    points: &[Point],
    cursor: LineCursor,
    projection: &Projection,
    start_x: f64,
    end_x: f64,
) -> LineCursor {
    let Some(last) = points.len().checked_sub(1) else {
        return LineCursor::default();
    };
    let x = |index: usize| projection.x_at(points[index].time);
    let mut start = cursor.start.min(last);
    let mut end = cursor.end.min(last);

    while start < last && x(start) < start_x {
        start += 1;
    }
    while start > 0 && x(start) > start_x {
        start -= 1;
    }
    while end > 0 && x(end) > end_x {
        end -= 1;
    }
    while end < last && x(end) < end_x {
        end += 1;
    }

    LineCursor {
        start,
        end: end.max(start),
    }
}

/// Sub-paths of the points inside `cursor`.
///
/// A new sub-path opens at every onset and closes at every offset. With a
/// rift boundary, a final vertex past it is pulled back onto the boundary.
pub fn track_paths(
    points: &[Point],
    cursor: LineCursor,
    projection: &Projection,
    rift_end: Option<f64>,
) -> Vec<Path> {
    let visible = &points[cursor.start..=cursor.end];
    let last = visible.len() - 1;
    let mut paths = Vec::new();
    let mut path = Path::new();

    for (index, point) in visible.iter().enumerate() {
        let Coords { x, y } = projection.point_coords(point);
        if point.is_start {
            path = Path::new();
            path.move_to(x, y);
        } else {
            match rift_end {
                Some(boundary) if index == last && cursor.end != 0 && x > boundary => {
                    let tail = &points[cursor.end - 1..=cursor.end];
                    if let Some(height) = projection.interpolate_height(tail, boundary) {
                        path.line_to(boundary, height);
                    }
                }
                _ => path.line_to(x, y),
            }
        }
        if point.is_end {
            paths.push(std::mem::take(&mut path));
        }
    }
    if !points[cursor.end].is_end && !path.is_empty() {
        paths.push(path);
    }
    paths
}

/// One stroke of the rift band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiftMark {
    pub from: Coords,
    pub to: Coords,
    /// Opacity multiplier for the line colour.
    pub alpha: f64,
}

/// Marks for each column of the rift band where the line's height changes,
/// fading in toward the boundary, plus an opaque dot on the boundary itself.
pub fn rift_marks(
    points: &[Point],
    cursor: LineCursor,
    projection: &Projection,
    rift: Rift,
) -> Vec<RiftMark> {
    if cursor.end == 0 || rift.pixels == 0 {
        return Vec::new();
    }
    let visible = &points[cursor.start..=cursor.end];
    let pixels = f64::from(rift.pixels);
    let mut marks = Vec::new();

    for column in 0..rift.pixels {
        let x = rift.end_x - pixels + f64::from(column);
        let here = projection.interpolate_height(visible, x);
        let next = projection.interpolate_height(visible, x + 1.0);

        if here != next {
            if let (Some(y1), Some(y2)) = (here, next) {
                marks.push(RiftMark {
                    from: Coords { x, y: y1 },
                    to: Coords { x: x + 1.0, y: y2 },
                    alpha: 1.0 - (rift.end_x - x) / pixels,
                });
            }
        }
        if column + 1 == rift.pixels {
            if let Some(y) = next {
                let edge = Coords { x: x + 1.0, y };
                marks.push(RiftMark {
                    from: edge,
                    to: edge,
                    alpha: 1.0,
                });
            }
        }
    }
    marks
}

/// Draws whole scenes, keeping a cursor per line between calls.
#[derive(Debug, Clone, Default)]
pub struct TrackRenderer {
    style: TrackStyle,
    cursors: Vec<LineCursor>,
}

impl TrackRenderer {
    /// A renderer with no cursors yet; they are sized on the first scene.
    pub fn new(style: TrackStyle) -> Self {
        Self {
            style,
            cursors: Vec::new(),
        }
    }

    pub fn style(&self) -> &TrackStyle {
        &self.style
    }

    /// Cursor of each line as left by the last scene.
    pub fn cursors(&self) -> &[LineCursor] {
        &self.cursors
    }

    /// Forgets every cursor; call when the model changes.
    pub fn reset(&mut self) {
        self.cursors.clear();
    }

    /// Draws every line of `model` for `window`. Returns how many lines
    /// produced geometry.
    ///
    /// Drawing is clipped to the window's x range, so a narrow window costs
    /// only its own width.
    pub fn render_scene(
        &mut self,
        model: &PerformanceModel,
        surface: &mut Surface,
        window: &ViewWindow,
    ) -> usize {
        let projection = match Projection::new(window, model.min_note, model.max_note) {
            Ok(projection) => projection,
            Err(err) => {
                warn!(%err, "skipping scene");
                return 0;
            }
        };

        let previous_clip = surface.clip();
        surface.set_clip(Some(Rect::new(
            window.start_x,
            0.0,
            window.end_x - window.start_x,
            f64::from(surface.height()),
        )));

        self.cursors.resize(model.lines.len(), LineCursor::default());
        let mut drawn = 0;
        for (line, cursor) in model.lines.iter().zip(self.cursors.iter_mut()) {
            if line.points.len() < 2 {
                continue;
            }
            *cursor = advance_cursor(
                &line.points,
                *cursor,
                &projection,
                window.start_x,
                window.end_x,
            );
            draw_line(surface, line, *cursor, &projection, window.rift, &self.style);
            drawn += 1;
        }
        surface.set_clip(previous_clip);
        drawn
    }
}

fn draw_line(
    surface: &mut Surface,
    line: &Line,
    cursor: LineCursor,
    projection: &Projection,
    rift: Option<Rift>,
    style: &TrackStyle,
) {
    let mut trace = Path::new();
    for path in track_paths(
        &line.points,
        cursor,
        projection,
        rift.map(|rift| rift.end_x),
    ) {
        trace.append(path);
    }
    for pass in &style.passes {
        let stroke = StrokeStyle::new(line.base_color, pass.width).with_blur(pass.blur);
        surface.stroke(&trace, &stroke);
    }

    let Some(rift) = rift else {
        return;
    };
    for mark in rift_marks(&line.points, cursor, projection, rift) {
        let color: Color = line.color_with_alpha(mark.alpha);
        let mut path = Path::new();
        path.move_to(mark.from.x, mark.from.y);
        path.line_to(mark.to.x, mark.to.y);
        surface.stroke(&path, &StrokeStyle::new(color, style.rift_width));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(time: f64) -> ViewWindow {
        ViewWindow {
            time,
            start_x: 0.0,
            end_x: 200.0,
            min_y: 20.0,
            max_y: 80.0,
            px_per_sec: 100.0,
            anchor_x: 0.0,
            rift: None,
        }
    }

    fn projection(time: f64) -> Projection {
        Projection::new(&window(time), 60.0, 72.0).unwrap()
    }

    fn points_at(times: &[f64]) -> Vec<Point> {
        let last = times.len() - 1;
        times
            .iter()
            .enumerate()
            .map(|(i, &time)| Point::new(time, 60.0 + i as f64 % 12.0, i == 0, i == last))
            .collect()
    }

    fn check_minimal(points: &[Point], cursor: LineCursor, projection: &Projection, start_x: f64, end_x: f64) {
        let last = points.len() - 1;
        let x = |i: usize| projection.x_at(points[i].time);
        assert!(cursor.start <= cursor.end && cursor.end <= last);
        assert!(cursor.start == 0 || x(cursor.start) <= start_x, "{cursor:?} misses start");
        assert!(cursor.start == last || x(cursor.start + 1) >= start_x, "{cursor:?} wide at start");
        assert!(cursor.end == last || x(cursor.end) >= end_x, "{cursor:?} misses end");
        assert!(cursor.end == 0 || x(cursor.end - 1) <= end_x, "{cursor:?} wide at end");
    }

    #[test]
    fn cursor_narrows_from_any_start() {
        let times: Vec<f64> = (0..30).map(|i| f64::from(i) * 0.13 + f64::from(i % 3) * 0.01).collect();
        let points = points_at(&times);
        let projection = projection(0.0);
        for (start_x, end_x) in [(0.0, 200.0), (50.0, 120.0), (-40.0, 10.0), (300.0, 500.0), (133.0, 133.0)] {
            for from_start in 0..points.len() {
                for from_end in [0, from_start, points.len() - 1, points.len() + 5] {
                    let cursor = LineCursor {
                        start: from_start,
                        end: from_end,
                    };
                    let moved = advance_cursor(&points, cursor, &projection, start_x, end_x);
                    check_minimal(&points, moved, &projection, start_x, end_x);
                }
            }
        }
    }

    #[test]
    fn cursor_follows_scrolling_time() {
        let times: Vec<f64> = (0..50).map(|i| f64::from(i) * 0.25).collect();
        let points = points_at(&times);
        let mut cursor = LineCursor::default();
        let mut previous = cursor;
        for frame in 0..120 {
            let time = f64::from(frame) * 0.1;
            let projection = projection(time);
            cursor = advance_cursor(&points, cursor, &projection, 0.0, 200.0);
            check_minimal(&points, cursor, &projection, 0.0, 200.0);
            assert!(cursor.start >= previous.start && cursor.end >= previous.end);
            previous = cursor;
        }
    }

    #[test]
    fn empty_points_reset_the_cursor() {
        let cursor = advance_cursor(&[], LineCursor { start: 3, end: 9 }, &projection(0.0), 0.0, 10.0);
        assert_eq!(cursor, LineCursor::default());
    }

    #[test]
    fn paths_split_at_rests() {
        let points = vec![
            Point::new(0.0, 60.0, true, false),
            Point::new(0.5, 62.0, false, true),
            Point::new(1.0, 64.0, true, false),
            Point::new(1.5, 64.0, false, false),
            Point::new(1.8, 66.0, false, false),
        ];
        let cursor = LineCursor { start: 0, end: 4 };
        let paths = track_paths(&points, cursor, &projection(0.0), None);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].subpaths()[0].len(), 2);
        assert_eq!(paths[1].subpaths()[0].len(), 3);
    }

    #[test]
    fn window_opening_mid_segment_starts_at_first_point() {
        let points = vec![
            Point::new(0.0, 60.0, true, false),
            Point::new(0.5, 62.0, false, false),
            Point::new(1.0, 64.0, false, true),
        ];
        let paths = track_paths(&points, LineCursor { start: 1, end: 2 }, &projection(0.0), None);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].subpaths()[0][0].0, 50.0);
    }

    #[test]
    fn final_vertex_snaps_to_the_rift() {
        let points = vec![
            Point::new(0.0, 60.0, true, false),
            Point::new(2.0, 72.0, false, true),
        ];
        let paths = track_paths(&points, LineCursor { start: 0, end: 1 }, &projection(0.0), Some(100.0));
        let vertices = &paths[0].subpaths()[0];
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1].0, 100.0);
        assert!((vertices[1].1 - 50.0).abs() < 1e-9);
    }

    #[test]
    fn undefined_snap_height_omits_the_vertex() {
        let points = vec![
            Point::new(0.0, 60.0, true, true),
            Point::new(0.2, 60.0, true, false),
            Point::new(2.0, 72.0, false, true),
        ];
        // The snap only looks at the last two points; with them starting past
        // the boundary no height exists there.
        let mut view = window(0.0);
        view.anchor_x = -50.0;
        let projection = Projection::new(&view, 60.0, 72.0).unwrap();
        let paths = track_paths(&points, LineCursor { start: 1, end: 2 }, &projection, Some(-40.0));
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].subpaths()[0].len(), 1);
    }

    #[test]
    fn flat_columns_only_get_the_boundary_marker() {
        let points = vec![
            Point::new(0.0, 64.0, true, false),
            Point::new(2.0, 64.0, false, true),
        ];
        let rift = Rift {
            end_x: 100.0,
            pixels: 10,
        };
        let marks = rift_marks(&points, LineCursor { start: 0, end: 1 }, &projection(0.0), rift);
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].from, marks[0].to);
        assert_eq!(marks[0].from.x, 100.0);
        assert_eq!(marks[0].alpha, 1.0);
    }

    #[test]
    fn sloped_columns_fade_toward_the_far_edge() {
        let points = vec![
            Point::new(0.0, 60.0, true, false),
            Point::new(2.0, 72.0, false, true),
        ];
        let rift = Rift {
            end_x: 100.0,
            pixels: 10,
        };
        let marks = rift_marks(&points, LineCursor { start: 0, end: 1 }, &projection(0.0), rift);
        assert_eq!(marks.len(), 11);
        assert_eq!(marks[0].alpha, 0.0);
        assert!((marks[9].alpha - 0.9).abs() < 1e-9);
        assert!(marks.windows(2).take(9).all(|pair| pair[0].alpha < pair[1].alpha));
        assert_eq!(marks[10].alpha, 1.0);
    }

    #[test]
    fn cursor_at_zero_draws_no_rift() {
        let points = vec![
            Point::new(5.0, 60.0, true, false),
            Point::new(6.0, 72.0, false, true),
        ];
        let rift = Rift {
            end_x: 100.0,
            pixels: 10,
        };
        assert!(rift_marks(&points, LineCursor::default(), &projection(0.0), rift).is_empty());
    }

    #[test]
    fn scene_skips_short_lines_and_bad_ranges() {
        let mut model = PerformanceModel {
            duration: 2.0,
            min_note: 60.0,
            max_note: 72.0,
            lines: vec![
                Line::new(
                    vec![
                        Point::new(0.0, 60.0, true, false),
                        Point::new(1.5, 72.0, false, true),
                    ],
                    Color::rgb(255, 0, 0),
                ),
                Line::new(vec![Point::new(0.5, 66.0, true, true)], Color::rgb(0, 255, 0)),
            ],
        };
        let mut surface = Surface::new(200, 100);
        surface.fill(Color::rgb(0, 0, 0));
        let mut renderer = TrackRenderer::new(TrackStyle::default());

        assert_eq!(renderer.render_scene(&model, &mut surface, &window(0.0)), 1);
        assert_eq!(renderer.cursors().len(), 2);
        assert!(surface.pixel(75, 50)[0] > 200);
        assert_eq!(surface.clip(), None);

        model.max_note = model.min_note;
        assert_eq!(renderer.render_scene(&model, &mut surface, &window(0.0)), 0);
    }

    #[test]
    fn narrow_window_skips_glow_far_from_it() {
        let model = PerformanceModel {
            duration: 2.0,
            min_note: 60.0,
            max_note: 72.0,
            lines: vec![Line::new(
                vec![
                    Point::new(0.0, 66.0, true, false),
                    Point::new(2.0, 66.0, false, true),
                ],
                Color::rgb(255, 0, 0),
            )],
        };
        let render = |end_x: f64| {
            let mut view = window(0.0);
            view.end_x = end_x;
            let mut surface = Surface::new(400, 100);
            surface.fill(Color::rgb(0, 0, 0));
            TrackRenderer::new(TrackStyle::default()).render_scene(&model, &mut surface, &view);
            surface
        };

        let mut wide = render(400.0);
        let mut narrow = render(20.0);
        assert!(wide.pixel(150, 35)[0] > 0);
        assert_eq!(narrow.pixel(150, 35), [0, 0, 0, 255]);
        assert!(narrow.pixel(10, 50)[0] > 200);
        assert!(narrow.pixel(10, 35)[0] > 0);
    }
}
