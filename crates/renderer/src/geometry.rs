//! Time/pitch to screen mapping.
//!
//! Time runs left to right at `px_per_sec`, with the window's `time` sitting
//! at `anchor_x`. Pitch runs bottom to top between `max_y` and `min_y`.

use performance::Point;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coords {
    pub x: f64,
    pub y: f64,
}

/// Fading boundary drawn where new notes enter the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rift {
    /// Screen column of the boundary.
    pub end_x: f64,
    /// Width of the fade band in pixels.
    pub pixels: u32,
}

/// Parameters of a single render call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewWindow {
    pub time: f64,
    /// Leftmost x that still needs geometry.
    pub start_x: f64,
    /// Rightmost x that still needs geometry.
    pub end_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub px_per_sec: f64,
    /// Screen x at which `time` sits.
    pub anchor_x: f64,
    pub rift: Option<Rift>,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("note range [{min}, {max}] is empty; max must exceed min")]
    DegenerateNoteRange { min: f64, max: f64 },
}

/// A validated mapping from (time, note) to screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    time: f64,
    px_per_sec: f64,
    anchor_x: f64,
    min_y: f64,
    max_y: f64,
    min_note: f64,
    note_span: f64,
}

impl Projection {
    /// Fails when the note range is empty, inverted or not finite.
    pub fn new(window: &ViewWindow, min_note: f64, max_note: f64) -> Result<Self, GeometryError> {
        let note_span = max_note - min_note;
        if !note_span.is_finite() || note_span <= 0.0 {
            return Err(GeometryError::DegenerateNoteRange {
                min: min_note,
                max: max_note,
            });
        }
        Ok(Self {
            time: window.time,
            px_per_sec: window.px_per_sec,
            anchor_x: window.anchor_x,
            min_y: window.min_y,
            max_y: window.max_y,
            min_note,
            note_span,
        })
    }

    /// Screen x of `time`; the window's own time lands on `anchor_x`.
    pub fn x_at(&self, time: f64) -> f64 {
        (time - self.time) * self.px_per_sec + self.anchor_x
    }

    /// Screen y of `note`. Higher notes sit closer to the top.
    pub fn y_at(&self, note: f64) -> f64 {
        let proportion = (note - self.min_note) / self.note_span;
        self.max_y - proportion * (self.max_y - self.min_y)
    }

    pub fn point_coords(&self, point: &Point) -> Coords {
        Coords {
            x: self.x_at(point.time),
            y: self.y_at(point.note),
        }
    }

    /// Index `i` with `x_i < x <= x_{i+1}`, if any.
    ///
    /// Mapped x must be non-decreasing along `points`.
    pub fn find_boundary(&self, points: &[Point], x: f64) -> Option<usize> {
        if points.len() < 2 {
            return None;
        }
        let upper = 1 + points[1..].partition_point(|point| self.x_at(point.time) < x);
        if upper >= points.len() {
            return None;
        }
        let index = upper - 1;
        (self.x_at(points[index].time) < x).then_some(index)
    }

    /// Height of the polyline at `x`, or `None` where no drawn segment spans
    /// it (outside the points, or across a rest).
    pub fn interpolate_height(&self, points: &[Point], x: f64) -> Option<f64> {
        let index = self.find_boundary(points, x)?;
        let (first, second) = (&points[index], &points[index + 1]);
        if first.is_end || second.is_start {
            return None;
        }
        let a = self.point_coords(first);
        let b = self.point_coords(second);
        Some(a.y + (b.y - a.y) * ((x - a.x) / (b.x - a.x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(time: f64, px_per_sec: f64) -> ViewWindow {
        ViewWindow {
            time,
            start_x: 0.0,
            end_x: 800.0,
            min_y: 100.0,
            max_y: 500.0,
            px_per_sec,
            anchor_x: 0.0,
            rift: None,
        }
    }

    fn scenario_points() -> Vec<Point> {
        vec![
            Point::new(0.0, 60.0, true, false),
            Point::new(1.0, 64.0, false, false),
            Point::new(2.0, 60.0, false, true),
        ]
    }

    #[test]
    fn rejects_degenerate_note_range() {
        let err = Projection::new(&window(0.0, 100.0), 64.0, 64.0).unwrap_err();
        assert_eq!(
            err,
            GeometryError::DegenerateNoteRange {
                min: 64.0,
                max: 64.0
            }
        );
        assert!(Projection::new(&window(0.0, 100.0), 70.0, 60.0).is_err());
        assert!(Projection::new(&window(0.0, 100.0), 60.0, f64::NAN).is_err());
    }

    #[test]
    fn heights_stay_inside_the_band() {
        let projection = Projection::new(&window(0.0, 100.0), 21.0, 108.0).unwrap();
        for step in 0..=870 {
            let note = 21.0 + f64::from(step) / 10.0;
            let y = projection.point_coords(&Point::new(0.0, note, true, false)).y;
            assert!((100.0..=500.0).contains(&y), "note {note} mapped to {y}");
        }
        assert_eq!(projection.y_at(21.0), 500.0);
        assert_eq!(projection.y_at(108.0), 100.0);
    }

    #[test]
    fn anchor_offsets_time() {
        let mut view = window(10.0, 50.0);
        view.anchor_x = 640.0;
        let projection = Projection::new(&view, 60.0, 72.0).unwrap();
        assert_eq!(projection.x_at(10.0), 640.0);
        assert_eq!(projection.x_at(12.0), 740.0);
        assert_eq!(projection.x_at(8.0), 540.0);
    }

    #[test]
    fn scenario_top_note_and_midpoint() {
        let points = scenario_points();
        let projection = Projection::new(&window(0.0, 100.0), 60.0, 64.0).unwrap();

        let peak = projection.point_coords(&points[1]);
        assert_eq!(peak, Coords { x: 100.0, y: 100.0 });

        let halfway = projection.interpolate_height(&points, 50.0).unwrap();
        assert!((halfway - 300.0).abs() < 1e-9);
    }

    #[test]
    fn find_boundary_brackets_x() {
        let points = scenario_points();
        let projection = Projection::new(&window(0.0, 100.0), 60.0, 64.0).unwrap();
        assert_eq!(projection.find_boundary(&points, 0.0), None);
        assert_eq!(projection.find_boundary(&points, 0.5), Some(0));
        assert_eq!(projection.find_boundary(&points, 100.0), Some(0));
        assert_eq!(projection.find_boundary(&points, 100.5), Some(1));
        assert_eq!(projection.find_boundary(&points, 200.0), Some(1));
        assert_eq!(projection.find_boundary(&points, 200.5), None);
        assert_eq!(projection.find_boundary(&points[..1], 0.5), None);
    }

    #[test]
    fn find_boundary_is_monotonic() {
        let points: Vec<Point> = (0..40)
            .map(|i| Point::new(f64::from(i / 2) * 0.3, 60.0, i % 4 == 0, i % 4 == 3))
            .collect();
        let projection = Projection::new(&window(0.0, 70.0), 50.0, 70.0).unwrap();
        let mut previous = None;
        for step in 0..900 {
            let x = f64::from(step) * 0.5 - 10.0;
            let found = projection.find_boundary(&points, x);
            if let (Some(before), Some(now)) = (previous, found) {
                assert!(now >= before, "boundary went back at x={x}");
            }
            if found.is_some() {
                previous = found;
            }
        }
    }

    #[test]
    fn interpolation_is_continuous_at_samples() {
        let points = vec![
            Point::new(0.0, 60.0, true, false),
            Point::new(0.7, 67.0, false, false),
            Point::new(1.3, 62.5, false, false),
            Point::new(2.0, 71.0, false, true),
        ];
        let projection = Projection::new(&window(0.0, 90.0), 60.0, 72.0).unwrap();
        for point in &points[1..] {
            let coords = projection.point_coords(point);
            let height = projection.interpolate_height(&points, coords.x).unwrap();
            assert!((height - coords.y).abs() < 1e-9);
        }
    }

    #[test]
    fn rests_have_no_height() {
        let points = vec![
            Point::new(0.0, 60.0, true, false),
            Point::new(1.0, 60.0, false, true),
            Point::new(1.5, 62.0, true, false),
            Point::new(2.5, 62.0, false, true),
        ];
        let projection = Projection::new(&window(0.0, 100.0), 60.0, 62.0).unwrap();
        for step in 1..50 {
            let x = 100.0 + f64::from(step);
            assert_eq!(projection.interpolate_height(&points, x), None, "x={x}");
        }
        assert_eq!(projection.interpolate_height(&points, 100.0), Some(500.0));
        assert!(projection.interpolate_height(&points, 200.0).is_some());
    }
}
