//! Glow masks: coverage taken from a rendered stroke, softened with a box
//! blur and tinted back into premultiplied pixels.

use vello_cpu::peniko::color::PremulRgba8;

use performance::Color;

#[derive(Debug, Clone)]
pub(crate) struct CoverageMask {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl CoverageMask {
    /// Reads coverage from the alpha channel of premultiplied RGBA bytes.
    pub fn from_alpha(width: usize, height: usize, rgba: &[u8]) -> Self {
        let values = rgba
            .chunks_exact(4)
            .take(width * height)
            .map(|pixel| f32::from(pixel[3]) / 255.0)
            .collect();
        Self {
            width,
            height,
            values,
        }
    }

    #[cfg(test)]
    fn value(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    /// Three box passes per axis; approximates a gaussian with sigma close to
    /// `radius`. Values outside the mask count as zero.
    pub fn blur(&mut self, radius: usize) {
        if radius == 0 || self.values.is_empty() {
            return;
        }
        let mut scratch = vec![0.0f32; self.values.len()];
        for _ in 0..3 {
            box_pass(&self.values, &mut scratch, self.width, self.height, radius, Axis::Horizontal);
            box_pass(&scratch, &mut self.values, self.width, self.height, radius, Axis::Vertical);
        }
    }

    /// `color` scaled by coverage, as premultiplied pixels in row order.
    pub fn tint(&self, color: Color) -> Vec<PremulRgba8> {
        let alpha = f32::from(color.a) / 255.0;
        let channel = |value: u8, scale: f32| (f32::from(value) * scale).round().clamp(0.0, 255.0) as u8;
        self.values
            .iter()
            .map(|&coverage| {
                let scale = alpha * coverage.clamp(0.0, 1.0);
                PremulRgba8::from_u8_array([
                    channel(color.r, scale),
                    channel(color.g, scale),
                    channel(color.b, scale),
                    channel(255, scale),
                ])
            })
            .collect()
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn box_pass(src: &[f32], dst: &mut [f32], width: usize, height: usize, radius: usize, axis: Axis) {
    let (lanes, span, stride, lane_step) = match axis {
        Axis::Horizontal => (height, width, 1, width),
        Axis::Vertical => (width, height, width, 1),
    };
    let window = (2 * radius + 1) as f32;

    for lane in 0..lanes {
        let base = lane * lane_step;
        let at = |step: usize| base + step * stride;
        let mut sum: f32 = (0..=radius.min(span - 1)).map(|step| src[at(step)]).sum();
        for step in 0..span {
            dst[at(step)] = sum / window;
            let add = step + radius + 1;
            if add < span {
                sum += src[at(add)];
            }
            if step >= radius {
                sum -= src[at(step - radius)];
            }
        }
    }
}
