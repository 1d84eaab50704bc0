//! Synthetic photographs for the integration tests.
//!
//! Scenes are described in a 640x480 coordinate frame and rasterized by
//! sampling each pixel centre, so an axis-aligned edge at `x = 140.0`
//! makes pixel column 140 the first one inside. Rotation turns the whole
//! scene about its centre.

#![allow(dead_code, clippy::unwrap_used)]

use image::GrayImage;

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
pub const CENTER: (f64, f64) = (320.0, 240.0);

pub const BACKGROUND: u8 = 230;
pub const FRAME: u8 = 40;

/// Outer frame size in scene pixels.
pub const FRAME_WIDTH: f64 = 360.0;
pub const FRAME_HEIGHT: f64 = 240.0;
pub const FRAME_THICKNESS: f64 = 10.0;

pub const MARKER_PX: f64 = 80.0;
pub const MARKER_MM: f64 = 100.0;

const BITS: [[u8; 4]; 4] = [[1, 0, 0, 1], [0, 1, 1, 0], [1, 1, 0, 1], [0, 1, 0, 0]];

#[derive(Debug, Clone, Copy)]
pub struct Marker {
    pub x: f64,
    pub y: f64,
    pub side: f64,
}

impl Marker {
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            side: MARKER_PX,
        }
    }

    fn value_at(&self, x: f64, y: f64) -> Option<u8> {
        let (u, v) = ((x - self.x) / self.side, (y - self.y) / self.side);
        if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (cx, cy) = ((u * 6.0) as usize, (v * 6.0) as usize);
        let white = (1..=4).contains(&cx) && (1..=4).contains(&cy) && BITS[cy - 1][cx - 1] == 1;
        Some(if white { 255 } else { 0 })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Outline {
    /// Rectangular frame centred in the scene.
    Frame,
    /// Triangular frame, which no window fit should accept.
    Triangle,
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub rotation_deg: f64,
    /// Output pixels per scene pixel.
    pub scale: u32,
    pub outline: Option<Outline>,
    pub markers: Vec<Marker>,
}

const TRIANGLE: [(f64, f64); 3] = [(100.0, 420.0), (540.0, 420.0), (320.0, 90.0)];

impl Scene {
    /// A framed window with one marker in the upper-left of the pane.
    pub fn window() -> Self {
        Self {
            rotation_deg: 0.0,
            scale: 1,
            outline: Some(Outline::Frame),
            markers: vec![Marker::new(180.0, 150.0)],
        }
    }

    /// A framed window with markers in opposite pane corners.
    pub fn window_with_pair() -> Self {
        Self {
            markers: vec![Marker::new(160.0, 140.0), Marker::new(400.0, 260.0)],
            ..Self::window()
        }
    }

    #[must_use]
    pub fn rotated(mut self, degrees: f64) -> Self {
        self.rotation_deg = degrees;
        self
    }

    fn value_at(&self, x: f64, y: f64) -> u8 {
        if let Some(v) = self.markers.iter().find_map(|m| m.value_at(x, y)) {
            return v;
        }
        let dark = match self.outline {
            Some(Outline::Frame) => in_frame(x, y),
            Some(Outline::Triangle) => in_triangle_outline(x, y),
            None => false,
        };
        if dark { FRAME } else { BACKGROUND }
    }

    pub fn render(&self) -> GrayImage {
        let s = f64::from(self.scale);
        let (sin, cos) = self.rotation_deg.to_radians().sin_cos();
        GrayImage::from_fn(WIDTH * self.scale, HEIGHT * self.scale, |px, py| {
            let x = (f64::from(px) + 0.5) / s - CENTER.0;
            let y = (f64::from(py) + 0.5) / s - CENTER.1;
            // Inverse rotation back into the scene frame.
            let sx = x.mul_add(cos, y * sin) + CENTER.0;
            let sy = y.mul_add(cos, -x * sin) + CENTER.1;
            image::Luma([self.value_at(sx, sy)])
        })
    }

    pub fn png(&self) -> Vec<u8> {
        encode_png(&self.render())
    }
}

fn in_frame(x: f64, y: f64) -> bool {
    let (hw, hh) = (FRAME_WIDTH / 2.0, FRAME_HEIGHT / 2.0);
    let (dx, dy) = ((x - CENTER.0).abs(), (y - CENTER.1).abs());
    let outer = dx < hw && dy < hh;
    let inner = dx < hw - FRAME_THICKNESS && dy < hh - FRAME_THICKNESS;
    outer && !inner
}

fn in_triangle_outline(x: f64, y: f64) -> bool {
    let mut min_distance = f64::INFINITY;
    for i in 0..3 {
        let (ax, ay) = TRIANGLE[i];
        let (bx, by) = TRIANGLE[(i + 1) % 3];
        let (ex, ey) = (bx - ax, by - ay);
        // With y pointing down the interior is on the positive side of
        // every edge.
        let cross = ey.mul_add(x - ax, -(ex * (y - ay)));
        if cross < 0.0 {
            return false;
        }
        min_distance = min_distance.min(cross / ex.hypot(ey));
    }
    min_distance < FRAME_THICKNESS
}

pub fn encode_png(img: &GrayImage) -> Vec<u8> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::L8,
    )
    .unwrap();
    buf
}

/// Inches spanned by `px` scene pixels when the marker is [`MARKER_PX`]
/// pixels wide and [`MARKER_MM`] millimetres long.
pub fn inches(px: f64) -> f64 {
    px * MARKER_MM / MARKER_PX / 25.4
}

/// Assert `actual` is within `ratio` of `expected`.
pub fn assert_within(actual: f64, expected: f64, ratio: f64) {
    let error = (actual - expected).abs() / expected;
    assert!(
        error <= ratio,
        "expected {expected:.3} within {:.1}%, got {actual:.3} ({:.2}% off)",
        ratio * 100.0,
        error * 100.0,
    );
}
