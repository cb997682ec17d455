//! Drawing surface driven by the presentation intrinsics.

use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Host-owned canvas state mutated by the artifact.
///
/// Arguments have already been clamped by the intrinsics: sizes and radii
/// are non-negative and colors are in range.
pub trait Surface: Send {
    fn resize(&mut self, width: u32, height: u32);
    fn set_fill(&mut self, color: Rgb);
    /// Fill the whole surface with the current fill color.
    fn clear(&mut self);
    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64);
    fn fill_circle(&mut self, x: f64, y: f64, radius: f64);
}

impl<S: Surface> Surface for Arc<Mutex<S>> {
    fn resize(&mut self, width: u32, height: u32) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resize(width, height);
    }

    fn set_fill(&mut self, color: Rgb) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_fill(color);
    }

    fn clear(&mut self) {
        self.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_rect(x, y, width, height);
    }

    fn fill_circle(&mut self, x: f64, y: f64, radius: f64) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_circle(x, y, radius);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear {
        color: Rgb,
    },
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Rgb,
    },
    Circle {
        x: f64,
        y: f64,
        radius: f64,
        color: Rgb,
    },
}

/// A surface that records what was drawn since the last clear.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    pub width: u32,
    pub height: u32,
    pub fill: Rgb,
    pub ops: Vec<DrawOp>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Surface for DisplayList {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn set_fill(&mut self, color: Rgb) {
        self.fill = color;
    }

    fn clear(&mut self) {
        // Everything underneath is covered.
        self.ops.clear();
        self.ops.push(DrawOp::Clear { color: self.fill });
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.ops.push(DrawOp::Rect {
            x,
            y,
            width,
            height,
            color: self.fill,
        });
    }

    fn fill_circle(&mut self, x: f64, y: f64, radius: f64) {
        self.ops.push(DrawOp::Circle {
            x,
            y,
            radius,
            color: self.fill,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_and_fill_are_last_write_wins() {
        let mut list = DisplayList::new();
        list.resize(100, 50);
        list.resize(320, 240);
        list.set_fill(Rgb::new(1, 2, 3));
        list.set_fill(Rgb::new(200, 10, 0));

        assert_eq!((list.width, list.height), (320, 240));
        assert_eq!(list.fill, Rgb::new(200, 10, 0));
    }

    #[test]
    fn shapes_capture_fill_at_draw_time() {
        let mut list = DisplayList::new();
        list.set_fill(Rgb::new(255, 0, 0));
        list.fill_rect(1.0, 2.0, 3.0, 4.0);
        list.set_fill(Rgb::new(0, 0, 255));
        list.fill_circle(5.0, 5.0, 2.0);

        assert_eq!(
            list.ops,
            vec![
                DrawOp::Rect {
                    x: 1.0,
                    y: 2.0,
                    width: 3.0,
                    height: 4.0,
                    color: Rgb::new(255, 0, 0),
                },
                DrawOp::Circle {
                    x: 5.0,
                    y: 5.0,
                    radius: 2.0,
                    color: Rgb::new(0, 0, 255),
                },
            ]
        );
    }

    #[test]
    fn clear_discards_earlier_shapes() {
        let mut list = DisplayList::new();
        list.fill_rect(0.0, 0.0, 1.0, 1.0);
        list.fill_rect(0.0, 0.0, 2.0, 2.0);
        list.set_fill(Rgb::new(9, 9, 9));
        list.clear();

        assert_eq!(list.ops, vec![DrawOp::Clear { color: Rgb::new(9, 9, 9) }]);
    }

    #[test]
    fn shared_surface_is_observable_from_outside() {
        let shared = Arc::new(Mutex::new(DisplayList::new()));
        let mut handle = Arc::clone(&shared);
        handle.resize(8, 8);
        handle.clear();

        let list = shared.lock().unwrap();
        assert_eq!(list.width, 8);
        assert_eq!(list.ops.len(), 1);
    }
}
