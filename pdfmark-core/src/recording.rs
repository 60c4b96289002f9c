use crate::annotation::{Bounds, Color, Point, StrokeStyle};
use crate::render::OverlayCanvas;

/// A recorded drawing call, in document coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasOp {
    Clear,
    SetScale(f64),
    StrokePolyline {
        points: Vec<Point>,
        style: StrokeStyle,
    },
    FillRect {
        rect: Bounds,
        color: Color,
    },
    StrokeRect {
        rect: Bounds,
        style: StrokeStyle,
    },
    StrokeCircle {
        center: Point,
        radius: f64,
        style: StrokeStyle,
    },
    FillText {
        text: String,
        origin: Point,
        font_size: f64,
        color: Color,
    },
}

/// Display-list canvas. Hosts that paint with their own toolkit replay the
/// ops after each pass; everything since the last `Clear` is the current
/// frame.
#[derive(Debug, Clone, Default)]
pub struct RecordingCanvas {
    width: u32,
    height: u32,
    ops: Vec<CanvasOp>,
}

impl RecordingCanvas {
    pub fn ops(&self) -> &[CanvasOp] {
        &self.ops
    }

    /// True when nothing has been drawn since the last clear.
    pub fn is_blank(&self) -> bool {
        self.ops
            .iter()
            .all(|op| matches!(op, CanvasOp::Clear | CanvasOp::SetScale(_)))
    }

    pub fn take_ops(&mut self) -> Vec<CanvasOp> {
        std::mem::take(&mut self.ops)
    }
}

impl OverlayCanvas for RecordingCanvas {
    fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.ops.push(CanvasOp::Clear);
    }

    fn set_scale(&mut self, scale: f64) {
        self.ops.push(CanvasOp::SetScale(scale));
    }

    fn stroke_polyline(&mut self, points: &[Point], style: StrokeStyle) {
        self.ops.push(CanvasOp::StrokePolyline {
            points: points.to_vec(),
            style,
        });
    }

    fn fill_rect(&mut self, rect: Bounds, color: Color) {
        self.ops.push(CanvasOp::FillRect { rect, color });
    }

    fn stroke_rect(&mut self, rect: Bounds, style: StrokeStyle) {
        self.ops.push(CanvasOp::StrokeRect { rect, style });
    }

    fn stroke_circle(&mut self, center: Point, radius: f64, style: StrokeStyle) {
        self.ops.push(CanvasOp::StrokeCircle {
            center,
            radius,
            style,
        });
    }

    fn fill_text(&mut self, text: &str, origin: Point, font_size: f64, color: Color) {
        self.ops.push(CanvasOp::FillText {
            text: text.to_owned(),
            origin,
            font_size,
            color,
        });
    }
}
