//! Host pointer events and the mapping from screen space to document space.

use crate::annotation::Point;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub client_x: f64,
    pub client_y: f64,
}

/// Pointer input as delivered by the host UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Mouse { client_x: f64, client_y: f64 },
    Touch { touches: Vec<TouchPoint> },
}

impl PointerEvent {
    pub fn mouse(client_x: f64, client_y: f64) -> Self {
        PointerEvent::Mouse { client_x, client_y }
    }

    pub fn touch(client_x: f64, client_y: f64) -> Self {
        PointerEvent::Touch {
            touches: vec![TouchPoint { client_x, client_y }],
        }
    }
}

/// Normalized screen-space position of a pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub x: f64,
    pub y: f64,
}

/// On-screen bounding rectangle of an overlay canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanvasRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl CanvasRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Extracts a sample from a host event. Touch events use their first touch
/// point; an event carrying no usable coordinates yields `None`.
pub fn pointer_sample(event: &PointerEvent) -> Option<PointerSample> {
    let (x, y) = match event {
        PointerEvent::Mouse { client_x, client_y } => (*client_x, *client_y),
        PointerEvent::Touch { touches } => {
            let first = touches.first()?;
            (first.client_x, first.client_y)
        }
    };
    if x.is_finite() && y.is_finite() {
        Some(PointerSample { x, y })
    } else {
        None
    }
}

/// Converts a screen-space sample to document space for a canvas displayed
/// at `scale`.
pub fn to_document_point(sample: PointerSample, rect: CanvasRect, scale: f64) -> Option<Point> {
    if !scale.is_finite() || scale <= 0.0 {
        return None;
    }
    Some(Point::new(
        (sample.x - rect.left) / scale,
        (sample.y - rect.top) / scale,
    ))
}

/// Inverse of [`to_document_point`].
pub fn to_screen_point(point: Point, rect: CanvasRect, scale: f64) -> PointerSample {
    PointerSample {
        x: point.x * scale + rect.left,
        y: point.y * scale + rect.top,
    }
}

/// Adapter used at the input boundary: host event in, document point out.
pub fn map_event(event: &PointerEvent, rect: CanvasRect, scale: f64) -> Option<Point> {
    pointer_sample(event).and_then(|sample| to_document_point(sample, rect, scale))
}
