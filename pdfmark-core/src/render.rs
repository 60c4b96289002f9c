//! Overlay render pipeline.
//!
//! A pass clears the overlay, applies the zoom scale once, then draws the
//! page's committed annotations in creation order followed by the live
//! gesture, if there is one. Everything below the scale call works in
//! document coordinates.

use crate::annotation::{Annotation, AnnotationKind, Bounds, Color, Point, StrokeStyle};
use crate::session::PathSession;

/// Drawing surface stacked over a page raster.
///
/// Strokes are expected to use round caps and joins. Coordinates passed to
/// the drawing calls are in document space; implementations multiply them by
/// the scale set through [`OverlayCanvas::set_scale`].
pub trait OverlayCanvas {
    /// Creates a transparent canvas of the given pixel size.
    fn with_size(width: u32, height: u32) -> Self
    where
        Self: Sized;

    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Resets every pixel to transparent and the transform to identity.
    fn clear(&mut self);
    fn set_scale(&mut self, scale: f64);

    fn stroke_polyline(&mut self, points: &[Point], style: StrokeStyle);
    fn fill_rect(&mut self, rect: Bounds, color: Color);
    fn stroke_rect(&mut self, rect: Bounds, style: StrokeStyle);
    fn stroke_circle(&mut self, center: Point, radius: f64, style: StrokeStyle);
    fn fill_text(&mut self, text: &str, origin: Point, font_size: f64, color: Color);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Opacity applied to highlight fills.
    pub highlight_alpha: f32,
    /// Text labels are drawn at `width * text_size_factor`.
    pub text_size_factor: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            highlight_alpha: 0.3,
            text_size_factor: 4.0,
        }
    }
}

/// Redraws one page overlay from scratch.
pub fn render_overlay<'a, C, I>(
    canvas: &mut C,
    annotations: I,
    live: Option<&PathSession>,
    scale: f64,
    options: &RenderOptions,
) where
    C: OverlayCanvas + ?Sized,
    I: IntoIterator<Item = &'a Annotation>,
{
    canvas.clear();
    canvas.set_scale(scale);
    for annotation in annotations {
        draw_annotation(canvas, annotation, options);
    }
    if let Some(live) = live {
        draw_live(canvas, live, options);
    }
}

pub fn draw_annotation<C: OverlayCanvas + ?Sized>(
    canvas: &mut C,
    annotation: &Annotation,
    options: &RenderOptions,
) {
    let style = annotation.style();
    match annotation.kind {
        AnnotationKind::Freehand => {
            if annotation.points.len() > 1 {
                canvas.stroke_polyline(&annotation.points, style);
            }
        }
        AnnotationKind::Text => {
            if let (Some(text), Some(origin)) =
                (annotation.text.as_deref(), annotation.points.first())
            {
                let font_size = annotation.width * options.text_size_factor;
                canvas.fill_text(text, *origin, font_size, annotation.color);
            }
        }
        kind => {
            if let Some(bounds) = annotation.bounds {
                draw_shape(canvas, kind, bounds, style, options);
            }
        }
    }
}

/// Draws an in-progress gesture. Shapes are previewed from the first and
/// last points, the same box the commit will produce.
pub fn draw_live<C: OverlayCanvas + ?Sized>(
    canvas: &mut C,
    live: &PathSession,
    options: &RenderOptions,
) {
    match live.kind {
        AnnotationKind::Freehand => {
            if live.points.len() > 1 {
                canvas.stroke_polyline(&live.points, live.style);
            }
        }
        AnnotationKind::Text => {}
        kind => {
            if live.points.len() < 2 {
                return;
            }
            if let (Some(first), Some(last)) = (live.points.first(), live.points.last()) {
                let bounds = Bounds::from_corners(*first, *last);
                draw_shape(canvas, kind, bounds, live.style, options);
            }
        }
    }
}

fn draw_shape<C: OverlayCanvas + ?Sized>(
    canvas: &mut C,
    kind: AnnotationKind,
    bounds: Bounds,
    style: StrokeStyle,
    options: &RenderOptions,
) {
    match kind {
        AnnotationKind::Highlight => {
            canvas.fill_rect(bounds, style.color.with_opacity(options.highlight_alpha));
        }
        AnnotationKind::Rectangle => canvas.stroke_rect(bounds, style),
        AnnotationKind::Circle => {
            canvas.stroke_circle(bounds.center(), bounds.inscribed_radius(), style);
        }
        AnnotationKind::Freehand | AnnotationKind::Text => {}
    }
}
