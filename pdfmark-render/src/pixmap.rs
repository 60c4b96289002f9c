use image::{Rgba, RgbaImage};
use pdfmark_core::{Bounds, Color, OverlayCanvas, Point, StrokeStyle};
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};
use tracing::warn;

/// Advance width of one character as a fraction of the font size, used to
/// size text markers.
const TEXT_ADVANCE: f64 = 0.6;
/// Thickness of a text marker bar as a fraction of the font size.
const TEXT_MARKER_THICKNESS: f64 = 0.1;

/// Overlay canvas backed by a `tiny-skia` pixmap.
///
/// Text labels are drawn as a baseline bar spanning the label's estimated
/// advance width; there is no glyph rasterizer here.
pub struct PixmapCanvas {
    pixmap: Option<Pixmap>,
    transform: Transform,
}

impl PixmapCanvas {
    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    /// Straight (non-premultiplied) RGBA of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let color = self.pixmap.as_ref()?.pixel(x, y)?.demultiply();
        Some([color.red(), color.green(), color.blue(), color.alpha()])
    }

    pub fn is_blank(&self) -> bool {
        self.pixmap
            .as_ref()
            .map_or(true, |pixmap| pixmap.pixels().iter().all(|p| p.alpha() == 0))
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        let Some(pixmap) = self.pixmap.as_ref() else {
            return RgbaImage::new(0, 0);
        };
        RgbaImage::from_fn(pixmap.width(), pixmap.height(), |x, y| {
            let rgba = pixmap
                .pixel(x, y)
                .map(|p| {
                    let c = p.demultiply();
                    [c.red(), c.green(), c.blue(), c.alpha()]
                })
                .unwrap_or([0, 0, 0, 0]);
            Rgba(rgba)
        })
    }

    fn stroke_path(&mut self, path: Option<tiny_skia::Path>, style: StrokeStyle) {
        let (Some(pixmap), Some(path)) = (self.pixmap.as_mut(), path) else {
            return;
        };
        pixmap.stroke_path(
            &path,
            &paint(style.color),
            &stroke(style.width),
            self.transform,
            None,
        );
    }
}

fn paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

fn stroke(width: f64) -> Stroke {
    Stroke {
        width: width as f32,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    }
}

fn rect(bounds: Bounds) -> Option<Rect> {
    Rect::from_xywh(
        bounds.x as f32,
        bounds.y as f32,
        bounds.width as f32,
        bounds.height as f32,
    )
}

impl OverlayCanvas for PixmapCanvas {
    fn with_size(width: u32, height: u32) -> Self {
        let pixmap = Pixmap::new(width, height);
        if pixmap.is_none() {
            warn!(width, height, "unable to allocate overlay pixmap");
        }
        Self {
            pixmap,
            transform: Transform::identity(),
        }
    }

    fn width(&self) -> u32 {
        self.pixmap.as_ref().map_or(0, Pixmap::width)
    }

    fn height(&self) -> u32 {
        self.pixmap.as_ref().map_or(0, Pixmap::height)
    }

    fn clear(&mut self) {
        if let Some(pixmap) = self.pixmap.as_mut() {
            pixmap.fill(tiny_skia::Color::TRANSPARENT);
        }
        self.transform = Transform::identity();
    }

    fn set_scale(&mut self, scale: f64) {
        self.transform = Transform::from_scale(scale as f32, scale as f32);
    }

    fn stroke_polyline(&mut self, points: &[Point], style: StrokeStyle) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        let mut builder = PathBuilder::new();
        builder.move_to(first.x as f32, first.y as f32);
        for point in rest {
            builder.line_to(point.x as f32, point.y as f32);
        }
        self.stroke_path(builder.finish(), style);
    }

    fn fill_rect(&mut self, bounds: Bounds, color: Color) {
        let (Some(pixmap), Some(rect)) = (self.pixmap.as_mut(), rect(bounds)) else {
            return;
        };
        pixmap.fill_rect(rect, &paint(color), self.transform, None);
    }

    fn stroke_rect(&mut self, bounds: Bounds, style: StrokeStyle) {
        let path = rect(bounds).map(PathBuilder::from_rect);
        self.stroke_path(path, style);
    }

    fn stroke_circle(&mut self, center: Point, radius: f64, style: StrokeStyle) {
        let path = PathBuilder::from_circle(center.x as f32, center.y as f32, radius as f32);
        self.stroke_path(path, style);
    }

    fn fill_text(&mut self, text: &str, origin: Point, font_size: f64, color: Color) {
        let chars = text.chars().count() as f64;
        let marker = Bounds {
            x: origin.x,
            y: origin.y,
            width: chars * font_size * TEXT_ADVANCE,
            height: (font_size * TEXT_MARKER_THICKNESS).max(1.0),
        };
        self.fill_rect(marker, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfmark_core::{
        document_id_for_path, AnnotationViewer, CancellationToken, CanvasRect, DocumentInfo,
        PageSize, PageSource, PointerEvent, RenderError, RenderImage, RenderRequest, Tool,
    };
    use std::path::Path;
    use std::sync::Arc;

    struct BlankPages {
        info: DocumentInfo,
    }

    impl PageSource for BlankPages {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn page_size(&self, _page_index: usize) -> anyhow::Result<PageSize> {
            Ok(PageSize::new(200.0, 100.0))
        }

        fn render_page(
            &self,
            request: RenderRequest,
            cancel: &CancellationToken,
        ) -> Result<RenderImage, RenderError> {
            cancel.check()?;
            let (width, height) = PageSize::new(200.0, 100.0).viewport(request.scale);
            Ok(RenderImage::blank(width, height))
        }
    }

    fn viewer() -> AnnotationViewer<PixmapCanvas> {
        let mut viewer = AnnotationViewer::default();
        viewer
            .load_document(Arc::new(BlankPages {
                info: DocumentInfo {
                    id: document_id_for_path(Path::new("memo.pdf")),
                    name: "memo".into(),
                    path: None,
                    page_count: 1,
                },
            }))
            .unwrap();
        viewer.render_all().unwrap();
        viewer
    }

    fn drag(viewer: &mut AnnotationViewer<PixmapCanvas>, from: (f64, f64), to: (f64, f64)) {
        let rect = CanvasRect::new(0.0, 0.0, 200.0, 100.0);
        viewer.pointer_down(0, &PointerEvent::mouse(from.0, from.1), rect);
        viewer.pointer_move(0, &PointerEvent::mouse(to.0, to.1), rect);
        viewer.pointer_up();
    }

    fn alpha(canvas: &PixmapCanvas, x: u32, y: u32) -> u8 {
        canvas.pixel(x, y).unwrap()[3]
    }

    #[test]
    fn stroke_keeps_document_position_across_zoom() {
        let mut viewer = viewer();
        viewer.set_tool(Tool::Freehand);
        drag(&mut viewer, (10.0, 10.0), (50.0, 10.0));

        let overlay = viewer.overlay(0).unwrap();
        assert_eq!(alpha(overlay, 30, 10), 255);
        assert_eq!(alpha(overlay, 60, 20), 0);

        viewer.set_scale(2.0);
        viewer.render_all().unwrap();
        let overlay = viewer.overlay(0).unwrap();
        assert_eq!((overlay.width(), overlay.height()), (400, 200));
        for x in [20, 60, 99] {
            assert_eq!(alpha(overlay, x, 20), 255, "pixel ({x}, 20)");
        }
        assert_eq!(overlay.pixel(60, 20).unwrap(), [0xef, 0x44, 0x44, 255]);
        assert_eq!(alpha(overlay, 10, 20), 0);
        assert_eq!(alpha(overlay, 110, 20), 0);
        assert_eq!(alpha(overlay, 60, 40), 0);
    }

    #[test]
    fn later_annotations_draw_on_top() {
        let mut viewer = viewer();
        viewer.set_tool(Tool::Rectangle);
        viewer.set_color(Color::rgb(255, 0, 0));
        drag(&mut viewer, (10.0, 10.0), (50.0, 50.0));
        viewer.set_color(Color::rgb(0, 0, 255));
        drag(&mut viewer, (30.0, 30.0), (70.0, 70.0));

        let overlay = viewer.overlay(0).unwrap();
        assert_eq!(overlay.pixel(50, 30).unwrap(), [0, 0, 255, 255]);
        assert_eq!(overlay.pixel(50, 20).unwrap(), [255, 0, 0, 255]);
        assert_eq!(alpha(overlay, 40, 40), 0);
    }

    #[test]
    fn highlight_is_translucent() {
        let mut viewer = viewer();
        viewer.set_tool(Tool::Highlight);
        drag(&mut viewer, (10.0, 10.0), (60.0, 40.0));

        let pixel = viewer.overlay(0).unwrap().pixel(30, 20).unwrap();
        assert!((70..=84).contains(&pixel[3]), "alpha {}", pixel[3]);
    }

    #[test]
    fn circle_is_inscribed_in_bounds() {
        let mut viewer = viewer();
        viewer.set_tool(Tool::Circle);
        drag(&mut viewer, (20.0, 20.0), (80.0, 60.0));

        let overlay = viewer.overlay(0).unwrap();
        // center (50, 40), radius 20
        assert_eq!(alpha(overlay, 50, 20), 255);
        assert_eq!(alpha(overlay, 50, 40), 0);
        assert_eq!(alpha(overlay, 20, 40), 0);
    }

    #[test]
    fn clear_all_blanks_the_pixmap() {
        let mut viewer = viewer();
        viewer.set_tool(Tool::Freehand);
        drag(&mut viewer, (10.0, 10.0), (50.0, 50.0));
        assert!(!viewer.overlay(0).unwrap().is_blank());

        viewer.clear_all();
        assert!(viewer.overlay(0).unwrap().is_blank());
    }

    #[test]
    fn text_marker_spans_label_width() {
        let mut canvas = PixmapCanvas::with_size(100, 50);
        canvas.fill_text("abcd", Point::new(10.0, 20.0), 10.0, Color::rgb(0, 0, 0));
        // 4 chars * 10px * 0.6 = 24px wide, 1px thick at the baseline
        assert_eq!(alpha(&canvas, 12, 20), 255);
        assert_eq!(alpha(&canvas, 33, 20), 255);
        assert_eq!(alpha(&canvas, 36, 20), 0);
        assert_eq!(alpha(&canvas, 12, 10), 0);
    }

    #[test]
    fn zero_sized_canvas_is_inert() {
        let mut canvas = PixmapCanvas::with_size(0, 0);
        canvas.clear();
        canvas.stroke_polyline(
            &[Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
            StrokeStyle::default(),
        );
        assert!(canvas.pixmap().is_none());
        assert!(canvas.is_blank());
        assert_eq!(canvas.to_rgba_image().dimensions(), (0, 0));
    }
}
