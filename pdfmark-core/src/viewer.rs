//! Page-level controller: owns the page surfaces, the annotation store and
//! the draw session for one document, and routes host input to them.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::annotation::{Annotation, Color, StrokeStyle, Tool};
use crate::config::ViewerConfig;
use crate::export::{export_file_name, ExportSink};
use crate::input::{map_event, pointer_sample, CanvasRect, PointerEvent};
use crate::render::{render_overlay, OverlayCanvas, RenderOptions};
use crate::session::{DrawSession, SessionStart, SessionState, TextKey};
use crate::store::AnnotationStore;
use crate::{
    CancellationToken, DocumentId, PageSize, PageSource, RenderError, RenderImage, RenderRequest,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    DocumentLoaded(DocumentId),
    AnnotationAdded(String),
    AnnotationsCleared,
    /// Show the inline text input at this screen position.
    TextInputRequested {
        page_index: usize,
        screen_x: f64,
        screen_y: f64,
    },
    TextInputClosed,
    ScaleChanged(f64),
    RedrawNeeded(usize),
}

/// Base raster and annotation overlay of one page at the current scale.
///
/// Both layers share the viewport's pixel size. A surface is rebuilt from
/// scratch whenever the scale changes; until the base raster for the new
/// layout arrives there is no overlay and drawing on the page is a no-op.
pub struct PageSurface<C> {
    page_index: usize,
    size: PageSize,
    width: u32,
    height: u32,
    base: Option<RenderImage>,
    overlay: Option<C>,
}

impl<C: OverlayCanvas> PageSurface<C> {
    fn new(page_index: usize, size: PageSize, scale: f64) -> Self {
        let (width, height) = size.viewport(scale);
        Self {
            page_index,
            size,
            width,
            height,
            base: None,
            overlay: None,
        }
    }

    fn mount(&mut self, image: RenderImage) {
        if image.width != self.width || image.height != self.height {
            debug!(
                page_index = self.page_index,
                expected = ?(self.width, self.height),
                actual = ?(image.width, image.height),
                "page raster differs from viewport, sizing overlay to the raster"
            );
            self.width = image.width;
            self.height = image.height;
        }
        self.overlay = Some(C::with_size(image.width, image.height));
        self.base = Some(image);
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> PageSize {
        self.size
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn base(&self) -> Option<&RenderImage> {
        self.base.as_ref()
    }

    pub fn overlay(&self) -> Option<&C> {
        self.overlay.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        self.overlay.is_some()
    }
}

/// A page raster request that can be executed away from the viewer and
/// handed back through [`AnnotationViewer::finish_render`].
pub struct RenderJob {
    source: Arc<dyn PageSource>,
    request: RenderRequest,
    token: CancellationToken,
    generation: u64,
}

impl RenderJob {
    pub fn request(&self) -> RenderRequest {
        self.request
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn run(&self) -> Result<RenderImage, RenderError> {
        self.token.check()?;
        self.source.render_page(self.request, &self.token)
    }
}

pub struct AnnotationViewer<C: OverlayCanvas> {
    config: ViewerConfig,
    render_options: RenderOptions,
    source: Option<Arc<dyn PageSource>>,
    pages: Vec<PageSurface<C>>,
    store: AnnotationStore,
    session: DrawSession,
    tool: Tool,
    style: StrokeStyle,
    scale: f64,
    generation: u64,
    in_flight: HashMap<usize, CancellationToken>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl<C: OverlayCanvas> AnnotationViewer<C> {
    /// Builds a viewer for `config`, rejecting configs that fail
    /// [`ViewerConfig::validate`].
    pub fn new(config: ViewerConfig) -> Result<Self> {
        config.validate().context("invalid viewer config")?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: ViewerConfig) -> Self {
        Self {
            render_options: config.render_options(),
            style: config.default_style(),
            scale: config.clamp_scale(config.initial_scale),
            config,
            source: None,
            pages: Vec::new(),
            store: AnnotationStore::default(),
            session: DrawSession::default(),
            tool: Tool::default(),
            generation: 0,
            in_flight: HashMap::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn take_events(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn style(&self) -> StrokeStyle {
        self.style
    }

    pub fn session(&self) -> &DrawSession {
        &self.session
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.store.list()
    }

    pub fn annotation_count(&self) -> usize {
        self.store.len()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.store.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, page_index: usize) -> Option<&PageSurface<C>> {
        self.pages.get(page_index)
    }

    pub fn pages(&self) -> &[PageSurface<C>] {
        &self.pages
    }

    pub fn overlay(&self, page_index: usize) -> Option<&C> {
        self.pages.get(page_index).and_then(PageSurface::overlay)
    }

    /// Replaces the page list, store and session with fresh ones for
    /// `source`. Outstanding renders for the previous document are cancelled.
    #[instrument(skip(self, source), fields(document = %source.info().name))]
    pub fn load_document(&mut self, source: Arc<dyn PageSource>) -> Result<()> {
        let info = source.info().clone();
        let page_count = u32::try_from(info.page_count)
            .map_err(|_| anyhow!("document has too many pages ({})", info.page_count))?;
        let mut pages = Vec::with_capacity(info.page_count);
        for page_index in 0..info.page_count {
            let size = source
                .page_size(page_index)
                .with_context(|| format!("failed to read size of page {}", page_index + 1))?;
            pages.push(PageSurface::new(page_index, size, self.scale));
        }

        self.cancel_renders();
        self.generation += 1;
        if self.session.state() == SessionState::TextPending {
            self.events.lock().push(ViewerEvent::TextInputClosed);
        }
        self.pages = pages;
        self.store = AnnotationStore::new(page_count);
        self.session = DrawSession::Idle;
        self.source = Some(source);
        info!(pages = page_count, "document loaded");
        self.events.lock().push(ViewerEvent::DocumentLoaded(info.id));
        Ok(())
    }

    /// Issues a render job for a page, cancelling any job already running
    /// for it.
    pub fn begin_render(&mut self, page_index: usize) -> Option<RenderJob> {
        let source = self.source.as_ref()?;
        if page_index >= self.pages.len() {
            return None;
        }
        if let Some(previous) = self.in_flight.remove(&page_index) {
            debug!(page_index, "cancelling superseded render");
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.in_flight.insert(page_index, token.clone());
        Some(RenderJob {
            source: Arc::clone(source),
            request: RenderRequest {
                page_index,
                scale: self.scale,
            },
            token,
            generation: self.generation,
        })
    }

    /// Mounts a finished page raster. Returns `Ok(false)` when the result is
    /// stale (cancelled, or issued before a scale or document change) and was
    /// dropped.
    pub fn finish_render(
        &mut self,
        job: RenderJob,
        result: Result<RenderImage, RenderError>,
    ) -> Result<bool> {
        let page_index = job.request.page_index;
        if self
            .in_flight
            .get(&page_index)
            .map_or(false, |token| token.same_as(&job.token))
        {
            self.in_flight.remove(&page_index);
        }
        if job.token.is_cancelled() || job.generation != self.generation {
            debug!(page_index, "dropping stale page render");
            return Ok(false);
        }
        match result {
            Ok(image) => {
                let Some(surface) = self.pages.get_mut(page_index) else {
                    return Ok(false);
                };
                surface.mount(image);
                self.redraw_page(page_index);
                Ok(true)
            }
            Err(RenderError::Cancelled) => {
                debug!(page_index, "page render cancelled");
                Ok(false)
            }
            Err(err) => {
                error!(page = page_index + 1, %err, "error rendering page");
                Err(anyhow!(err).context(format!("failed to render page {}", page_index + 1)))
            }
        }
    }

    #[instrument(skip(self))]
    pub fn render_page(&mut self, page_index: usize) -> Result<bool> {
        let Some(job) = self.begin_render(page_index) else {
            return Ok(false);
        };
        let result = job.run();
        self.finish_render(job, result)
    }

    /// Renders every page in order. A failing page does not stop the others;
    /// the last failure is returned.
    pub fn render_all(&mut self) -> Result<()> {
        let mut last_error = None;
        for page_index in 0..self.pages.len() {
            if let Err(err) = self.render_page(page_index) {
                warn!(page = page_index + 1, "page left unrendered");
                last_error = Some(err);
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Cancels every outstanding render, e.g. when the host unmounts.
    pub fn cancel_renders(&mut self) {
        for (_, token) in self.in_flight.drain() {
            token.cancel();
        }
    }

    /// Changes the zoom level. Page surfaces are rebuilt at the new viewport
    /// size and must be rendered again before they show anything.
    pub fn set_scale(&mut self, scale: f64) -> bool {
        if !scale.is_finite() {
            return false;
        }
        let scale = self.config.clamp_scale(scale);
        if (scale - self.scale).abs() < f64::EPSILON {
            return false;
        }
        self.cancel_renders();
        self.generation += 1;
        self.scale = scale;
        for surface in &mut self.pages {
            *surface = PageSurface::new(surface.page_index, surface.size, scale);
        }
        debug!(scale, "zoom changed");
        let mut events = self.events.lock();
        events.push(ViewerEvent::ScaleChanged(scale));
        events.extend((0..self.pages.len()).map(ViewerEvent::RedrawNeeded));
        true
    }

    pub fn zoom_in(&mut self) -> bool {
        self.set_scale(self.scale * self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.set_scale(self.scale / self.config.zoom_step)
    }

    /// Selects the tool for the next gesture. A gesture already in progress
    /// keeps the tool it started with.
    pub fn set_tool(&mut self, tool: Tool) {
        if self.session.state() == SessionState::DrawingPath {
            debug!(?tool, "tool changed mid-gesture, applies to the next one");
        }
        self.tool = tool;
    }

    pub fn set_color(&mut self, color: Color) {
        self.style.color = color;
    }

    pub fn set_stroke_width(&mut self, width: f64) {
        if width.is_finite() {
            self.style.width = self.config.clamp_width(width);
        }
    }

    pub fn pointer_down(&mut self, page_index: usize, event: &PointerEvent, rect: CanvasRect) {
        if self.tool == Tool::Select || !self.is_mounted(page_index) {
            return;
        }
        let (Some(sample), Some(point)) = (
            pointer_sample(event),
            map_event(event, rect, self.scale),
        ) else {
            return;
        };
        let had_text = self.session.state() == SessionState::TextPending;
        match self
            .session
            .pointer_down(self.tool, page_index, point, sample, self.style)
        {
            SessionStart::TextInput {
                page_index,
                screen_anchor,
            } => {
                self.events.lock().push(ViewerEvent::TextInputRequested {
                    page_index,
                    screen_x: screen_anchor.x,
                    screen_y: screen_anchor.y,
                });
            }
            SessionStart::Drawing { .. } => {
                if had_text {
                    self.events.lock().push(ViewerEvent::TextInputClosed);
                }
            }
            SessionStart::Ignored => {}
        }
    }

    /// Extends the gesture and redraws the page with the live stroke on top.
    pub fn pointer_move(&mut self, page_index: usize, event: &PointerEvent, rect: CanvasRect) {
        let point = map_event(event, rect, self.scale);
        if self.session.pointer_move(page_index, point) {
            self.redraw_page(page_index);
        }
    }

    /// Pointer-up, pointer-leave and touch-end all end the gesture.
    pub fn pointer_up(&mut self) -> Option<String> {
        let active_page = match self.session.state() {
            SessionState::DrawingPath => self.session.active_page(),
            _ => None,
        };
        match self.session.pointer_up() {
            Some(annotation) => self.commit(annotation),
            None => {
                if let Some(page_index) = active_page {
                    self.redraw_page(page_index);
                }
                None
            }
        }
    }

    pub fn pointer_leave(&mut self) -> Option<String> {
        self.pointer_up()
    }

    pub fn touch_end(&mut self) -> Option<String> {
        self.pointer_up()
    }

    pub fn update_text(&mut self, value: impl Into<String>) {
        self.session.set_text(value);
    }

    pub fn submit_text(&mut self) -> Option<String> {
        if self.session.state() != SessionState::TextPending {
            return None;
        }
        let committed = self.session.submit_text();
        self.events.lock().push(ViewerEvent::TextInputClosed);
        committed.and_then(|annotation| self.commit(annotation))
    }

    pub fn cancel_text(&mut self) {
        if self.session.cancel_text() {
            self.events.lock().push(ViewerEvent::TextInputClosed);
        }
    }

    pub fn handle_key(&mut self, key: TextKey) -> Option<String> {
        match key {
            TextKey::Enter => self.submit_text(),
            TextKey::Escape => {
                self.cancel_text();
                None
            }
        }
    }

    pub fn clear_all(&mut self) {
        self.store.clear_all();
        self.redraw_all();
        self.events.lock().push(ViewerEvent::AnnotationsCleared);
    }

    pub fn export(&self) -> Vec<Annotation> {
        self.store.export()
    }

    pub fn export_json(&self) -> Result<String> {
        self.store.export_json()
    }

    /// Replaces the annotations with a previous export of this document.
    pub fn import_json(&mut self, payload: &str) -> Result<()> {
        let store = AnnotationStore::import_json(payload, self.store.page_count())?;
        info!(count = store.len(), "annotations imported");
        self.store = store;
        self.redraw_all();
        Ok(())
    }

    /// Hands the JSON export to `sink` under `<document name><suffix>` and
    /// returns the file name used.
    pub fn save(&self, sink: &dyn ExportSink) -> Result<String> {
        let Some(source) = self.source.as_ref() else {
            bail!("no document loaded");
        };
        let info = source.info();
        let file_name = export_file_name(&info.name, &self.config.export_suffix);
        let payload = self.export_json()?;
        sink.write(info, &file_name, &payload)
            .with_context(|| format!("failed to save annotations to {file_name}"))?;
        info!(count = self.store.len(), file = %file_name, "annotations saved");
        Ok(file_name)
    }

    /// Clears and repaints one page overlay. A page without an overlay is
    /// skipped.
    pub fn redraw_page(&mut self, page_index: usize) {
        let Some(overlay) = self
            .pages
            .get_mut(page_index)
            .and_then(|surface| surface.overlay.as_mut())
        else {
            return;
        };
        let page = u32::try_from(page_index + 1).unwrap_or(u32::MAX);
        let live = self
            .session
            .preview()
            .filter(|live| live.page_index == page_index);
        render_overlay(
            overlay,
            self.store.for_page(page),
            live,
            self.scale,
            &self.render_options,
        );
        self.events.lock().push(ViewerEvent::RedrawNeeded(page_index));
    }

    pub fn redraw_all(&mut self) {
        for page_index in 0..self.pages.len() {
            self.redraw_page(page_index);
        }
    }

    fn is_mounted(&self, page_index: usize) -> bool {
        self.pages
            .get(page_index)
            .map_or(false, PageSurface::is_mounted)
    }

    fn commit(&mut self, annotation: Annotation) -> Option<String> {
        let id = annotation.id.clone();
        match self.store.add(annotation) {
            Ok(page_index) => {
                self.events.lock().push(ViewerEvent::AnnotationAdded(id.clone()));
                self.redraw_page(page_index);
                Some(id)
            }
            Err(err) => {
                warn!(%err, "discarding invalid annotation");
                None
            }
        }
    }
}

impl<C: OverlayCanvas> Default for AnnotationViewer<C> {
    fn default() -> Self {
        Self::with_config(ViewerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationKind, Point};
    use crate::export::MemoryExportSink;
    use crate::recording::{CanvasOp, RecordingCanvas};
    use crate::{document_id_for_path, DocumentInfo};
    use std::path::Path;

    struct FakeSource {
        info: DocumentInfo,
        fail_page: Option<usize>,
    }

    impl FakeSource {
        fn new(name: &str, page_count: usize) -> Arc<Self> {
            Arc::new(Self {
                info: DocumentInfo {
                    id: document_id_for_path(Path::new(name)),
                    name: name.to_owned(),
                    path: None,
                    page_count,
                },
                fail_page: None,
            })
        }
    }

    impl PageSource for FakeSource {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn page_size(&self, _page_index: usize) -> Result<PageSize> {
            Ok(PageSize::new(200.0, 100.0))
        }

        fn render_page(
            &self,
            request: RenderRequest,
            cancel: &CancellationToken,
        ) -> Result<RenderImage, RenderError> {
            cancel.check()?;
            if self.fail_page == Some(request.page_index) {
                return Err(anyhow!("corrupt page stream").into());
            }
            let (width, height) = PageSize::new(200.0, 100.0).viewport(request.scale);
            Ok(RenderImage::blank(width, height))
        }
    }

    type Viewer = AnnotationViewer<RecordingCanvas>;

    fn loaded(pages: usize) -> Viewer {
        let mut viewer = Viewer::default();
        viewer.load_document(FakeSource::new("contract", pages)).unwrap();
        viewer.render_all().unwrap();
        viewer
    }

    fn rect() -> CanvasRect {
        CanvasRect::new(0.0, 0.0, 200.0, 100.0)
    }

    fn drag(viewer: &mut Viewer, page: usize, points: &[(f64, f64)]) -> Option<String> {
        let (first, rest) = points.split_first().unwrap();
        viewer.pointer_down(page, &PointerEvent::mouse(first.0, first.1), rect());
        for &(x, y) in rest {
            viewer.pointer_move(page, &PointerEvent::mouse(x, y), rect());
        }
        viewer.pointer_up()
    }

    fn polylines(canvas: &RecordingCanvas) -> Vec<Vec<Point>> {
        canvas
            .ops()
            .iter()
            .filter_map(|op| match op {
                CanvasOp::StrokePolyline { points, .. } => Some(points.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn freehand_gesture_commits_one_annotation() {
        let mut viewer = loaded(2);
        viewer.set_tool(Tool::Freehand);
        let id = drag(&mut viewer, 1, &[(10.0, 10.0), (20.0, 15.0), (50.0, 10.0)]).unwrap();

        assert_eq!(viewer.annotation_count(), 1);
        let annotation = &viewer.annotations()[0];
        assert_eq!(annotation.id, id);
        assert_eq!(annotation.kind, AnnotationKind::Freehand);
        assert_eq!(annotation.page, 2);
        assert_eq!(
            annotation.points,
            vec![Point::new(10.0, 10.0), Point::new(20.0, 15.0), Point::new(50.0, 10.0)]
        );
        assert!(viewer
            .take_events()
            .contains(&ViewerEvent::AnnotationAdded(id)));
        assert!(viewer.overlay(0).unwrap().is_blank());
        assert_eq!(polylines(viewer.overlay(1).unwrap()).len(), 1);
    }

    #[test]
    fn live_stroke_is_replaced_on_every_move() {
        let mut viewer = loaded(1);
        viewer.set_tool(Tool::Freehand);
        drag(&mut viewer, 0, &[(0.0, 0.0), (5.0, 5.0)]);

        viewer.pointer_down(0, &PointerEvent::mouse(30.0, 30.0), rect());
        viewer.pointer_move(0, &PointerEvent::mouse(31.0, 31.0), rect());
        viewer.pointer_move(0, &PointerEvent::mouse(32.0, 32.0), rect());

        let frame = polylines(viewer.overlay(0).unwrap());
        assert_eq!(frame.len(), 2);
        assert_eq!(frame[1].len(), 3);

        viewer.pointer_up();
        assert_eq!(polylines(viewer.overlay(0).unwrap()).len(), 2);
        assert_eq!(viewer.annotation_count(), 2);
    }

    #[test]
    fn moves_on_another_page_do_not_extend_the_path() {
        let mut viewer = loaded(2);
        viewer.set_tool(Tool::Freehand);
        viewer.pointer_down(0, &PointerEvent::mouse(1.0, 1.0), rect());
        viewer.pointer_move(1, &PointerEvent::mouse(9.0, 9.0), rect());
        viewer.pointer_move(0, &PointerEvent::Touch { touches: vec![] }, rect());
        viewer.pointer_up();
        assert_eq!(viewer.annotations()[0].points, vec![Point::new(1.0, 1.0)]);
    }

    #[test]
    fn shape_bounds_come_from_first_and_last_points() {
        let mut viewer = loaded(1);
        viewer.set_tool(Tool::Highlight);
        drag(
            &mut viewer,
            0,
            &[(80.0, 60.0), (0.0, 0.0), (199.0, 99.0), (20.0, 40.0)],
        );
        let bounds = viewer.annotations()[0].bounds.unwrap();
        assert_eq!(
            (bounds.x, bounds.y, bounds.width, bounds.height),
            (20.0, 40.0, 60.0, 20.0)
        );
    }

    #[test]
    fn zoom_rebuilds_surfaces_and_keeps_document_coordinates() {
        let mut viewer = loaded(1);
        viewer.set_tool(Tool::Freehand);
        drag(&mut viewer, 0, &[(10.0, 10.0), (50.0, 10.0)]);

        assert!(viewer.set_scale(2.0));
        let page = viewer.page(0).unwrap();
        assert!(!page.is_mounted());
        assert_eq!(page.dimensions(), (400, 200));

        viewer.render_all().unwrap();
        let overlay = viewer.overlay(0).unwrap();
        assert_eq!((overlay.width(), overlay.height()), (400, 200));
        assert!(overlay.ops().contains(&CanvasOp::SetScale(2.0)));
        assert_eq!(
            polylines(overlay),
            vec![vec![Point::new(10.0, 10.0), Point::new(50.0, 10.0)]]
        );

        // Gestures at the new zoom land in the same document space.
        drag(&mut viewer, 0, &[(20.0, 20.0), (100.0, 20.0)]);
        assert_eq!(viewer.annotations()[1].points, viewer.annotations()[0].points);
    }

    #[test]
    fn zoom_steps_are_clamped() {
        let mut viewer = Viewer::default();
        for _ in 0..20 {
            viewer.zoom_in();
        }
        assert_eq!(viewer.scale(), 3.0);
        for _ in 0..20 {
            viewer.zoom_out();
        }
        assert_eq!(viewer.scale(), 0.5);
        assert!(!viewer.set_scale(f64::NAN));
    }

    #[test]
    fn whitespace_text_leaves_count_unchanged() {
        let mut viewer = loaded(1);
        viewer.set_tool(Tool::Text);
        viewer.pointer_down(
            0,
            &PointerEvent::mouse(40.0, 30.0),
            CanvasRect::new(10.0, 10.0, 200.0, 100.0),
        );
        assert!(viewer.take_events().contains(&ViewerEvent::TextInputRequested {
            page_index: 0,
            screen_x: 40.0,
            screen_y: 30.0,
        }));

        viewer.update_text("   ");
        assert!(viewer.handle_key(TextKey::Enter).is_none());
        assert_eq!(viewer.annotation_count(), 0);
        assert!(viewer.take_events().contains(&ViewerEvent::TextInputClosed));
    }

    #[test]
    fn submitted_text_is_anchored_in_document_space() {
        let mut viewer = loaded(1);
        viewer.set_scale(2.0);
        viewer.render_all().unwrap();
        viewer.set_tool(Tool::Text);
        viewer.pointer_down(0, &PointerEvent::mouse(40.0, 30.0), rect());
        viewer.update_text("Approved ");
        viewer.submit_text().unwrap();

        let annotation = &viewer.annotations()[0];
        assert_eq!(annotation.text.as_deref(), Some("Approved"));
        assert_eq!(annotation.points, vec![Point::new(20.0, 15.0)]);
    }

    #[test]
    fn clear_all_blanks_every_overlay() {
        let mut viewer = loaded(3);
        viewer.set_tool(Tool::Rectangle);
        for page in 0..3 {
            drag(&mut viewer, page, &[(1.0, 1.0), (30.0, 30.0)]);
        }
        assert_eq!(viewer.annotation_count(), 3);

        viewer.clear_all();
        assert!(viewer.annotations().is_empty());
        assert!(viewer.pages().iter().all(|p| p.overlay().unwrap().is_blank()));
        assert!(!viewer.has_unsaved_changes());
    }

    #[test]
    fn tool_change_mid_gesture_applies_to_next_gesture() {
        let mut viewer = loaded(1);
        viewer.set_tool(Tool::Freehand);
        viewer.set_color(Color::rgb(0, 0, 255));
        viewer.pointer_down(0, &PointerEvent::mouse(1.0, 1.0), rect());
        viewer.set_tool(Tool::Circle);
        viewer.set_color(Color::rgb(255, 0, 0));
        viewer.pointer_move(0, &PointerEvent::mouse(5.0, 5.0), rect());
        viewer.pointer_up();

        let first = &viewer.annotations()[0];
        assert_eq!(first.kind, AnnotationKind::Freehand);
        assert_eq!(first.color, Color::rgb(0, 0, 255));

        drag(&mut viewer, 0, &[(1.0, 1.0), (5.0, 5.0)]);
        assert_eq!(viewer.annotations()[1].kind, AnnotationKind::Circle);
    }

    #[test]
    fn unmounted_pages_ignore_input() {
        let mut viewer = Viewer::default();
        viewer.load_document(FakeSource::new("contract", 1)).unwrap();
        viewer.set_tool(Tool::Freehand);
        assert!(drag(&mut viewer, 0, &[(1.0, 1.0), (2.0, 2.0)]).is_none());
        assert!(viewer.session().is_idle());
        viewer.redraw_all();
        assert!(viewer.overlay(0).is_none());
    }

    #[test]
    fn select_tool_ignores_input() {
        let mut viewer = loaded(1);
        assert!(drag(&mut viewer, 0, &[(1.0, 1.0), (2.0, 2.0)]).is_none());
        assert_eq!(viewer.annotation_count(), 0);
    }

    #[test]
    fn stroke_width_is_clamped_to_configured_range() {
        let mut viewer = Viewer::default();
        viewer.set_stroke_width(50.0);
        assert_eq!(viewer.style().width, 20.0);
        viewer.set_stroke_width(f64::INFINITY);
        assert_eq!(viewer.style().width, 20.0);
    }

    #[test]
    fn stale_renders_are_dropped() {
        let mut viewer = Viewer::default();
        viewer.load_document(FakeSource::new("contract", 2)).unwrap();

        let stale = viewer.begin_render(0).unwrap();
        let result = stale.run();
        viewer.set_scale(1.5);
        assert!(!viewer.finish_render(stale, result).unwrap());
        assert!(!viewer.page(0).unwrap().is_mounted());

        let first = viewer.begin_render(1).unwrap();
        let second = viewer.begin_render(1).unwrap();
        assert!(first.token().is_cancelled());
        assert!(matches!(first.run(), Err(RenderError::Cancelled)));
        let result = second.run();
        assert!(viewer.finish_render(second, result).unwrap());
        assert_eq!(viewer.page(1).unwrap().dimensions(), (300, 150));
    }

    #[test]
    fn cancel_renders_cancels_outstanding_jobs() {
        let mut viewer = Viewer::default();
        viewer.load_document(FakeSource::new("contract", 1)).unwrap();
        let job = viewer.begin_render(0).unwrap();
        viewer.cancel_renders();
        let result = job.run();
        assert!(!viewer.finish_render(job, result).unwrap());
    }

    #[test]
    fn failing_page_does_not_block_others() {
        let mut viewer = Viewer::default();
        let source = Arc::new(FakeSource {
            fail_page: Some(0),
            ..Arc::try_unwrap(FakeSource::new("broken", 2)).ok().unwrap()
        });
        viewer.load_document(source).unwrap();
        assert!(viewer.render_all().is_err());
        assert!(!viewer.page(0).unwrap().is_mounted());
        assert!(viewer.page(1).unwrap().is_mounted());
    }

    #[test]
    fn loading_a_document_replaces_annotations() {
        let mut viewer = loaded(1);
        viewer.set_tool(Tool::Freehand);
        drag(&mut viewer, 0, &[(1.0, 1.0)]);
        assert_eq!(viewer.annotation_count(), 1);

        viewer.load_document(FakeSource::new("other", 4)).unwrap();
        assert_eq!(viewer.annotation_count(), 0);
        assert_eq!(viewer.page_count(), 4);
        assert!(viewer.pages().iter().all(|p| !p.is_mounted()));
    }

    #[test]
    fn loading_a_document_closes_pending_text_input() {
        let mut viewer = loaded(1);
        viewer.set_tool(Tool::Text);
        viewer.pointer_down(0, &PointerEvent::mouse(40.0, 30.0), rect());
        viewer.take_events();

        viewer.load_document(FakeSource::new("other", 1)).unwrap();
        assert!(viewer.session().is_idle());
        let events = viewer.take_events();
        assert_eq!(events[0], ViewerEvent::TextInputClosed);
        assert!(matches!(events[1], ViewerEvent::DocumentLoaded(_)));
        assert!(viewer.submit_text().is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let inverted = ViewerConfig {
            min_scale: 2.0,
            max_scale: 1.0,
            ..ViewerConfig::default()
        };
        assert!(Viewer::new(inverted).is_err());

        let nan_width = ViewerConfig {
            max_width: f64::NAN,
            ..ViewerConfig::default()
        };
        assert!(Viewer::new(nan_width).is_err());

        let mut viewer = Viewer::new(ViewerConfig::default()).unwrap();
        viewer.set_stroke_width(0.0);
        assert_eq!(viewer.style().width, 1.0);
        assert!(viewer.zoom_in());
    }

    #[test]
    fn save_writes_named_export_and_import_restores_it() {
        let mut viewer = loaded(2);
        viewer.set_tool(Tool::Circle);
        drag(&mut viewer, 1, &[(10.0, 10.0), (40.0, 30.0)]);
        viewer.set_tool(Tool::Freehand);
        drag(&mut viewer, 0, &[(1.0, 2.0), (3.0, 4.0)]);

        let sink = MemoryExportSink::new();
        let file_name = viewer.save(&sink).unwrap();
        assert_eq!(file_name, "contract_annotations.json");
        let (_, payload) = sink.latest().unwrap();

        let exported = viewer.export();
        viewer.clear_all();
        viewer.import_json(&payload).unwrap();
        assert_eq!(viewer.annotations(), exported.as_slice());
        assert_eq!(polylines(viewer.overlay(0).unwrap()).len(), 1);
    }

    #[test]
    fn save_without_document_fails() {
        let viewer = Viewer::default();
        assert!(viewer.save(&MemoryExportSink::new()).is_err());
    }
}
