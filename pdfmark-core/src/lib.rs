//! Annotation overlay engine for rendered PDF pages.
//!
//! Pages are rasterized by a [`PageSource`]; this crate keeps the annotation
//! overlay for every page in step with the committed annotations and the
//! gesture in progress.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use thiserror::Error;
use uuid::Uuid;

pub mod annotation;
pub mod config;
pub mod export;
pub mod input;
pub mod logging;
pub mod recording;
pub mod render;
pub mod session;
pub mod store;
pub mod viewer;

pub use annotation::{
    Annotation, AnnotationError, AnnotationKind, Bounds, Color, ColorParseError, Point,
    StrokeStyle, Tool,
};
pub use config::ViewerConfig;
pub use export::{export_file_name, ExportSink, FileExportSink, MemoryExportSink};
pub use input::{CanvasRect, PointerEvent, PointerSample, TouchPoint};
pub use recording::{CanvasOp, RecordingCanvas};
pub use render::{OverlayCanvas, RenderOptions};
pub use session::{DrawSession, SessionState, TextKey};
pub use store::AnnotationStore;
pub use viewer::{AnnotationViewer, PageSurface, RenderJob, ViewerEvent};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0d6a52-8c1e-5b7a-9e44-2c61d0b8f7a3").expect("valid namespace UUID")
});

/// Stable identifier for a document, derived from its resolved path.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    /// Display name, usually the file stem. Used to name exports.
    pub name: String,
    pub path: Option<PathBuf>,
    pub page_count: usize,
}

/// Size of a page in document units at scale 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Pixel dimensions of the page's viewport at `scale`.
    pub fn viewport(&self, scale: f64) -> (u32, u32) {
        let px = |v: f64| {
            let scaled = (v * scale).floor();
            if !scaled.is_finite() || scaled < 1.0 {
                1
            } else if scaled > u32::MAX as f64 {
                u32::MAX
            } else {
                scaled as u32
            }
        };
        (px(self.width), px(self.height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f64,
}

/// RGBA8 page raster.
#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; width as usize * height as usize * 4],
        }
    }
}

/// Shared flag used to abandon a page render whose result is no longer
/// wanted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// True when both tokens share the same flag.
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn check(&self) -> Result<(), RenderError> {
        if self.is_cancelled() {
            Err(RenderError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render cancelled")]
    Cancelled,
    #[error("page {page_index} out of range ({page_count} pages)")]
    PageOutOfRange {
        page_index: usize,
        page_count: usize,
    },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Rasterizes the pages of one document.
pub trait PageSource: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    fn page_size(&self, page_index: usize) -> Result<PageSize>;
    /// Renders a page at `request.scale`. Implementations should check
    /// `cancel` between expensive steps and return
    /// [`RenderError::Cancelled`] once it is set.
    fn render_page(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderImage, RenderError>;
}
