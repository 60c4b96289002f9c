use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pdfmark_core::{
    document_id_for_path, CancellationToken, DocumentInfo, PageSize, PageSource, RenderError,
    RenderImage, RenderRequest,
};
use tracing::{info, instrument, warn};

/// Overrides the pdfium library location at runtime.
pub const PDFIUM_LIBRARY_ENV: &str = "PDFMARK_PDFIUM_LIBRARY_PATH";

/// Opens PDF files as [`PageSource`]s backed by a shared pdfium binding.
pub struct PdfiumSourceFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumSourceFactory {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }

    #[instrument(skip(self))]
    pub fn open(&self, path: &Path) -> Result<Arc<dyn PageSource>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve {:?}", path))?;
        let (info, sizes) = build_document_info(&self.pdfium, &absolute)?;
        info!(pages = info.page_count, name = %info.name, "document opened");
        Ok(Arc::new(PdfiumPageSource {
            pdfium: Arc::clone(&self.pdfium),
            path: absolute,
            info,
            sizes,
            cache: Mutex::new(None),
        }))
    }
}

struct CachedRender {
    page_index: usize,
    scale: f64,
    image: RenderImage,
}

/// One open PDF. The file is reloaded for each uncached render so no
/// pdfium document outlives the call that borrowed the bindings.
pub struct PdfiumPageSource {
    pdfium: Arc<Pdfium>,
    path: PathBuf,
    info: DocumentInfo,
    sizes: Vec<PageSize>,
    cache: Mutex<Option<CachedRender>>,
}

impl PdfiumPageSource {
    fn render_uncached(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderImage, RenderError> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        cancel.check()?;

        let page_index = PdfPageIndex::try_from(request.page_index)
            .map_err(|_| anyhow!("page {} is out of supported range", request.page_index))?;
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", request.page_index + 1))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(request.scale as f32);
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page_index + 1))?;
        cancel.check()?;

        let image = bitmap.as_image().to_rgba8();
        Ok(RenderImage {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }
}

impl PageSource for PdfiumPageSource {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        self.sizes.get(page_index).copied().ok_or_else(|| {
            anyhow!(
                "page {} out of range ({} pages)",
                page_index + 1,
                self.sizes.len()
            )
        })
    }

    #[instrument(skip(self, cancel))]
    fn render_page(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderImage, RenderError> {
        if request.page_index >= self.info.page_count {
            return Err(RenderError::PageOutOfRange {
                page_index: request.page_index,
                page_count: self.info.page_count,
            });
        }
        cancel.check()?;

        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.page_index == request.page_index
                    && (entry.scale - request.scale).abs() < f64::EPSILON
                {
                    return Ok(entry.image.clone());
                }
            }
        }

        let image = self.render_uncached(request, cancel)?;
        *self.cache.lock() = Some(CachedRender {
            page_index: request.page_index,
            scale: request.scale,
            image: image.clone(),
        });
        Ok(image)
    }
}

fn build_document_info(pdfium: &Pdfium, path: &Path) -> Result<(DocumentInfo, Vec<PageSize>)> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;
    let sizes: Vec<PageSize> = document
        .pages()
        .iter()
        .map(|page| PageSize::new(page.width().value as f64, page.height().value as f64))
        .collect();
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_owned());

    let info = DocumentInfo {
        id: document_id_for_path(path),
        name,
        path: Some(path.to_path_buf()),
        page_count: sizes.len(),
    };
    Ok((info, sizes))
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = std::env::var(PDFIUM_LIBRARY_ENV).ok()?;
    if path.is_empty() {
        return None;
    }
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!("failed to load Pdfium from {}={}: {}", PDFIUM_LIBRARY_ENV, path, err);
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
