use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops, ImageFormat, RgbaImage};
use pdfmark_core::{AnnotationViewer, RenderImage};
use thiserror::Error;
use tracing::info;

use crate::pixmap::PixmapCanvas;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("page raster is {base:?} but overlay is {overlay:?}")]
    SizeMismatch {
        base: (u32, u32),
        overlay: (u32, u32),
    },
    #[error("page raster buffer does not match its {width}x{height} size")]
    MalformedRaster { width: u32, height: u32 },
    #[error("page {page} has not been rendered")]
    NotRendered { page: usize },
}

pub fn raster_to_image(raster: &RenderImage) -> Result<RgbaImage, ComposeError> {
    RgbaImage::from_raw(raster.width, raster.height, raster.pixels.clone()).ok_or(
        ComposeError::MalformedRaster {
            width: raster.width,
            height: raster.height,
        },
    )
}

/// Blends an overlay onto its page raster. Both layers must have the same
/// pixel size.
pub fn composite(base: &RenderImage, overlay: &PixmapCanvas) -> Result<RgbaImage, ComposeError> {
    let mut page = raster_to_image(base)?;
    let marks = overlay.to_rgba_image();
    if page.dimensions() != marks.dimensions() {
        return Err(ComposeError::SizeMismatch {
            base: page.dimensions(),
            overlay: marks.dimensions(),
        });
    }
    imageops::overlay(&mut page, &marks, 0, 0);
    Ok(page)
}

/// Flattens one page of a viewer (raster plus annotations) into an image.
pub fn flatten_page(
    viewer: &AnnotationViewer<PixmapCanvas>,
    page_index: usize,
) -> Result<RgbaImage, ComposeError> {
    let not_rendered = ComposeError::NotRendered {
        page: page_index + 1,
    };
    let Some(surface) = viewer.page(page_index) else {
        return Err(not_rendered);
    };
    match (surface.base(), surface.overlay()) {
        (Some(base), Some(overlay)) => composite(base, overlay),
        _ => Err(not_rendered),
    }
}

pub fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write {:?}", path))?;
    info!(path = %path.display(), width = image.width(), height = image.height(), "image written");
    Ok(())
}

/// Writes the overlay alone, transparent where nothing is drawn.
pub fn save_overlay_png(overlay: &PixmapCanvas, path: &Path) -> Result<()> {
    save_png(&overlay.to_rgba_image(), path)
}
