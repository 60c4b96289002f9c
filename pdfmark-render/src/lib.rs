//! Raster backends for `pdfmark-core`: a `tiny-skia` overlay canvas, page
//! compositing, and (with the `pdf` feature) a pdfium page source.

pub mod compose;
pub mod pixmap;

#[cfg(feature = "pdf")]
mod pdfium;

pub use compose::{composite, flatten_page, save_overlay_png, save_png, ComposeError};
pub use pixmap::PixmapCanvas;

#[cfg(feature = "pdf")]
pub use pdfium::{PdfiumPageSource, PdfiumSourceFactory, PDFIUM_LIBRARY_ENV};
