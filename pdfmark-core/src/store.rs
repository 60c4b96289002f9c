use anyhow::{Context, Result};
use tracing::info;

use crate::annotation::{Annotation, AnnotationError};

/// Ordered list of committed annotations for one document.
///
/// Insertion order is the render order: later annotations draw on top of
/// earlier ones. Records are never edited in place and can only be removed
/// all at once.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    page_count: u32,
}

impl AnnotationStore {
    pub fn new(page_count: u32) -> Self {
        Self {
            annotations: Vec::new(),
            page_count,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Appends a validated annotation and returns the 0-based index of the
    /// page that needs redrawing.
    pub fn add(&mut self, annotation: Annotation) -> Result<usize, AnnotationError> {
        annotation.validate(self.page_count)?;
        let page_index = annotation.page_index();
        info!(
            id = %annotation.id,
            kind = %annotation.kind,
            page = annotation.page,
            "annotation added"
        );
        self.annotations.push(annotation);
        Ok(page_index)
    }

    pub fn clear_all(&mut self) {
        info!(count = self.annotations.len(), "all annotations cleared");
        self.annotations.clear();
    }

    pub fn list(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Annotations on a 1-based page, in creation order.
    pub fn for_page(&self, page: u32) -> impl Iterator<Item = &Annotation> + '_ {
        self.annotations.iter().filter(move |a| a.page == page)
    }

    pub fn export(&self) -> Vec<Annotation> {
        self.annotations.clone()
    }

    /// Pretty-printed JSON array of every annotation.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.annotations).context("failed to encode annotations")
    }

    /// Rebuilds a store from an export, validating each record.
    pub fn import(annotations: Vec<Annotation>, page_count: u32) -> Result<Self> {
        let mut store = Self::new(page_count);
        for annotation in annotations {
            let id = annotation.id.clone();
            store
                .add(annotation)
                .with_context(|| format!("rejected imported annotation {id}"))?;
        }
        Ok(store)
    }

    pub fn import_json(payload: &str, page_count: u32) -> Result<Self> {
        let annotations: Vec<Annotation> =
            serde_json::from_str(payload).context("failed to decode annotation export")?;
        Self::import(annotations, page_count)
    }
}
