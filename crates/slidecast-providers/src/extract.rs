//! Document text extraction seam.

use std::path::Path;

use async_trait::async_trait;

use crate::error::ProviderResult;

/// Text extracted from one page or slide of a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    /// Zero-based page or slide index in the source document
    pub index: u32,
    /// Raw extracted text, possibly empty
    pub text: String,
}

impl ExtractedPage {
    pub fn new(index: u32, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// True if the page carries non-whitespace text.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Extracts ordered per-page text from a source document.
///
/// Parsing internals (PDF, PPTX, ...) live behind this boundary; the core
/// only filters empty pages and maps the rest onto scenes.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Extract ordered page text from the document at `path`.
    async fn extract(&self, path: &Path) -> ProviderResult<Vec<ExtractedPage>>;
}
