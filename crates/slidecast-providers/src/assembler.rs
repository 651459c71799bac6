//! Final assembly seam: concatenation and export.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use slidecast_models::QualityPreset;

use crate::error::ProviderResult;

/// Joins ordered segments and re-encodes the result.
///
/// Implementations must guarantee that the terminal export write is
/// atomic: callers never observe a partial file under the final name.
#[async_trait]
pub trait VideoAssembler: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Join `segments` in the given order with a fixed-duration cross-fade
    /// between consecutive segments, writing the joined timeline to `dest`.
    async fn concat(
        &self,
        segments: &[PathBuf],
        transition_secs: f64,
        dest: &Path,
    ) -> ProviderResult<PathBuf>;

    /// Re-encode `input` to `quality` and atomically publish it at `dest`.
    async fn export(
        &self,
        input: &Path,
        quality: QualityPreset,
        dest: &Path,
    ) -> ProviderResult<PathBuf>;
}
