//! Narration synthesis seam and the ordered fallback chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use slidecast_models::VoiceSpec;

use crate::error::ProviderResult;

/// A synthesized narration audio file.
#[derive(Debug, Clone)]
pub struct NarrationAudio {
    /// Path of the produced audio file
    pub path: PathBuf,
    /// Spoken duration in seconds
    pub duration_secs: f64,
}

/// Converts scene text plus voice parameters into an audio file.
#[async_trait]
pub trait NarrationProvider: Send + Sync {
    /// Engine name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Version string folded into narration fingerprints.
    ///
    /// Upgrading an engine must change this so stale cached audio is
    /// not reused.
    fn provider_version(&self) -> &str;

    /// Synthesize `text` with `voice` into `dest`.
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSpec,
        dest: &Path,
    ) -> ProviderResult<NarrationAudio>;
}

/// Ordered narration engines: primary first, fallbacks after.
///
/// The stage runner retries the current engine on transient failures
/// before moving to the next one. The chain's combined version string
/// participates in fingerprints so reordering or upgrading any member
/// invalidates cached narration.
#[derive(Clone)]
pub struct NarrationChain {
    providers: Vec<Arc<dyn NarrationProvider>>,
}

impl NarrationChain {
    /// Build a chain from ordered providers. Panics on an empty list in
    /// debug builds; construction with at least one provider is a caller
    /// invariant.
    pub fn new(providers: Vec<Arc<dyn NarrationProvider>>) -> Self {
        debug_assert!(!providers.is_empty(), "narration chain requires a provider");
        Self { providers }
    }

    /// Single-provider chain.
    pub fn single(provider: Arc<dyn NarrationProvider>) -> Self {
        Self::new(vec![provider])
    }

    /// Providers in fallback order.
    pub fn providers(&self) -> &[Arc<dyn NarrationProvider>] {
        &self.providers
    }

    /// Combined version string for fingerprinting.
    pub fn chain_version(&self) -> String {
        self.providers
            .iter()
            .map(|p| format!("{}@{}", p.name(), p.provider_version()))
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl std::fmt::Debug for NarrationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationChain")
            .field("providers", &self.chain_version())
            .finish()
    }
}
