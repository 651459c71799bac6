//! Provider seams for the Slidecast pipeline.
//!
//! The orchestrator core depends only on the traits in this crate:
//! document text extraction, narration synthesis, scene rendering and
//! final assembly. Concrete engines are pluggable collaborators; each
//! declares a version string that participates in artifact fingerprints
//! so upgrading an engine invalidates stale cache entries.

pub mod assembler;
pub mod command_narrator;
pub mod error;
pub mod extract;
pub mod narration;
pub mod renderer;

pub use assembler::VideoAssembler;
pub use command_narrator::CommandNarrator;
pub use error::{ProviderError, ProviderResult};
pub use extract::{DocumentExtractor, ExtractedPage};
pub use narration::{NarrationAudio, NarrationChain, NarrationProvider};
pub use renderer::{RenderedSegment, SceneComposition, SceneRenderer};
