//! Content-addressed artifact cache: fingerprints, single-flight
//! production, sidecar metadata, and eviction.

pub mod artifact;
pub mod error;
pub mod fingerprint;
pub mod store;

pub use artifact::{Artifact, ArtifactKind};
pub use error::{PutError, StoreError, StoreResult};
pub use fingerprint::{final_fingerprint, narration_fingerprint, render_fingerprint, Fingerprint};
pub use store::{ArtifactStore, PurgeStats};
