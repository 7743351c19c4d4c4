//! Model persistence

mod artifact;

pub use artifact::{ModelArtifact, ARTIFACT_FORMAT_VERSION};
pub(crate) use artifact::{read_bincode, write_atomic};
