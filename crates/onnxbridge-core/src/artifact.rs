use std::path::{Path, PathBuf};

use bytes::Bytes;

#[derive(Clone, Debug)]
pub enum ModelArtifact {
    OnnxPath(PathBuf),
    OnnxBytes(Bytes),
}

impl ModelArtifact {
    /// Path used in diagnostics; in-memory models report `<memory>`.
    pub fn display_path(&self) -> &Path {
        match self {
            Self::OnnxPath(path) => path,
            Self::OnnxBytes(_) => Path::new("<memory>"),
        }
    }
}
