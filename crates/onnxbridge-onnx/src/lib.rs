//! Rewrites the version metadata of serialized ONNX models so they load on
//! older runtimes.
//!
//! The model is never decoded into a full message tree. Top-level fields are
//! walked on the wire, `ir_version` and the versions of default-domain opset
//! imports are replaced, external initializers are optionally inlined, and
//! everything else is copied byte for byte.

pub mod error;
mod external;
pub mod model;
pub mod patch;
pub mod paths;
mod wire;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixture;

pub use error::{Error, Result};
pub use model::{inspect, ModelVersions, OpsetId};
pub use patch::{patch_bytes, patch_file, PatchReport, PatchTarget, Patched};
pub use paths::default_model_path;
