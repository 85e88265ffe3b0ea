use std::{fmt, path::PathBuf};

use crate::{DType, Shape};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoKind {
    Input,
    Output,
}

impl fmt::Display for IoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request payload: {0}")]
    Payload(String),

    #[error("cannot reshape array of size {numel} into shape {expected}")]
    ShapeMismatch { expected: Shape, numel: usize },

    #[error("{dtype} tensor of shape {shape} needs {expected} bytes, got {actual}")]
    ByteLength {
        dtype: DType,
        shape: Shape,
        expected: usize,
        actual: usize,
    },

    #[error("expected a {expected} tensor, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },

    #[error("unsupported tensor element type: {0}")]
    UnsupportedDType(String),

    #[error("failed to create an inference session for {}", path.display())]
    Session {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("model declares no {kind} named {name:?} (declared: {available:?})")]
    Binding {
        kind: IoKind,
        name: String,
        available: Vec<String>,
    },

    #[error("inference failed")]
    Execution(#[source] BoxError),
}

impl Error {
    pub fn session(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::Session {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn execution(source: impl Into<BoxError>) -> Self {
        Self::Execution(source.into())
    }
}
