use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a valid ONNX model: {reason} (byte {offset})")]
    Decode { offset: usize, reason: String },

    #[error("external data of tensor {tensor:?}: {reason}")]
    External { tensor: String, reason: String },

    #[error("patched model would be {size} bytes, over the 2 GiB protobuf limit")]
    TooLarge { size: u64 },

    #[error("failed to replace {}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot locate the default model: neither JULIA_DEPOT_PATH nor HOME is set")]
    NoDepot,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(offset: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn external(tensor: &str, reason: impl Into<String>) -> Self {
        Self::External {
            tensor: tensor.to_string(),
            reason: reason.into(),
        }
    }
}
