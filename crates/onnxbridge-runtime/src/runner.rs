use std::path::Path;

use onnxbridge_core::{
    Backend, BackendModel, Error, InferRequest, IoKind, ModelArtifact, NdArray, Result, Shape,
    Tensor,
};
use tracing::{debug, info};

use crate::RunnerConfig;

/// Runs one forward pass per call. Nothing is cached between calls: every
/// run loads the model again.
pub struct Runner<B> {
    backend: B,
    config: RunnerConfig,
}

impl<B: Backend> Runner<B> {
    pub fn new(backend: B, config: RunnerConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn run_request(&self, request: &InferRequest) -> Result<Tensor> {
        self.run(&request.model_path, &request.input_tensor)
    }

    /// The input is coerced before the model is touched, so a shape
    /// mismatch never pays for a session.
    pub fn run(&self, model_path: &Path, input: &NdArray) -> Result<Tensor> {
        let tensor = prepare_input(input, &self.config.input_shape)?;

        let artifact = ModelArtifact::OnnxPath(model_path.to_path_buf());
        let mut model = self.backend.load(&artifact, &self.config.device)?;
        debug!(
            backend = self.backend.name(),
            path = %model_path.display(),
            "loaded model"
        );

        let output_name = &self.config.output_name;
        let outputs = model.infer(
            vec![(self.config.input_name.clone(), tensor)],
            std::slice::from_ref(output_name),
        )?;
        let output = outputs.into_iter().next().ok_or_else(|| Error::Binding {
            kind: IoKind::Output,
            name: output_name.0.clone(),
            available: Vec::new(),
        })?;
        debug!(output = %output_name, shape = %output.shape(), "inference finished");

        Ok(output)
    }
}

/// Converts to `float32` and reshapes to `target` without reordering
/// elements. Shapes already equal to `target` are kept as they are.
pub fn prepare_input(input: &NdArray, target: &Shape) -> Result<Tensor> {
    info!(shape = %input.shape(), "input tensor shape before reshape");
    info!(dtype = %input.dtype(), "input tensor type before conversion");

    let mut tensor = input.to_f32()?;
    if tensor.shape() != target {
        tensor = tensor.reshape(target.clone())?;
    }

    info!(shape = %tensor.shape(), "final input tensor shape");
    info!(dtype = %tensor.dtype(), "final input tensor type");
    Ok(tensor)
}
