use crate::{Device, IOName, ModelArtifact, ModelSpec, Result, Tensor};

pub trait Backend {
    type Model: BackendModel;

    fn name(&self) -> &'static str;
    fn load(&self, artifact: &ModelArtifact, device: &Device) -> Result<Self::Model>;
}

pub trait BackendModel {
    fn spec(&self) -> &ModelSpec;

    /// Runs one forward pass with the given named inputs.
    /// Returns the requested outputs in the order they were asked for.
    fn infer(&mut self, inputs: Vec<(IOName, Tensor)>, outputs: &[IOName]) -> Result<Vec<Tensor>>;
}
