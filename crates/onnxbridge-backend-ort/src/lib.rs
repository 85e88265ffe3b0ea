use std::path::PathBuf;

use bytes::Bytes;
use onnxbridge_core::{
    Backend, BackendModel, DType, Device, Error, IOName, IoKind, ModelArtifact, ModelSpec, Result,
    Shape, Tensor, TensorSpec,
};
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session, SessionInputValue,
    },
    tensor::TensorElementType,
    value::{DynValue, ValueRef, ValueType},
};
use tracing::debug;

/// Graph optimizations applied when a session is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptimizationLevel {
    Disable,
    Basic,
    Extended,
    #[default]
    All,
}

impl From<OptimizationLevel> for GraphOptimizationLevel {
    fn from(level: OptimizationLevel) -> Self {
        match level {
            OptimizationLevel::Disable => GraphOptimizationLevel::Disable,
            OptimizationLevel::Basic => GraphOptimizationLevel::Level1,
            OptimizationLevel::Extended => GraphOptimizationLevel::Level2,
            OptimizationLevel::All => GraphOptimizationLevel::Level3,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OrtOptions {
    pub optimization_level: OptimizationLevel,
    /// Intra-op thread count; `None` lets ONNX Runtime decide.
    pub intra_threads: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct OrtBackend {
    options: OrtOptions,
}

impl OrtBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: OrtOptions) -> Self {
        Self { options }
    }
}

pub struct OrtModel {
    spec: ModelSpec,
    session: Session,
    path: PathBuf,
}

impl Backend for OrtBackend {
    type Model = OrtModel;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(&self, artifact: &ModelArtifact, device: &Device) -> Result<Self::Model> {
        let path = artifact.display_path().to_path_buf();
        let session_error = |e: ort::Error| Error::session(&path, e);

        let builder = Session::builder()
            .and_then(|b| b.with_optimization_level(self.options.optimization_level.into()))
            .map_err(session_error)?;
        let builder = match self.options.intra_threads {
            Some(threads) => builder.with_intra_threads(threads).map_err(session_error)?,
            None => builder,
        };
        let builder = configure_session_builder(builder, device).map_err(session_error)?;

        let session = match artifact {
            ModelArtifact::OnnxPath(file) => builder.commit_from_file(file),
            ModelArtifact::OnnxBytes(bytes) => builder.commit_from_memory(bytes),
        }
        .map_err(session_error)?;

        let spec = build_model_spec(&session);
        debug!(
            path = %path.display(),
            inputs = ?spec.inputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            outputs = ?spec.outputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "created onnxruntime session"
        );

        Ok(OrtModel {
            spec,
            session,
            path,
        })
    }
}

impl BackendModel for OrtModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&mut self, inputs: Vec<(IOName, Tensor)>, outputs: &[IOName]) -> Result<Vec<Tensor>> {
        for (name, _) in &inputs {
            self.spec.input(name)?;
        }
        for name in outputs {
            self.spec.output(name)?;
        }

        let mut ort_inputs = Vec::with_capacity(inputs.len());
        for (name, input) in inputs {
            let value = tensor_to_ort_value(&input)?;
            ort_inputs.push((name.0, SessionInputValue::from(value)));
        }

        let path = &self.path;
        let results = self.session.run(ort_inputs).map_err(Error::execution)?;
        debug!(path = %path.display(), "forward pass finished");

        outputs
            .iter()
            .map(|wanted| {
                let (_, value) = results
                    .iter()
                    .find(|(name, _)| *name == wanted.as_str())
                    .ok_or_else(|| Error::Binding {
                        kind: IoKind::Output,
                        name: wanted.0.clone(),
                        available: results.iter().map(|(name, _)| name.to_string()).collect(),
                    })?;
                ort_value_to_tensor(&value)
            })
            .collect()
    }
}

fn build_model_spec(session: &Session) -> ModelSpec {
    let inputs = session
        .inputs
        .iter()
        .map(|input| tensor_spec_from_value_type(&input.name, &input.input_type))
        .collect();

    let outputs = session
        .outputs
        .iter()
        .map(|output| tensor_spec_from_value_type(&output.name, &output.output_type))
        .collect();

    ModelSpec { inputs, outputs }
}

fn configure_session_builder(
    builder: SessionBuilder,
    device: &Device,
) -> ort::Result<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => configure_cuda(builder, *device_id),
    }
}

fn configure_cuda(builder: SessionBuilder, device_id: u32) -> ort::Result<SessionBuilder> {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::cuda::CUDAExecutionProvider;
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32)
            .build()
            .error_on_failure();
        builder.with_execution_providers([ep])
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = (builder, device_id);
        Err(ort::Error::new(
            "CUDA requested but onnxbridge-backend-ort was built without the `cuda` feature",
        ))
    }
}

/// Non-tensor IO (sequences, maps) is described with no dtype and no dims.
fn tensor_spec_from_value_type(name: &str, value_type: &ValueType) -> TensorSpec {
    let (dtype, dims) = match value_type {
        ValueType::Tensor { ty, shape, .. } => (
            ort_tensor_element_to_dtype(*ty).ok(),
            shape
                .iter()
                .map(|d| if *d < 0 { None } else { Some(*d as usize) })
                .collect(),
        ),
        _ => (None, Vec::new()),
    };

    TensorSpec {
        name: IOName(name.to_string()),
        dtype,
        dims,
    }
}

fn ort_tensor_element_to_dtype(ty: TensorElementType) -> Result<DType> {
    match ty {
        TensorElementType::Float32 => Ok(DType::F32),
        TensorElementType::Float64 => Ok(DType::F64),
        TensorElementType::Int64 => Ok(DType::I64),
        TensorElementType::Int32 => Ok(DType::I32),
        TensorElementType::Uint8 => Ok(DType::U8),
        _ => Err(Error::UnsupportedDType(ty.to_string())),
    }
}

fn tensor_to_ort_value(tensor: &Tensor) -> Result<DynValue> {
    let shape: Vec<usize> = tensor.shape().dims().to_vec();

    let value = match tensor.dtype() {
        DType::F32 => ort::value::Tensor::from_array((shape, tensor.to_vec::<f32>()?))
            .map_err(Error::execution)?
            .into_dyn(),
        DType::F64 => ort::value::Tensor::from_array((shape, tensor.to_vec::<f64>()?))
            .map_err(Error::execution)?
            .into_dyn(),
        DType::I64 => ort::value::Tensor::from_array((shape, tensor.to_vec::<i64>()?))
            .map_err(Error::execution)?
            .into_dyn(),
        DType::I32 => ort::value::Tensor::from_array((shape, tensor.to_vec::<i32>()?))
            .map_err(Error::execution)?
            .into_dyn(),
        DType::U8 => ort::value::Tensor::from_array((shape, tensor.bytes().to_vec()))
            .map_err(Error::execution)?
            .into_dyn(),
    };

    Ok(value)
}

fn ort_value_to_tensor(value: &ValueRef<'_>) -> Result<Tensor> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        return Err(Error::UnsupportedDType("non-tensor output".to_string()));
    };

    let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
    let shape = Shape::from_slice(&dims);

    match *ty {
        TensorElementType::Float32 => {
            let (_, data) = value.try_extract_tensor::<f32>().map_err(Error::execution)?;
            Tensor::from_values(shape, data)
        }
        TensorElementType::Float64 => {
            let (_, data) = value.try_extract_tensor::<f64>().map_err(Error::execution)?;
            Tensor::from_values(shape, data)
        }
        TensorElementType::Int64 => {
            let (_, data) = value.try_extract_tensor::<i64>().map_err(Error::execution)?;
            Tensor::from_values(shape, data)
        }
        TensorElementType::Int32 => {
            let (_, data) = value.try_extract_tensor::<i32>().map_err(Error::execution)?;
            Tensor::from_values(shape, data)
        }
        TensorElementType::Uint8 => {
            let (_, data) = value.try_extract_tensor::<u8>().map_err(Error::execution)?;
            Tensor::from_cpu_bytes(DType::U8, shape, Bytes::copy_from_slice(data))
        }
        other => Err(Error::UnsupportedDType(other.to_string())),
    }
}
