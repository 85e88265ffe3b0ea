use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use onnxbridge_backend_ort::OrtBackend;
use onnxbridge_core::{
    Backend, BackendModel, DType, Device, Error, IOName, ModelArtifact, Shape, Tensor,
};
use onnxbridge_onnx::{fixture, patch_bytes, PatchTarget};

const INPUT_SHAPE: [usize; 4] = [1, 3, 640, 640];

fn pooling_artifact() -> ModelArtifact {
    let model = fixture::pooling_model(8, &[("", 15)]);
    ModelArtifact::OnnxBytes(Bytes::from(fixture::encode(&model)))
}

fn input(values: Vec<f32>) -> Result<Vec<(IOName, Tensor)>> {
    let tensor = Tensor::from_values(Shape::from_slice(&INPUT_SHAPE), &values)?;
    Ok(vec![(IOName::new("images"), tensor)])
}

#[test]
fn reports_declared_io() -> Result<()> {
    let model = OrtBackend::new().load(&pooling_artifact(), &Device::Cpu)?;
    let spec = model.spec();

    let images = spec.input(&IOName::new("images"))?;
    assert_eq!(images.dtype, Some(DType::F32));
    assert_eq!(images.dims, vec![Some(1), Some(3), Some(640), Some(640)]);

    let output = spec.output(&IOName::new("output0"))?;
    assert_eq!(output.rank(), 4);
    Ok(())
}

#[test]
fn pools_each_channel() -> Result<()> {
    let mut model = OrtBackend::new().load(&pooling_artifact(), &Device::Cpu)?;

    let plane = 640 * 640;
    let values: Vec<f32> = (0..3 * plane).map(|i| (i / plane) as f32).collect();
    let outputs = model.infer(input(values)?, &[IOName::new("output0")])?;
    let out = outputs.first().context("missing model output")?;

    assert_eq!(out.dtype(), DType::F32);
    assert_eq!(out.shape().dims(), &[1, 3, 1, 1]);
    let means = out.to_vec::<f32>()?;
    for (channel, mean) in means.iter().enumerate() {
        assert!((mean - channel as f32).abs() < 1e-4, "channel {channel}: {mean}");
    }
    Ok(())
}

#[test]
fn unknown_bindings_fail_before_running() -> Result<()> {
    let mut model = OrtBackend::new().load(&pooling_artifact(), &Device::Cpu)?;
    let numel = INPUT_SHAPE.iter().product();

    let err = model
        .infer(input(vec![0.0; numel])?, &[IOName::new("boxes")])
        .unwrap_err();
    assert!(matches!(err, Error::Binding { ref name, .. } if name == "boxes"), "{err}");

    let tensor = Tensor::from_values(Shape::from_slice(&INPUT_SHAPE), &vec![0.0f32; numel])?;
    let err = model
        .infer(vec![(IOName::new("pixels"), tensor)], &[IOName::new("output0")])
        .unwrap_err();
    assert!(matches!(err, Error::Binding { ref name, .. } if name == "pixels"), "{err}");
    Ok(())
}

#[test]
fn missing_model_is_a_session_error() {
    let artifact = ModelArtifact::OnnxPath(Path::new("missing.onnx").to_path_buf());
    let err = OrtBackend::new().load(&artifact, &Device::Cpu).err();
    assert!(matches!(err, Some(Error::Session { .. })), "{err:?}");
}

#[test]
fn patched_model_becomes_loadable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("model.onnx");
    let future = fixture::encode(&fixture::pooling_model(99, &[("", 15)]));
    std::fs::write(&path, &future)?;

    let artifact = ModelArtifact::OnnxPath(path.clone());
    let err = OrtBackend::new().load(&artifact, &Device::Cpu).err();
    assert!(matches!(err, Some(Error::Session { .. })), "{err:?}");

    let patched = patch_bytes(&future, &PatchTarget::default(), dir.path())?;
    std::fs::write(&path, patched.bytes)?;
    OrtBackend::new().load(&artifact, &Device::Cpu)?;
    Ok(())
}
