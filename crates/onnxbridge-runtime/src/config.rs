use onnxbridge_core::{Device, IOName, Shape};

/// Input binding of the exported icon detector.
pub const INPUT_NAME: &str = "images";
/// Output binding of the exported icon detector.
pub const OUTPUT_NAME: &str = "output0";
/// NCHW: one RGB image of 640x640.
pub const INPUT_SHAPE: [usize; 4] = [1, 3, 640, 640];

#[derive(Clone, Debug, PartialEq)]
pub struct RunnerConfig {
    pub input_name: IOName,
    pub output_name: IOName,
    pub input_shape: Shape,
    pub device: Device,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            input_name: IOName::new(INPUT_NAME),
            output_name: IOName::new(OUTPUT_NAME),
            input_shape: Shape::from_slice(&INPUT_SHAPE),
            device: Device::Cpu,
        }
    }
}
