use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "onnxbridge",
    version,
    about = "Run the icon detector on a JSON tensor, or patch its ONNX metadata"
)]
pub struct Cli {
    /// Log filter for stderr diagnostics (RUST_LOG takes precedence)
    #[arg(long, global = true, env = "ONNXBRIDGE_LOG", default_value = "info,ort=warn")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read {"model_path", "input_tensor"} from stdin and print the output tensor
    Infer {
        /// Graph input the tensor is bound to
        #[arg(long, default_value = "images")]
        input_name: String,

        /// Graph output returned on stdout
        #[arg(long, default_value = "output0")]
        output_name: String,

        /// Graph optimization level (0 disables, 3 enables everything)
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(0..=3))]
        optimization_level: u8,

        /// Intra-op threads used by ONNX Runtime
        #[arg(long)]
        intra_threads: Option<usize>,

        /// Device for inference (cpu or cuda:N)
        #[arg(long, default_value = "cpu")]
        device: String,
    },

    /// Rewrite a model's IR and opset versions in place
    Patch {
        /// Model to patch; defaults to the OmniParser icon detector datadep
        #[arg(long, env = "ONNXBRIDGE_MODEL_PATH")]
        model_path: Option<PathBuf>,

        /// IR version to write
        #[arg(long, default_value_t = 8)]
        ir_version: i64,

        /// Version written to the default-domain opset entries
        #[arg(long, default_value_t = 15)]
        opset_version: i64,

        /// Leave external tensors referencing their sidecar files
        #[arg(long)]
        keep_external_data: bool,
    },
}
