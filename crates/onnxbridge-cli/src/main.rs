mod cli;

use std::{io, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use onnxbridge_backend_ort::{OptimizationLevel, OrtBackend, OrtOptions};
use onnxbridge_core::{Device, IOName, InferRequest};
use onnxbridge_onnx::PatchTarget;
use onnxbridge_runtime::{Runner, RunnerConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log)?;

    match cli.command {
        Command::Infer {
            input_name,
            output_name,
            optimization_level,
            intra_threads,
            device,
        } => {
            let config = RunnerConfig {
                input_name: IOName::new(input_name),
                output_name: IOName::new(output_name),
                device: parse_device(&device)?,
                ..RunnerConfig::default()
            };
            let options = OrtOptions {
                optimization_level: parse_optimization_level(optimization_level)?,
                intra_threads,
            };
            infer(config, options)
        }
        Command::Patch {
            model_path,
            ir_version,
            opset_version,
            keep_external_data,
        } => {
            let target = PatchTarget {
                ir_version,
                opset_version,
                inline_external_data: !keep_external_data,
                ..PatchTarget::default()
            };
            patch(model_path, &target)
        }
    }
}

/// Diagnostics go to stderr so stdout carries nothing but results.
fn init_tracing(log: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log).with_context(|| format!("invalid log filter: {log}"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn infer(config: RunnerConfig, options: OrtOptions) -> Result<()> {
    let request = InferRequest::from_reader(io::stdin().lock()).context("invalid request on stdin")?;

    let runner = Runner::new(OrtBackend::with_options(options), config);
    let output = runner
        .run_request(&request)
        .with_context(|| format!("inference failed for {}", request.model_path.display()))?;

    let line = serde_json::to_string(&output.to_json()).context("failed to encode output")?;
    println!("{line}");
    Ok(())
}

fn patch(model_path: Option<PathBuf>, target: &PatchTarget) -> Result<()> {
    let path = match model_path {
        Some(path) => path,
        None => onnxbridge_onnx::default_model_path().context("no --model-path given")?,
    };

    let report = onnxbridge_onnx::patch_file(&path, target)
        .with_context(|| format!("failed to patch {}", path.display()))?;
    tracing::debug!(
        path = %report.path.display(),
        bytes = report.bytes_written,
        inlined = report.inlined.len(),
        "patch complete"
    );

    println!("Model IR version: {}", display_version(report.after.ir_version));
    println!(
        "Model opset version: {}",
        display_version(report.after.first_opset_version())
    );
    Ok(())
}

fn display_version(version: Option<i64>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

fn parse_device(raw: &str) -> Result<Device> {
    if raw.eq_ignore_ascii_case("cpu") {
        return Ok(Device::Cpu);
    }

    if let Some(rest) = raw.strip_prefix("cuda:") {
        let device_id: u32 = rest.parse().context("invalid cuda device id")?;
        return Ok(Device::Cuda { device_id });
    }

    anyhow::bail!("unsupported device: {raw} (expected cpu or cuda:N)");
}

fn parse_optimization_level(level: u8) -> Result<OptimizationLevel> {
    Ok(match level {
        0 => OptimizationLevel::Disable,
        1 => OptimizationLevel::Basic,
        2 => OptimizationLevel::Extended,
        3 => OptimizationLevel::All,
        other => anyhow::bail!("unsupported optimization level: {other} (expected 0-3)"),
    })
}
