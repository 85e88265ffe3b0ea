use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::{
    external::inline_graph,
    model::{
        inspect, parse_opset, ModelVersions, MODEL_GRAPH, MODEL_IR_VERSION, MODEL_OPSET_IMPORT,
        OPSET_VERSION,
    },
    wire::{put_bytes_field, put_varint_field, Field, Fields},
    Error, Result,
};

/// Protobuf messages cannot exceed 2 GiB.
const MAX_MODEL_SIZE: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchTarget {
    pub ir_version: i64,
    pub opset_version: i64,
    /// Operator-set domains whose version is rewritten.
    pub domains: Vec<String>,
    pub inline_external_data: bool,
}

impl Default for PatchTarget {
    fn default() -> Self {
        Self {
            ir_version: 8,
            opset_version: 15,
            domains: vec![String::new(), "ai.onnx".to_string()],
            inline_external_data: true,
        }
    }
}

impl PatchTarget {
    pub fn applies_to(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d == domain)
    }
}

#[derive(Clone, Debug)]
pub struct Patched {
    pub bytes: Vec<u8>,
    /// Tensors whose sidecar data was copied into the model.
    pub inlined: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct PatchReport {
    pub path: PathBuf,
    pub before: ModelVersions,
    pub after: ModelVersions,
    pub inlined: Vec<String>,
    pub bytes_written: usize,
}

/// Rewrites the version metadata of an in-memory model.
///
/// Every field other than `ir_version`, the version of matching opset
/// entries and inlined initializers is copied byte for byte. Running it on
/// its own output returns identical bytes.
pub fn patch_bytes(bytes: &[u8], target: &PatchTarget, model_dir: &Path) -> Result<Patched> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut inlined = Vec::new();
    let mut wrote_ir_version = false;
    let mut has_graph = false;

    for field in Fields::new(bytes) {
        let field = field?;
        match field.tag {
            MODEL_IR_VERSION => {
                field.varint("ir_version")?;
                if !wrote_ir_version {
                    put_varint_field(&mut out, MODEL_IR_VERSION, target.ir_version as u64);
                    wrote_ir_version = true;
                }
            }
            MODEL_OPSET_IMPORT => match patch_opset(&field, target)? {
                Some(entry) => put_bytes_field(&mut out, MODEL_OPSET_IMPORT, &entry),
                None => out.extend_from_slice(field.raw),
            },
            MODEL_GRAPH => {
                has_graph = true;
                let graph = if target.inline_external_data {
                    inline_graph(&field, model_dir, &mut inlined)?
                } else {
                    field.bytes("graph")?;
                    None
                };
                match graph {
                    Some(graph) => put_bytes_field(&mut out, MODEL_GRAPH, &graph),
                    None => out.extend_from_slice(field.raw),
                }
            }
            _ => out.extend_from_slice(field.raw),
        }
    }

    if !has_graph {
        return Err(Error::decode(bytes.len(), "model has no graph"));
    }
    if !wrote_ir_version {
        put_varint_field(&mut out, MODEL_IR_VERSION, target.ir_version as u64);
    }
    let size = out.len() as u64;
    if size >= MAX_MODEL_SIZE {
        return Err(Error::TooLarge { size });
    }

    Ok(Patched {
        bytes: out,
        inlined,
    })
}

fn patch_opset(field: &Field<'_>, target: &PatchTarget) -> Result<Option<Vec<u8>>> {
    let opset = parse_opset(field)?;
    if !target.applies_to(&opset.domain) {
        return Ok(None);
    }

    let entry = field.bytes("opset_import")?;
    let mut out = Vec::with_capacity(entry.len() + 2);
    let mut wrote_version = false;
    for sub in Fields::at(entry, field.payload_offset()) {
        let sub = sub?;
        if sub.tag != OPSET_VERSION {
            out.extend_from_slice(sub.raw);
        } else if !wrote_version {
            put_varint_field(&mut out, OPSET_VERSION, target.opset_version as u64);
            wrote_version = true;
        }
    }
    if !wrote_version {
        put_varint_field(&mut out, OPSET_VERSION, target.opset_version as u64);
    }
    Ok(Some(out))
}

/// Patches the model at `path` in place.
///
/// The file is only replaced once the patched model is complete: it is
/// written to a temporary file in the same directory and renamed over the
/// original, so any failure leaves the original untouched. A symlinked path
/// is followed and its target is replaced; the link itself stays.
pub fn patch_file(path: impl AsRef<Path>, target: &PatchTarget) -> Result<PatchReport> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let before = inspect(&bytes)?;
    info!(
        path = %path.display(),
        ir_version = ?before.ir_version,
        opset_version = ?before.first_opset_version(),
        "loaded model"
    );

    let model_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let patched = patch_bytes(&bytes, target, model_dir)?;
    if !target.inline_external_data && !before.external_tensors.is_empty() {
        warn!(
            tensors = ?before.external_tensors,
            "model keeps external data; its sidecar files must stay next to it"
        );
    }

    write_atomically(path, &patched.bytes)?;
    let after = inspect(&patched.bytes)?;
    info!(
        path = %path.display(),
        ir_version = ?after.ir_version,
        opset_version = ?after.first_opset_version(),
        inlined = patched.inlined.len(),
        "patched model"
    );

    Ok(PatchReport {
        path: path.to_path_buf(),
        before,
        after,
        inlined: patched.inlined,
        bytes_written: patched.bytes.len(),
    })
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let target = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let permissions = fs::metadata(&target)
        .map_err(|e| Error::io(&target, e))?
        .permissions();

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().set_permissions(permissions))
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(&target).map_err(|e| Error::Persist {
        path: target.clone(),
        source: e.error,
    })?;
    Ok(())
}
