//! Inlining of tensors stored in sidecar files.
//!
//! Every tensor reachable from the graph is resolved, including node
//! attributes and subgraphs. Each external entry is read from
//! `<model dir>/<location>` at `offset`/`length` and written back as
//! `raw_data`, dropping `external_data` and `data_location`.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Component, Path},
};

use tracing::debug;

use crate::{
    model::{
        rewrite_graph_tensors, TensorHeader, TENSOR_DATA_LOCATION, TENSOR_EXTERNAL_DATA,
        TENSOR_RAW_DATA,
    },
    wire::{put_bytes_field, Field, Fields},
    Error, Result,
};

/// Rewrites a `GraphProto` payload. Returns `None` when no tensor is external.
pub(crate) fn inline_graph(
    graph: &Field<'_>,
    model_dir: &Path,
    inlined: &mut Vec<String>,
) -> Result<Option<Vec<u8>>> {
    rewrite_graph_tensors(graph, &mut |tensor: &Field<'_>| {
        inline_tensor(tensor, model_dir, inlined)
    })
}

fn inline_tensor(
    field: &Field<'_>,
    model_dir: &Path,
    inlined: &mut Vec<String>,
) -> Result<Option<Vec<u8>>> {
    let header = TensorHeader::parse(field)?;
    if !header.is_external() {
        return Ok(None);
    }

    let data = read_external(&header, model_dir)?;
    debug!(tensor = %header.name, bytes = data.len(), "inlined external tensor");

    let payload = field.bytes("tensor")?;
    let mut out = Vec::with_capacity(payload.len() + data.len() + 8);
    for sub in Fields::at(payload, field.payload_offset()) {
        let sub = sub?;
        match sub.tag {
            TENSOR_EXTERNAL_DATA | TENSOR_DATA_LOCATION | TENSOR_RAW_DATA => {}
            _ => out.extend_from_slice(sub.raw),
        }
    }
    put_bytes_field(&mut out, TENSOR_RAW_DATA, &data);

    inlined.push(header.name);
    Ok(Some(out))
}

fn read_external(header: &TensorHeader, model_dir: &Path) -> Result<Vec<u8>> {
    let name = header.name.as_str();
    let location = header
        .external_value("location")
        .ok_or_else(|| Error::external(name, "no location entry"))?;
    let relative = Path::new(location);
    if relative.is_absolute()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(Error::external(
            name,
            format!("location {location:?} escapes the model directory"),
        ));
    }
    let offset = parse_number(header, "offset")?.unwrap_or(0);
    let length = parse_number(header, "length")?;

    let path = model_dir.join(relative);
    let mut file = File::open(&path).map_err(|e| Error::io(&path, e))?;
    let file_len = file.metadata().map_err(|e| Error::io(&path, e))?.len();
    let length = length.unwrap_or_else(|| file_len.saturating_sub(offset));
    let end = offset.checked_add(length).filter(|&end| end <= file_len);
    if end.is_none() {
        return Err(Error::external(
            name,
            format!("{length} bytes at offset {offset} exceed {location} ({file_len} bytes)"),
        ));
    }

    let mut data = vec![0; length as usize];
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(&mut data))
        .map_err(|e| Error::io(&path, e))?;
    Ok(data)
}

fn parse_number(header: &TensorHeader, key: &str) -> Result<Option<u64>> {
    header
        .external_value(key)
        .map(|raw| {
            raw.parse()
                .map_err(|_| Error::external(&header.name, format!("{key} {raw:?} is not a number")))
        })
        .transpose()
}
