use crate::{
    wire::{put_bytes_field, Field, Fields},
    Error, Result,
};

// ModelProto
pub(crate) const MODEL_IR_VERSION: u32 = 1;
pub(crate) const MODEL_GRAPH: u32 = 7;
pub(crate) const MODEL_OPSET_IMPORT: u32 = 8;
// OperatorSetIdProto
pub(crate) const OPSET_DOMAIN: u32 = 1;
pub(crate) const OPSET_VERSION: u32 = 2;
// GraphProto
pub(crate) const GRAPH_NODE: u32 = 1;
pub(crate) const GRAPH_INITIALIZER: u32 = 5;
pub(crate) const GRAPH_SPARSE_INITIALIZER: u32 = 15;
// NodeProto
pub(crate) const NODE_ATTRIBUTE: u32 = 5;
// AttributeProto
pub(crate) const ATTRIBUTE_T: u32 = 5;
pub(crate) const ATTRIBUTE_G: u32 = 6;
pub(crate) const ATTRIBUTE_TENSORS: u32 = 10;
pub(crate) const ATTRIBUTE_GRAPHS: u32 = 11;
pub(crate) const ATTRIBUTE_SPARSE_TENSOR: u32 = 22;
pub(crate) const ATTRIBUTE_SPARSE_TENSORS: u32 = 23;
// SparseTensorProto
pub(crate) const SPARSE_VALUES: u32 = 1;
pub(crate) const SPARSE_INDICES: u32 = 2;
// TensorProto
pub(crate) const TENSOR_NAME: u32 = 8;
pub(crate) const TENSOR_RAW_DATA: u32 = 9;
pub(crate) const TENSOR_EXTERNAL_DATA: u32 = 13;
pub(crate) const TENSOR_DATA_LOCATION: u32 = 14;
// StringStringEntryProto
pub(crate) const ENTRY_KEY: u32 = 1;
pub(crate) const ENTRY_VALUE: u32 = 2;

/// `TensorProto.DataLocation.EXTERNAL`
pub(crate) const DATA_LOCATION_EXTERNAL: u64 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpsetId {
    pub domain: String,
    pub version: i64,
}

/// The version metadata of a model, as found on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelVersions {
    pub ir_version: Option<i64>,
    pub opsets: Vec<OpsetId>,
    /// Tensors whose contents live in sidecar files, in graph order.
    /// Initializers, node attributes and subgraphs are all searched.
    pub external_tensors: Vec<String>,
}

impl ModelVersions {
    pub fn first_opset_version(&self) -> Option<i64> {
        self.opsets.first().map(|opset| opset.version)
    }
}

/// Reads the version metadata without modifying anything.
pub fn inspect(bytes: &[u8]) -> Result<ModelVersions> {
    let mut versions = ModelVersions::default();
    let mut has_graph = false;

    for field in Fields::new(bytes) {
        let field = field?;
        match field.tag {
            MODEL_IR_VERSION => versions.ir_version = Some(field.varint("ir_version")? as i64),
            MODEL_OPSET_IMPORT => versions.opsets.push(parse_opset(&field)?),
            MODEL_GRAPH => {
                has_graph = true;
                rewrite_graph_tensors(&field, &mut |tensor: &Field<'_>| {
                    let header = TensorHeader::parse(tensor)?;
                    if header.is_external() {
                        versions.external_tensors.push(header.name);
                    }
                    Ok(None)
                })?;
            }
            _ => {}
        }
    }

    if !has_graph {
        return Err(Error::decode(bytes.len(), "model has no graph"));
    }
    Ok(versions)
}

pub(crate) fn parse_opset(field: &Field<'_>) -> Result<OpsetId> {
    let entry = field.bytes("opset_import")?;
    let mut opset = OpsetId {
        domain: String::new(),
        version: 0,
    };
    for sub in Fields::at(entry, field.payload_offset()) {
        let sub = sub?;
        match sub.tag {
            OPSET_DOMAIN => opset.domain = sub.string("opset domain")?.to_string(),
            OPSET_VERSION => opset.version = sub.varint("opset version")? as i64,
            _ => {}
        }
    }
    Ok(opset)
}

/// A `TensorProto`, decoded just far enough to tell where its data lives.
#[derive(Clone, Debug, Default)]
pub(crate) struct TensorHeader {
    pub name: String,
    pub data_location: u64,
    pub external_data: Vec<(String, String)>,
}

impl TensorHeader {
    pub fn is_external(&self) -> bool {
        self.data_location == DATA_LOCATION_EXTERNAL
    }

    pub fn external_value(&self, key: &str) -> Option<&str> {
        self.external_data
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn parse(field: &Field<'_>) -> Result<Self> {
        let tensor = field.bytes("tensor")?;
        let mut header = Self::default();
        for sub in Fields::at(tensor, field.payload_offset()) {
            let sub = sub?;
            match sub.tag {
                TENSOR_NAME => header.name = sub.string("tensor name")?.to_string(),
                TENSOR_DATA_LOCATION => header.data_location = sub.varint("data_location")?,
                TENSOR_EXTERNAL_DATA => header.external_data.push(parse_entry(&sub)?),
                _ => {}
            }
        }
        Ok(header)
    }
}

fn parse_entry(field: &Field<'_>) -> Result<(String, String)> {
    let entry = field.bytes("external_data entry")?;
    let (mut key, mut value) = (String::new(), String::new());
    for sub in Fields::at(entry, field.payload_offset()) {
        let sub = sub?;
        match sub.tag {
            ENTRY_KEY => key = sub.string("entry key")?.to_string(),
            ENTRY_VALUE => value = sub.string("entry value")?.to_string(),
            _ => {}
        }
    }
    Ok((key, value))
}

pub(crate) type TensorRewrite<'f> = dyn FnMut(&Field<'_>) -> Result<Option<Vec<u8>>> + 'f;

/// Calls `on_tensor` for every `TensorProto` reachable from a graph:
/// initializers, sparse initializers, node attributes (`t`, `tensors`,
/// sparse variants) and the same inside subgraphs (`g`, `graphs`).
///
/// `on_tensor` may return a replacement encoding. The rewritten graph is
/// returned only when something was replaced; otherwise nothing is copied.
pub(crate) fn rewrite_graph_tensors(
    graph: &Field<'_>,
    on_tensor: &mut TensorRewrite<'_>,
) -> Result<Option<Vec<u8>>> {
    rewrite_fields(graph, "graph", |field| match field.tag {
        GRAPH_NODE => rewrite_fields(field, "node", |field| match field.tag {
            NODE_ATTRIBUTE => rewrite_attribute(field, on_tensor),
            _ => Ok(None),
        }),
        GRAPH_INITIALIZER => on_tensor(field),
        GRAPH_SPARSE_INITIALIZER => rewrite_sparse(field, on_tensor),
        _ => Ok(None),
    })
}

fn rewrite_attribute(
    attribute: &Field<'_>,
    on_tensor: &mut TensorRewrite<'_>,
) -> Result<Option<Vec<u8>>> {
    rewrite_fields(attribute, "attribute", |field| match field.tag {
        ATTRIBUTE_T | ATTRIBUTE_TENSORS => on_tensor(field),
        ATTRIBUTE_G | ATTRIBUTE_GRAPHS => rewrite_graph_tensors(field, on_tensor),
        ATTRIBUTE_SPARSE_TENSOR | ATTRIBUTE_SPARSE_TENSORS => rewrite_sparse(field, on_tensor),
        _ => Ok(None),
    })
}

fn rewrite_sparse(sparse: &Field<'_>, on_tensor: &mut TensorRewrite<'_>) -> Result<Option<Vec<u8>>> {
    rewrite_fields(sparse, "sparse tensor", |field| match field.tag {
        SPARSE_VALUES | SPARSE_INDICES => on_tensor(field),
        _ => Ok(None),
    })
}

/// Walks the sub-fields of a length-delimited message, replacing those for
/// which `rewrite` returns new bytes. The output buffer is only allocated on
/// the first replacement.
fn rewrite_fields<F>(message: &Field<'_>, what: &str, mut rewrite: F) -> Result<Option<Vec<u8>>>
where
    F: FnMut(&Field<'_>) -> Result<Option<Vec<u8>>>,
{
    let payload = message.bytes(what)?;
    let base = message.payload_offset();
    let mut out: Option<Vec<u8>> = None;

    for field in Fields::at(payload, base) {
        let field = field?;
        let Some(bytes) = rewrite(&field)? else {
            if let Some(buf) = out.as_mut() {
                buf.extend_from_slice(field.raw);
            }
            continue;
        };
        let buf = out.get_or_insert_with(|| {
            let start = field.offset - base;
            let mut buf = Vec::with_capacity(payload.len() + bytes.len());
            buf.extend_from_slice(&payload[..start]);
            buf
        });
        put_bytes_field(buf, field.tag, &bytes);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;

    #[test]
    fn reads_versions_and_opsets() -> anyhow::Result<()> {
        let model = fixture::pooling_model(10, &[("", 21), ("com.microsoft", 1)]);
        let versions = inspect(&fixture::encode(&model))?;

        assert_eq!(versions.ir_version, Some(10));
        assert_eq!(
            versions.opsets,
            vec![
                OpsetId {
                    domain: String::new(),
                    version: 21
                },
                OpsetId {
                    domain: "com.microsoft".to_string(),
                    version: 1
                },
            ]
        );
        assert_eq!(versions.first_opset_version(), Some(21));
        assert!(versions.external_tensors.is_empty());
        Ok(())
    }

    #[test]
    fn lists_external_initializers() -> anyhow::Result<()> {
        let mut model = fixture::pooling_model(9, &[("", 17)]);
        fixture::add_external_initializer(&mut model, "bias", "weights.bin", 0, 12);
        let versions = inspect(&fixture::encode(&model))?;

        assert_eq!(versions.external_tensors, vec!["bias".to_string()]);
        Ok(())
    }

    #[test]
    fn lists_external_attribute_and_subgraph_tensors() -> anyhow::Result<()> {
        let mut model = fixture::pooling_model(9, &[("", 17)]);
        fixture::add_external_constant(&mut model, "anchors", "weights.bin", 0, 8);
        fixture::add_external_subgraph_initializer(&mut model, "step", "weights.bin", 8, 4);
        fixture::add_external_initializer(&mut model, "bias", "weights.bin", 12, 4);
        let versions = inspect(&fixture::encode(&model))?;

        // Nodes are encoded before initializers.
        assert_eq!(versions.external_tensors, vec!["anchors", "step", "bias"]);
        Ok(())
    }

    #[test]
    fn requires_a_graph() {
        let mut model = fixture::pooling_model(9, &[("", 17)]);
        model.graph = None;
        let err = inspect(&fixture::encode(&model)).unwrap_err();
        assert!(err.to_string().contains("model has no graph"), "{err}");
    }

    #[test]
    fn rejects_garbage() {
        let err = inspect(b"definitely not protobuf").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }), "{err}");
    }
}
