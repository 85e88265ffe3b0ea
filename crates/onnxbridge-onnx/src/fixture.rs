//! Minimal ONNX messages for building models in tests.
//!
//! Only the fields needed to describe small graphs are declared.

use prost::Message;

/// `TensorProto.DataType.FLOAT`
pub const FLOAT: i32 = 1;
/// `AttributeProto.AttributeType.TENSOR`
pub const ATTRIBUTE_TENSOR: i32 = 4;
/// `AttributeProto.AttributeType.GRAPH`
pub const ATTRIBUTE_GRAPH: i32 = 5;

#[derive(Clone, PartialEq, Message)]
pub struct ModelProto {
    #[prost(int64, tag = "1")]
    pub ir_version: i64,
    #[prost(string, tag = "2")]
    pub producer_name: String,
    #[prost(message, optional, tag = "7")]
    pub graph: Option<GraphProto>,
    #[prost(message, repeated, tag = "8")]
    pub opset_import: Vec<OperatorSetIdProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OperatorSetIdProto {
    #[prost(string, tag = "1")]
    pub domain: String,
    #[prost(int64, tag = "2")]
    pub version: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct GraphProto {
    #[prost(message, repeated, tag = "1")]
    pub node: Vec<NodeProto>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, repeated, tag = "5")]
    pub initializer: Vec<TensorProto>,
    #[prost(message, repeated, tag = "11")]
    pub input: Vec<ValueInfoProto>,
    #[prost(message, repeated, tag = "12")]
    pub output: Vec<ValueInfoProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NodeProto {
    #[prost(string, repeated, tag = "1")]
    pub input: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub output: Vec<String>,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub op_type: String,
    #[prost(message, repeated, tag = "5")]
    pub attribute: Vec<AttributeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AttributeProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "5")]
    pub t: Option<TensorProto>,
    #[prost(message, optional, tag = "6")]
    pub g: Option<GraphProto>,
    #[prost(message, repeated, tag = "10")]
    pub tensors: Vec<TensorProto>,
    #[prost(int32, tag = "20")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValueInfoProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub r#type: Option<TypeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TypeProto {
    #[prost(message, optional, tag = "1")]
    pub tensor_type: Option<TensorTypeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorTypeProto {
    #[prost(int32, tag = "1")]
    pub elem_type: i32,
    #[prost(message, optional, tag = "2")]
    pub shape: Option<TensorShapeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorShapeProto {
    #[prost(message, repeated, tag = "1")]
    pub dim: Vec<Dimension>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Dimension {
    #[prost(int64, optional, tag = "1")]
    pub dim_value: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorProto {
    #[prost(int64, repeated, tag = "1")]
    pub dims: Vec<i64>,
    #[prost(int32, tag = "2")]
    pub data_type: i32,
    #[prost(string, tag = "8")]
    pub name: String,
    #[prost(bytes = "vec", tag = "9")]
    pub raw_data: Vec<u8>,
    #[prost(message, repeated, tag = "13")]
    pub external_data: Vec<StringStringEntryProto>,
    #[prost(int32, tag = "14")]
    pub data_location: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct StringStringEntryProto {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

pub fn float_value_info(name: &str, dims: &[i64]) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            tensor_type: Some(TensorTypeProto {
                elem_type: FLOAT,
                shape: Some(TensorShapeProto {
                    dim: dims
                        .iter()
                        .map(|&d| Dimension { dim_value: Some(d) })
                        .collect(),
                }),
            }),
        }),
    }
}

/// `images [1, 3, 640, 640] -> GlobalAveragePool -> output0 [1, 3, 1, 1]`.
pub fn pooling_model(ir_version: i64, opsets: &[(&str, i64)]) -> ModelProto {
    pooling_model_with_names(ir_version, opsets, "images", "output0")
}

pub fn pooling_model_with_names(
    ir_version: i64,
    opsets: &[(&str, i64)],
    input: &str,
    output: &str,
) -> ModelProto {
    ModelProto {
        ir_version,
        producer_name: "onnxbridge-fixture".to_string(),
        graph: Some(GraphProto {
            node: vec![NodeProto {
                input: vec![input.to_string()],
                output: vec![output.to_string()],
                name: "pool".to_string(),
                op_type: "GlobalAveragePool".to_string(),
                attribute: Vec::new(),
            }],
            name: "icon_detector".to_string(),
            initializer: Vec::new(),
            input: vec![float_value_info(input, &[1, 3, 640, 640])],
            output: vec![float_value_info(output, &[1, 3, 1, 1])],
        }),
        opset_import: opsets
            .iter()
            .map(|&(domain, version)| OperatorSetIdProto {
                domain: domain.to_string(),
                version,
            })
            .collect(),
    }
}

/// A float tensor of `length / 4` elements whose data lives in `location`.
pub fn external_tensor(name: &str, location: &str, offset: u64, length: u64) -> TensorProto {
    let entry = |key: &str, value: String| StringStringEntryProto {
        key: key.to_string(),
        value,
    };
    TensorProto {
        dims: vec![(length / 4) as i64],
        data_type: FLOAT,
        name: name.to_string(),
        raw_data: Vec::new(),
        external_data: vec![
            entry("location", location.to_string()),
            entry("offset", offset.to_string()),
            entry("length", length.to_string()),
        ],
        data_location: 1,
    }
}

/// Adds an unused float initializer stored in `location`.
pub fn add_external_initializer(
    model: &mut ModelProto,
    name: &str,
    location: &str,
    offset: u64,
    length: u64,
) {
    if let Some(graph) = model.graph.as_mut() {
        graph
            .initializer
            .push(external_tensor(name, location, offset, length));
    }
}

/// Adds a `Constant` node whose `value` attribute is stored in `location`.
pub fn add_external_constant(
    model: &mut ModelProto,
    name: &str,
    location: &str,
    offset: u64,
    length: u64,
) {
    if let Some(graph) = model.graph.as_mut() {
        graph.node.push(NodeProto {
            input: Vec::new(),
            output: vec![name.to_string()],
            name: format!("{name}_constant"),
            op_type: "Constant".to_string(),
            attribute: vec![AttributeProto {
                name: "value".to_string(),
                t: Some(external_tensor(name, location, offset, length)),
                r#type: ATTRIBUTE_TENSOR,
                ..AttributeProto::default()
            }],
        });
    }
}

/// Adds a `Loop`-style node whose `body` subgraph holds an initializer
/// stored in `location`.
pub fn add_external_subgraph_initializer(
    model: &mut ModelProto,
    name: &str,
    location: &str,
    offset: u64,
    length: u64,
) {
    let body = GraphProto {
        name: "body".to_string(),
        initializer: vec![external_tensor(name, location, offset, length)],
        ..GraphProto::default()
    };
    if let Some(graph) = model.graph.as_mut() {
        graph.node.push(NodeProto {
            input: Vec::new(),
            output: Vec::new(),
            name: "loop".to_string(),
            op_type: "Loop".to_string(),
            attribute: vec![AttributeProto {
                name: "body".to_string(),
                g: Some(body),
                r#type: ATTRIBUTE_GRAPH,
                ..AttributeProto::default()
            }],
        });
    }
}

pub fn encode(model: &ModelProto) -> Vec<u8> {
    model.encode_to_vec()
}

pub fn decode(bytes: &[u8]) -> Result<ModelProto, prost::DecodeError> {
    ModelProto::decode(bytes)
}
