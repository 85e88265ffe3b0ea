//! Request payload read by `onnxbridge infer`.
//!
//! The tensor arrives as arbitrarily nested JSON arrays of numbers. It is
//! flattened while deserializing so the elements are never materialized as a
//! `serde_json::Value` tree; the nesting must be rectangular, every leaf must
//! sit at the same depth and be a number.

use std::{fmt, io::Read, path::PathBuf};

use serde::{
    de::{self, DeserializeSeed, SeqAccess, Visitor},
    Deserialize, Deserializer,
};

use crate::{DType, Error, Result, Shape, Tensor};

#[derive(Clone, Debug, Deserialize)]
pub struct InferRequest {
    pub model_path: PathBuf,
    pub input_tensor: NdArray,
}

impl InferRequest {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader).map_err(|e| Error::Payload(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Payload(e.to_string()))
    }
}

/// Row-major numeric array decoded from JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct NdArray {
    shape: Shape,
    data: Vec<f64>,
    dtype: DType,
}

impl NdArray {
    pub fn new(shape: Shape, data: Vec<f64>) -> Result<Self> {
        if shape.numel() != data.len() {
            return Err(Error::ShapeMismatch {
                expected: shape,
                numel: data.len(),
            });
        }
        Ok(Self {
            shape,
            data,
            dtype: DType::F64,
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// `int64` when every element was written as an integer, `float64` otherwise.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Lossy conversion to single precision, keeping the shape.
    pub fn to_f32(&self) -> Result<Tensor> {
        let values: Vec<f32> = self.data.iter().map(|&v| v as f32).collect();
        Tensor::from_values(self.shape.clone(), &values)
    }
}

impl<'de> Deserialize<'de> for NdArray {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut builder = Builder {
            dims: Vec::new(),
            leaf_depth: None,
            data: Vec::new(),
            integral: true,
        };
        deserializer.deserialize_any(Level {
            depth: 0,
            builder: &mut builder,
        })?;
        builder.finish().map_err(de::Error::custom)
    }
}

struct Builder {
    dims: Vec<Option<usize>>,
    leaf_depth: Option<usize>,
    data: Vec<f64>,
    integral: bool,
}

impl Builder {
    fn leaf(&mut self, depth: usize, value: f64) -> std::result::Result<(), String> {
        match self.leaf_depth {
            None => self.leaf_depth = Some(depth),
            Some(expected) if expected != depth => {
                return Err(format!(
                    "inhomogeneous array: number at depth {depth}, expected depth {expected}"
                ))
            }
            Some(_) => {}
        }
        self.data.push(value);
        Ok(())
    }

    fn open(&self, depth: usize) -> std::result::Result<(), String> {
        match self.leaf_depth {
            Some(leaf) if depth >= leaf => Err(format!(
                "inhomogeneous array: nested array at depth {depth}, numbers at depth {leaf}"
            )),
            _ => Ok(()),
        }
    }

    fn close(&mut self, depth: usize, len: usize) -> std::result::Result<(), String> {
        if self.dims.len() <= depth {
            self.dims.resize(depth + 1, None);
        }
        match self.dims[depth] {
            None => {
                self.dims[depth] = Some(len);
                Ok(())
            }
            Some(expected) if expected == len => Ok(()),
            Some(expected) => Err(format!(
                "inhomogeneous array: dimension {depth} has length {len}, expected {expected}"
            )),
        }
    }

    /// Numbers and empty arrays can meet at the same depth (`[[], 1]`)
    /// without tripping the per-level checks; the element count catches it.
    fn finish(self) -> std::result::Result<NdArray, String> {
        let dims: Vec<usize> = self.dims.into_iter().map(|d| d.unwrap_or(0)).collect();
        let shape = Shape::from_slice(&dims);
        let leaf_mismatch = self.leaf_depth.is_some_and(|depth| depth != dims.len());
        if leaf_mismatch || shape.numel() != self.data.len() {
            return Err(format!(
                "inhomogeneous array: {} numbers do not fill shape {shape}",
                self.data.len()
            ));
        }
        Ok(NdArray {
            shape,
            data: self.data,
            dtype: if self.integral { DType::I64 } else { DType::F64 },
        })
    }
}

struct Level<'a> {
    depth: usize,
    builder: &'a mut Builder,
}

impl<'de> DeserializeSeed<'de> for Level<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for Level<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a nested array of numbers")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<(), E> {
        self.builder.leaf(self.depth, v as f64).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<(), E> {
        self.builder.leaf(self.depth, v as f64).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<(), E> {
        self.builder.integral = false;
        self.builder.leaf(self.depth, v).map_err(E::custom)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        self.builder.open(self.depth).map_err(de::Error::custom)?;
        let mut len = 0;
        while seq
            .next_element_seed(Level {
                depth: self.depth + 1,
                builder: &mut *self.builder,
            })?
            .is_some()
        {
            len += 1;
        }
        self.builder.close(self.depth, len).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<NdArray> {
        let payload = format!(r#"{{"model_path": "model.onnx", "input_tensor": {input}}}"#);
        InferRequest::from_slice(payload.as_bytes()).map(|request| request.input_tensor)
    }

    #[test]
    fn flattens_in_row_major_order() -> anyhow::Result<()> {
        let array = parse("[[[1.5, 2], [3, 4]], [[5, 6], [7, 8]]]")?;
        assert_eq!(array.shape().dims(), &[2, 2, 2]);
        assert_eq!(array.data(), &[1.5, 2., 3., 4., 5., 6., 7., 8.]);
        assert_eq!(array.dtype(), DType::F64);
        Ok(())
    }

    #[test]
    fn integer_payload_reports_int64() -> anyhow::Result<()> {
        let array = parse("[1, 2, 3]")?;
        assert_eq!(array.dtype(), DType::I64);
        assert_eq!(array.shape().dims(), &[3]);
        Ok(())
    }

    #[test]
    fn accepts_scalars_and_empty_arrays() -> anyhow::Result<()> {
        let scalar = parse("0.0")?;
        assert_eq!(scalar.shape().rank(), 0);
        assert_eq!(scalar.data(), &[0.0]);

        let empty = parse("[[], []]")?;
        assert_eq!(empty.shape().dims(), &[2, 0]);
        assert!(empty.data().is_empty());
        Ok(())
    }

    #[test]
    fn rejects_ragged_arrays() {
        for input in [
            "[[1, 2], [3]]",
            "[[1], [[2]]]",
            "[[[1]], [2]]",
            "[[], [1]]",
            "[[], 1]",
        ] {
            let err = parse(input).unwrap_err();
            assert!(
                err.to_string().contains("inhomogeneous"),
                "{input}: unexpected error {err}"
            );
        }
    }

    #[test]
    fn rejects_non_numeric_leaves() {
        for input in [r#"["1.0"]"#, "[true]", "[null]", r#"{"a": 1}"#] {
            assert!(matches!(parse(input), Err(Error::Payload(_))), "{input}");
        }
    }

    #[test]
    fn rejects_missing_fields() {
        let err = InferRequest::from_slice(br#"{"input_tensor": [0.0]}"#).unwrap_err();
        assert!(err.to_string().contains("model_path"));
    }

    #[test]
    fn converts_to_f32_tensor() -> anyhow::Result<()> {
        let array = parse("[[0.1, 2.0]]")?;
        let tensor = array.to_f32()?;
        assert_eq!(tensor.dtype(), DType::F32);
        assert_eq!(tensor.shape().dims(), &[1, 2]);
        assert_eq!(tensor.to_vec::<f32>()?, vec![0.1f32, 2.0]);
        Ok(())
    }
}
