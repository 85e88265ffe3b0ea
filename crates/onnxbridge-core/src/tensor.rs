use std::fmt;

use bytes::Bytes;
use serde_json::Value;
use smallvec::SmallVec;

use crate::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Cuda {
        device_id: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F64,
    I64,
    I32,
    U8,
}

impl DType {
    pub fn byte_size(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
            Self::U8 => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::I64 => "int64",
            Self::I32 => "int32",
            Self::U8 => "uint8",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Number of elements. A rank-0 shape holds one element.
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        if self.rank() == 1 {
            f.write_str(",")?;
        }
        f.write_str(")")
    }
}

/// Fixed-width element types a [`Tensor`] can hold, stored little-endian.
pub trait Element: Copy + 'static {
    const DTYPE: DType;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($ty:ty, $dtype:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$dtype;

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_le_bytes(raw)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(i64, I64);
impl_element!(i32, I32);
impl_element!(u8, U8);

#[derive(Clone, Debug, PartialEq)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
}

/// Dense, row-major CPU tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub desc: TensorDesc,
    bytes: Bytes,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, bytes: Bytes) -> Result<Self> {
        let expected = shape.numel() * dtype.byte_size();
        if bytes.len() != expected {
            return Err(Error::ByteLength {
                dtype,
                shape,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            desc: TensorDesc { dtype, shape },
            bytes,
        })
    }

    pub fn from_values<T: Element>(shape: Shape, values: &[T]) -> Result<Self> {
        let mut bytes = Vec::with_capacity(std::mem::size_of_val(values));
        for value in values {
            value.write_le(&mut bytes);
        }
        Self::from_cpu_bytes(T::DTYPE, shape, Bytes::from(bytes))
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.desc.shape
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Reinterprets the elements under a new shape without reordering them.
    pub fn reshape(self, shape: Shape) -> Result<Self> {
        let numel = self.desc.shape.numel();
        if shape.numel() != numel {
            return Err(Error::ShapeMismatch {
                expected: shape,
                numel,
            });
        }
        Ok(Self {
            desc: TensorDesc {
                dtype: self.desc.dtype,
                shape,
            },
            bytes: self.bytes,
        })
    }

    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if self.desc.dtype != T::DTYPE {
            return Err(Error::DTypeMismatch {
                expected: T::DTYPE,
                actual: self.desc.dtype,
            });
        }
        Ok(self
            .bytes
            .chunks_exact(T::DTYPE.byte_size())
            .map(T::read_le)
            .collect())
    }

    /// Nested JSON arrays, one level per dimension. Non-finite floats become `null`.
    pub fn to_json(&self) -> Value {
        let size = self.desc.dtype.byte_size();
        let chunks = self.bytes.chunks_exact(size);
        let mut leaves: Box<dyn Iterator<Item = Value> + '_> = match self.desc.dtype {
            DType::F32 => Box::new(chunks.map(|b| float_value(f64::from(f32::read_le(b))))),
            DType::F64 => Box::new(chunks.map(|b| float_value(f64::read_le(b)))),
            DType::I64 => Box::new(chunks.map(|b| Value::from(i64::read_le(b)))),
            DType::I32 => Box::new(chunks.map(|b| Value::from(i32::read_le(b)))),
            DType::U8 => Box::new(chunks.map(|b| Value::from(u8::read_le(b)))),
        };
        nest(self.desc.shape.dims(), &mut leaves)
    }
}

fn float_value(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn nest<I: Iterator<Item = Value>>(dims: &[usize], leaves: &mut I) -> Value {
    match dims.split_first() {
        None => leaves.next().unwrap_or(Value::Null),
        Some((&n, rest)) => Value::Array((0..n).map(|_| nest(rest, leaves)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn shape_display_matches_tuple_notation() {
        assert_eq!(Shape::from_slice(&[1, 3, 640, 640]).to_string(), "(1, 3, 640, 640)");
        assert_eq!(Shape::from_slice(&[100]).to_string(), "(100,)");
        assert_eq!(Shape::from_slice(&[]).to_string(), "()");
    }

    #[test]
    fn numel_counts_zero_sized_dims() {
        assert_eq!(Shape::from_slice(&[]).numel(), 1);
        assert_eq!(Shape::from_slice(&[2, 0]).numel(), 0);
        assert_eq!(Shape::from_slice(&[1, 3, 640, 640]).numel(), 1_228_800);
    }

    #[test]
    fn rejects_wrong_byte_length() {
        let err = Tensor::from_cpu_bytes(
            DType::F32,
            Shape::from_slice(&[2]),
            Bytes::from_static(&[0; 7]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ByteLength { expected: 8, actual: 7, .. }));
    }

    #[test]
    fn reshape_keeps_element_order() -> anyhow::Result<()> {
        let values: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let tensor = Tensor::from_values(Shape::from_slice(&[24]), &values)?;
        let reshaped = tensor.reshape(Shape::from_slice(&[1, 2, 3, 4]))?;

        assert_eq!(reshaped.shape().dims(), &[1, 2, 3, 4]);
        assert_eq!(reshaped.to_vec::<f32>()?, values);
        Ok(())
    }

    #[test]
    fn reshape_refuses_to_truncate_or_pad() -> anyhow::Result<()> {
        let tensor = Tensor::from_values(Shape::from_slice(&[100]), &[0.0f32; 100])?;
        let err = tensor
            .reshape(Shape::from_slice(&[1, 3, 640, 640]))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { numel: 100, .. }));
        assert_eq!(
            err.to_string(),
            "cannot reshape array of size 100 into shape (1, 3, 640, 640)"
        );
        Ok(())
    }

    #[test]
    fn to_vec_checks_dtype() -> anyhow::Result<()> {
        let tensor = Tensor::from_values(Shape::from_slice(&[2]), &[1i64, 2])?;
        assert_eq!(tensor.to_vec::<i64>()?, vec![1, 2]);
        assert!(matches!(
            tensor.to_vec::<f32>(),
            Err(Error::DTypeMismatch {
                expected: DType::F32,
                actual: DType::I64
            })
        ));
        Ok(())
    }

    #[test]
    fn json_nesting_follows_rank() -> anyhow::Result<()> {
        let tensor = Tensor::from_values(Shape::from_slice(&[1, 2, 3]), &[0.5f32, 1., 2., 3., 4., 5.])?;
        assert_eq!(tensor.to_json(), json!([[[0.5, 1.0, 2.0], [3.0, 4.0, 5.0]]]));

        let scalar = Tensor::from_values(Shape::from_slice(&[]), &[7i32])?;
        assert_eq!(scalar.to_json(), json!(7));
        Ok(())
    }

    #[test]
    fn json_maps_non_finite_to_null() -> anyhow::Result<()> {
        let tensor = Tensor::from_values(Shape::from_slice(&[2]), &[f32::NAN, f32::INFINITY])?;
        assert_eq!(tensor.to_json(), json!([null, null]));
        Ok(())
    }
}
