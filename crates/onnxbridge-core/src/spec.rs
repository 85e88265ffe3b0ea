use std::fmt;

use crate::{Error, IoKind, Result};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IOName(pub String);

impl IOName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IOName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug)]
pub struct TensorSpec {
    pub name: IOName,
    pub dtype: Option<super::DType>, // None = element type we cannot represent
    pub dims: Vec<Option<usize>>,    // None = dynamic
}

impl TensorSpec {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModelSpec {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}

impl ModelSpec {
    /// Looks up a declared input, failing with a binding error that lists what the model offers.
    pub fn input(&self, name: &IOName) -> Result<&TensorSpec> {
        find(&self.inputs, IoKind::Input, name)
    }

    pub fn output(&self, name: &IOName) -> Result<&TensorSpec> {
        find(&self.outputs, IoKind::Output, name)
    }
}

fn find<'a>(specs: &'a [TensorSpec], kind: IoKind, name: &IOName) -> Result<&'a TensorSpec> {
    specs
        .iter()
        .find(|spec| &spec.name == name)
        .ok_or_else(|| Error::Binding {
            kind,
            name: name.0.clone(),
            available: specs.iter().map(|spec| spec.name.0.clone()).collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    fn spec() -> ModelSpec {
        ModelSpec {
            inputs: vec![TensorSpec {
                name: IOName::new("images"),
                dtype: Some(DType::F32),
                dims: vec![Some(1), Some(3), Some(640), Some(640)],
            }],
            outputs: vec![TensorSpec {
                name: IOName::new("output0"),
                dtype: Some(DType::F32),
                dims: vec![Some(1), None, None],
            }],
        }
    }

    #[test]
    fn finds_declared_bindings() {
        let spec = spec();
        assert_eq!(spec.input(&IOName::new("images")).unwrap().rank(), 4);
        assert_eq!(spec.output(&IOName::new("output0")).unwrap().rank(), 3);
    }

    #[test]
    fn unknown_binding_lists_available_names() {
        let spec = spec();
        let err = spec.output(&IOName::new("boxes")).unwrap_err();
        match err {
            Error::Binding {
                kind,
                name,
                available,
            } => {
                assert_eq!(kind, IoKind::Output);
                assert_eq!(name, "boxes");
                assert_eq!(available, vec!["output0".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
