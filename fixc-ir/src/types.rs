#![forbid(unsafe_code)]

use std::fmt;

/// Shape of a dense row-major tensor. An empty shape is a scalar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub shape: Vec<usize>,
}

impl TensorType {
    pub fn new(shape: Vec<usize>) -> Self {
        Self { shape }
    }

    pub fn scalar() -> Self {
        Self { shape: Vec::new() }
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            shape: vec![rows, cols],
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    pub fn is_tensor(&self) -> bool {
        !self.shape.is_empty()
    }

    /// True when every dimension is 1. Scalars qualify.
    pub fn is_all_ones(&self) -> bool {
        self.shape.iter().all(|d| *d == 1)
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shape.is_empty() {
            return write!(f, "scalar");
        }
        for d in &self.shape {
            write!(f, "[{d}]")?;
        }
        Ok(())
    }
}

/// Front-end value type. `Int` is a class index (argmax, sgn).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Int,
    Tensor(TensorType),
}

impl Type {
    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Type::Tensor(t) => Some(t),
            Type::Int => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Tensor(t) => write!(f, "{t}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageClass {
    /// Model parameters and lookup tables; external linkage, shared header.
    Global,
    /// Values introduced by lowering.
    Internal,
    /// The entry function's parameter.
    Input,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElemKind {
    /// Storage word: `float` in real mode, the signed word in fixed mode.
    Word,
    /// Accumulator width.
    Wide,
    /// Plain `int` (class indices, counters).
    Index,
    /// Always `float`, whatever the mode.
    Real,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decl {
    pub name: String,
    pub ty: TensorType,
    pub storage: StorageClass,
    pub elem: ElemKind,
}

impl Decl {
    pub fn new(name: impl Into<String>, ty: TensorType, storage: StorageClass, elem: ElemKind) -> Self {
        Self {
            name: name.into(),
            ty,
            storage,
            elem,
        }
    }

    /// Tensors produced by lowering live at file scope so other
    /// translation units (the debug program) can read them.
    pub fn is_file_scope(&self) -> bool {
        match self.storage {
            StorageClass::Global => true,
            StorageClass::Input => false,
            StorageClass::Internal => self.ty.is_tensor(),
        }
    }
}
