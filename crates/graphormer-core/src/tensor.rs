use ndarray::{ArcArray, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::dtype::{DType, Element};
use crate::error::{TensorError, TensorResult};
use crate::shape;

/// A dynamic-typed Tensor, powered by `ndarray`.
/// Uses `ArcArray` internally so cloning shares the buffer and axis
/// permutations stay zero-copy views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Tensor {
    Float32(ArcArray<f32, IxDyn>),
    Float64(ArcArray<f64, IxDyn>),
    Int64(ArcArray<i64, IxDyn>),
    UInt8(ArcArray<u8, IxDyn>),
}

/// Apply the same array-level expression to whichever variant is held.
macro_rules! map_variants {
    ($tensor:expr, $a:ident => $body:expr) => {
        match $tensor {
            Tensor::Float32($a) => Tensor::Float32($body),
            Tensor::Float64($a) => Tensor::Float64($body),
            Tensor::Int64($a) => Tensor::Int64($body),
            Tensor::UInt8($a) => Tensor::UInt8($body),
        }
    };
}
pub(crate) use map_variants;

impl Tensor {
    pub fn dtype(&self) -> DType {
        match self {
            Tensor::Float32(_) => DType::Float32,
            Tensor::Float64(_) => DType::Float64,
            Tensor::Int64(_) => DType::Int64,
            Tensor::UInt8(_) => DType::UInt8,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::Float32(a) => a.shape(),
            Tensor::Float64(a) => a.shape(),
            Tensor::Int64(a) => a.shape(),
            Tensor::UInt8(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn numel(&self) -> usize {
        shape::numel(self.shape())
    }

    /// Create tensor filled with zeros
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let dyn_shape = IxDyn(shape);
        match dtype {
            DType::Float32 => Tensor::Float32(ArrayD::<f32>::zeros(dyn_shape).into_shared()),
            DType::Float64 => Tensor::Float64(ArrayD::<f64>::zeros(dyn_shape).into_shared()),
            DType::Int64 => Tensor::Int64(ArrayD::<i64>::zeros(dyn_shape).into_shared()),
            DType::UInt8 => Tensor::UInt8(ArrayD::<u8>::zeros(dyn_shape).into_shared()),
        }
    }

    /// Create tensor filled with ones
    pub fn ones(shape: &[usize], dtype: DType) -> Self {
        let dyn_shape = IxDyn(shape);
        match dtype {
            DType::Float32 => Tensor::Float32(ArrayD::<f32>::ones(dyn_shape).into_shared()),
            DType::Float64 => Tensor::Float64(ArrayD::<f64>::ones(dyn_shape).into_shared()),
            DType::Int64 => Tensor::Int64(ArrayD::<i64>::ones(dyn_shape).into_shared()),
            DType::UInt8 => Tensor::UInt8(ArrayD::<u8>::ones(dyn_shape).into_shared()),
        }
    }

    /// Build a tensor from row-major data of a concrete element type.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> TensorResult<Self> {
        if data.len() != shape::numel(shape) {
            return Err(TensorError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)?;
        Ok(T::wrap(array.into_shared()))
    }

    /// Build a tensor of `dtype` from `f64` values, casting each element.
    pub fn from_values(values: Vec<f64>, shape: &[usize], dtype: DType) -> TensorResult<Self> {
        match dtype {
            DType::Float32 => Self::from_vec(cast_vec::<f32>(values), shape),
            DType::Float64 => Self::from_vec(values, shape),
            DType::Int64 => Self::from_vec(cast_vec::<i64>(values), shape),
            DType::UInt8 => Self::from_vec(cast_vec::<u8>(values), shape),
        }
    }

    /// Borrow the backing array, failing if the element type does not match.
    pub fn array<T: Element>(&self) -> TensorResult<&ArcArray<T, IxDyn>> {
        T::unwrap(self).ok_or(TensorError::TypeMismatch {
            expected: T::DTYPE,
            got: self.dtype(),
        })
    }

    /// Copy the elements out in logical row-major order.
    pub fn to_vec<T: Element>(&self) -> TensorResult<Vec<T>> {
        Ok(self.array::<T>()?.iter().copied().collect())
    }

    /// `true` for every element that is not zero, in row-major order.
    pub fn nonzero_flags(&self) -> Vec<bool> {
        match self {
            Tensor::Float32(a) => a.iter().map(|x| x.is_nonzero()).collect(),
            Tensor::Float64(a) => a.iter().map(|x| x.is_nonzero()).collect(),
            Tensor::Int64(a) => a.iter().map(|x| x.is_nonzero()).collect(),
            Tensor::UInt8(a) => a.iter().map(|x| x.is_nonzero()).collect(),
        }
    }

    /// Fail with `TypeMismatch` unless both tensors share a dtype.
    pub fn ensure_same_dtype(&self, other: &Tensor) -> TensorResult<()> {
        if self.dtype() != other.dtype() {
            return Err(TensorError::TypeMismatch {
                expected: self.dtype(),
                got: other.dtype(),
            });
        }
        Ok(())
    }

    /// Fail with `ShapeMismatch` unless the shape is exactly `expected`.
    pub fn ensure_shape(&self, expected: &[usize]) -> TensorResult<()> {
        if self.shape() != expected {
            return Err(TensorError::ShapeMismatch {
                expected: expected.to_vec(),
                got: self.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Transpose all axes (zero-copy in ndarray).
    pub fn t(&self) -> Self {
        map_variants!(self, a => a.clone().reversed_axes())
    }

    /// Reorder axes (zero-copy view).
    pub fn permute(&self, axes: &[usize]) -> TensorResult<Self> {
        shape::check_permutation(axes, self.ndim())?;
        Ok(map_variants!(self, a => a.clone().permuted_axes(axes.to_vec())))
    }

    /// Swap two axes (zero-copy view).
    pub fn transpose(&self, axis_a: usize, axis_b: usize) -> TensorResult<Self> {
        let ndim = self.ndim();
        for axis in [axis_a, axis_b] {
            if axis >= ndim {
                return Err(TensorError::InvalidAxis { axis, ndim });
            }
        }
        let mut axes: Vec<usize> = (0..ndim).collect();
        axes.swap(axis_a, axis_b);
        self.permute(&axes)
    }

    /// Reshape in row-major order. Zero-copy when the layout is already
    /// standard, otherwise the elements are copied into a fresh buffer first.
    pub fn reshape(&self, new_shape: &[usize]) -> TensorResult<Self> {
        if shape::numel(new_shape) != self.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.numel()],
                got: new_shape.to_vec(),
            });
        }

        Ok(map_variants!(self, a => reshape_array(a, new_shape)?))
    }

    /// `true` when no float element is NaN or infinite.
    pub fn all_finite(&self) -> bool {
        match self {
            Tensor::Float32(a) => a.iter().all(|x| x.is_finite()),
            Tensor::Float64(a) => a.iter().all(|x| x.is_finite()),
            Tensor::Int64(_) | Tensor::UInt8(_) => true,
        }
    }
}

fn cast_vec<T: Element>(values: Vec<f64>) -> Vec<T> {
    values.into_iter().map(T::from_f64).collect()
}

fn reshape_array<T: Clone>(
    a: &ArcArray<T, IxDyn>,
    new_shape: &[usize],
) -> TensorResult<ArcArray<T, IxDyn>> {
    let shape_dyn = IxDyn(new_shape);
    if a.is_standard_layout() {
        return Ok(a.clone().into_shape(shape_dyn)?);
    }
    let owned = a.as_standard_layout().into_owned();
    Ok(owned.into_shape(shape_dyn)?.into_shared())
}
