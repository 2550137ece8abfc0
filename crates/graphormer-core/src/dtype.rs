use std::fmt;

use ndarray::{ArcArray, IxDyn, LinalgScalar};
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Dynamic Data Types for Tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DType {
    #[default]
    Float32,
    Float64,
    Int64,
    UInt8,
}

impl DType {
    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }
}

/// A scalar type that can back a [`Tensor`] variant.
pub trait Element: Copy + fmt::Debug + PartialOrd + Send + Sync + 'static {
    const DTYPE: DType;

    /// Wrap a shared array into the matching tensor variant.
    fn wrap(array: ArcArray<Self, IxDyn>) -> Tensor;

    /// Borrow the array if `tensor` holds this element type.
    fn unwrap(tensor: &Tensor) -> Option<&ArcArray<Self, IxDyn>>;

    fn from_f64(v: f64) -> Self;

    fn is_nonzero(self) -> bool;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, $zero:expr) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn wrap(array: ArcArray<Self, IxDyn>) -> Tensor {
                Tensor::$variant(array)
            }

            fn unwrap(tensor: &Tensor) -> Option<&ArcArray<Self, IxDyn>> {
                match tensor {
                    Tensor::$variant(a) => Some(a),
                    _ => None,
                }
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $ty
            }

            #[inline]
            fn is_nonzero(self) -> bool {
                self != $zero
            }
        }
    };
}

impl_element!(f32, Float32, 0.0);
impl_element!(f64, Float64, 0.0);
impl_element!(i64, Int64, 0);
impl_element!(u8, UInt8, 0);

/// Floating point element types (`f32`, `f64`).
pub trait Float: Element + LinalgScalar {
    const NEG_INFINITY: Self;

    fn exp(self) -> Self;
    fn max(self, other: Self) -> Self;
}

impl Float for f32 {
    const NEG_INFINITY: Self = f32::NEG_INFINITY;

    #[inline] fn exp(self) -> Self { f32::exp(self) }
    #[inline] fn max(self, other: Self) -> Self { f32::max(self, other) }
}

impl Float for f64 {
    const NEG_INFINITY: Self = f64::NEG_INFINITY;

    #[inline] fn exp(self) -> Self { f64::exp(self) }
    #[inline] fn max(self, other: Self) -> Self { f64::max(self, other) }
}
