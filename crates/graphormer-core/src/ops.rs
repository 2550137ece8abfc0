use std::ops::{Add, Mul};

use ndarray::linalg::general_mat_mul;
use ndarray::{ArcArray, Array3, Axis, Ix2, Ix3, IxDyn, LinalgScalar};

use crate::dtype::Float;
use crate::shape;
use crate::tensor::map_variants;
use crate::{Tensor, TensorError, TensorResult};

/// Basic arithmetic ops that enforce dynamic type checking (no automatic casting)
/// and NumPy broadcasting. Incompatible shapes are reported, never panicked on.
impl Add for &Tensor {
    type Output = TensorResult<Tensor>;

    fn add(self, rhs: Self) -> Self::Output {
        self.ensure_same_dtype(rhs)?;
        shape::broadcast_shape(self.shape(), rhs.shape())?;
        match (self, rhs) {
            (Tensor::Float32(a), Tensor::Float32(b)) => Ok(Tensor::Float32((a + b).into_shared())),
            (Tensor::Float64(a), Tensor::Float64(b)) => Ok(Tensor::Float64((a + b).into_shared())),
            (Tensor::Int64(a), Tensor::Int64(b)) => Ok(Tensor::Int64((a + b).into_shared())),
            (Tensor::UInt8(a), Tensor::UInt8(b)) => Ok(Tensor::UInt8((a + b).into_shared())),
            _ => unreachable!("dtypes checked above"),
        }
    }
}

impl Mul for &Tensor {
    type Output = TensorResult<Tensor>;

    fn mul(self, rhs: Self) -> Self::Output {
        self.ensure_same_dtype(rhs)?;
        shape::broadcast_shape(self.shape(), rhs.shape())?;
        match (self, rhs) {
            (Tensor::Float32(a), Tensor::Float32(b)) => Ok(Tensor::Float32((a * b).into_shared())),
            (Tensor::Float64(a), Tensor::Float64(b)) => Ok(Tensor::Float64((a * b).into_shared())),
            (Tensor::Int64(a), Tensor::Int64(b)) => Ok(Tensor::Int64((a * b).into_shared())),
            (Tensor::UInt8(a), Tensor::UInt8(b)) => Ok(Tensor::UInt8((a * b).into_shared())),
            _ => unreachable!("dtypes checked above"),
        }
    }
}

impl Tensor {
    /// Matrix multiplication of two 2D tensors.
    pub fn matmul(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        if self.ndim() != 2 || rhs.ndim() != 2 {
            return Err(TensorError::InvalidOperation("Matmul requires exactly 2D tensors".into()));
        }
        self.ensure_same_dtype(rhs)?;
        if self.shape()[1] != rhs.shape()[0] {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.shape()[1], rhs.shape()[1]],
                got: rhs.shape().to_vec(),
            });
        }

        match (self, rhs) {
            (Tensor::Float32(a), Tensor::Float32(b)) => Ok(Tensor::Float32(matmul_array(a, b)?)),
            (Tensor::Float64(a), Tensor::Float64(b)) => Ok(Tensor::Float64(matmul_array(a, b)?)),
            // Integer matmul allowed but not accelerated
            (Tensor::Int64(a), Tensor::Int64(b)) => Ok(Tensor::Int64(matmul_array(a, b)?)),
            _ => Err(TensorError::InvalidOperation("Matmul not supported for this dtype".into())),
        }
    }

    /// Batched matrix multiplication: `[B, M, K] x [B, K, N] -> [B, M, N]`.
    pub fn bmm(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        if self.ndim() != 3 || rhs.ndim() != 3 {
            return Err(TensorError::InvalidOperation("bmm requires exactly 3D tensors".into()));
        }
        self.ensure_same_dtype(rhs)?;
        let (a, b) = (self.shape(), rhs.shape());
        if a[0] != b[0] || a[2] != b[1] {
            return Err(TensorError::ShapeMismatch {
                expected: vec![a[0], a[2], b[2]],
                got: b.to_vec(),
            });
        }

        match (self, rhs) {
            (Tensor::Float32(a), Tensor::Float32(b)) => Ok(Tensor::Float32(bmm_array(a, b)?)),
            (Tensor::Float64(a), Tensor::Float64(b)) => Ok(Tensor::Float64(bmm_array(a, b)?)),
            (Tensor::Int64(a), Tensor::Int64(b)) => Ok(Tensor::Int64(bmm_array(a, b)?)),
            _ => Err(TensorError::InvalidOperation("bmm not supported for this dtype".into())),
        }
    }

    /// Multiply tensor by a scalar value
    pub fn scalar_mul(&self, scalar: f64) -> TensorResult<Tensor> {
        match self {
            Tensor::Float32(a) => Ok(Tensor::Float32((a * scalar as f32).into_shared())),
            Tensor::Float64(a) => Ok(Tensor::Float64((a * scalar).into_shared())),
            Tensor::Int64(a) => Ok(Tensor::Int64((a * scalar as i64).into_shared())),
            Tensor::UInt8(a) => Ok(Tensor::UInt8((a * scalar as u8).into_shared())),
        }
    }

    /// Clamp integer elements into `[min, max]`.
    pub fn clamp(&self, min: i64, max: i64) -> TensorResult<Tensor> {
        if min > max {
            return Err(TensorError::InvalidOperation(format!(
                "clamp bounds reversed: min {} > max {}",
                min, max
            )));
        }
        match self {
            Tensor::Int64(a) => Ok(Tensor::Int64(a.mapv(|x| x.clamp(min, max)).into_shared())),
            _ => Err(TensorError::InvalidOperation("clamp requires Int64 dtype".into())),
        }
    }

    /// Numerically stable softmax along `axis`.
    ///
    /// Each lane has its maximum subtracted before exponentiation, so `-inf`
    /// entries contribute exactly zero to the normalizer. A lane made entirely
    /// of `-inf` has nothing to normalize and comes out as all zeros.
    pub fn softmax(&self, axis: usize) -> TensorResult<Tensor> {
        if axis >= self.ndim() {
            return Err(TensorError::InvalidAxis { axis, ndim: self.ndim() });
        }
        match self {
            Tensor::Float32(a) => Ok(Tensor::Float32(softmax_array(a, axis))),
            Tensor::Float64(a) => Ok(Tensor::Float64(softmax_array(a, axis))),
            _ => Err(TensorError::InvalidOperation("Softmax requires float dtype".into())),
        }
    }

    /// Overwrite elements selected by `mask` with `value`.
    ///
    /// `mask` covers the leading axes of `self` (its shape must equal a
    /// prefix of `self.shape()`); a non-zero mask entry fills every trailing
    /// element under it. A `[B, N, N]` mask therefore hits all heads of a
    /// `[B, N, N, H]` score tensor.
    pub fn masked_fill(&self, mask: &Tensor, value: f64) -> TensorResult<Tensor> {
        let lead = mask.ndim();
        if lead > self.ndim() || &self.shape()[..lead] != mask.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape()[..lead.min(self.ndim())].to_vec(),
                got: mask.shape().to_vec(),
            });
        }
        let flags = mask.nonzero_flags();
        let inner = shape::numel(&self.shape()[lead..]);

        match self {
            Tensor::Float32(a) => {
                Ok(Tensor::Float32(masked_fill_array(a, &flags, inner, value as f32)))
            }
            Tensor::Float64(a) => Ok(Tensor::Float64(masked_fill_array(a, &flags, inner, value))),
            _ => Err(TensorError::InvalidOperation("masked_fill requires float dtype".into())),
        }
    }

    /// Gather rows along axis 0. The output shape is
    /// `indices.shape() ++ self.shape()[1..]`.
    pub fn index_select(&self, indices: &Tensor) -> TensorResult<Tensor> {
        if self.ndim() == 0 {
            return Err(TensorError::InvalidOperation("index_select on a scalar tensor".into()));
        }
        let idx = checked_indices(indices, self.shape()[0])?;
        let mut out_shape = indices.shape().to_vec();
        out_shape.extend_from_slice(&self.shape()[1..]);

        let gathered = map_variants!(self, a => a.select(Axis(0), &idx).into_shared());
        gathered.reshape(&out_shape)
    }

    /// Accumulate rows of `source` into a copy of `self` along axis 0:
    /// `out[indices[i]] += source[i]`. Repeated indices accumulate.
    pub fn index_add(&self, indices: &Tensor, source: &Tensor) -> TensorResult<Tensor> {
        if self.ndim() == 0 {
            return Err(TensorError::InvalidOperation("index_add on a scalar tensor".into()));
        }
        self.ensure_same_dtype(source)?;
        let idx = checked_indices(indices, self.shape()[0])?;
        let mut rows_shape = vec![idx.len()];
        rows_shape.extend_from_slice(&self.shape()[1..]);
        if shape::numel(&rows_shape) != source.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: rows_shape,
                got: source.shape().to_vec(),
            });
        }
        let rows = source.reshape(&rows_shape)?;

        match (self, &rows) {
            (Tensor::Float32(a), Tensor::Float32(s)) => {
                Ok(Tensor::Float32(index_add_array(a, &idx, s)))
            }
            (Tensor::Float64(a), Tensor::Float64(s)) => {
                Ok(Tensor::Float64(index_add_array(a, &idx, s)))
            }
            (Tensor::Int64(a), Tensor::Int64(s)) => Ok(Tensor::Int64(index_add_array(a, &idx, s))),
            _ => Err(TensorError::InvalidOperation(
                "index_add not supported for this dtype".into(),
            )),
        }
    }
}

/// Validate an index tensor against an axis of `size` and flatten it.
fn checked_indices(indices: &Tensor, size: usize) -> TensorResult<Vec<usize>> {
    let raw = indices.to_vec::<i64>()?;
    raw.into_iter()
        .map(|i| {
            if i < 0 || i as usize >= size {
                Err(TensorError::IndexOutOfBounds { index: i, axis: 0, size })
            } else {
                Ok(i as usize)
            }
        })
        .collect()
}

fn matmul_array<T: LinalgScalar>(
    a: &ArcArray<T, IxDyn>,
    b: &ArcArray<T, IxDyn>,
) -> TensorResult<ArcArray<T, IxDyn>> {
    let a2 = a.view().into_dimensionality::<Ix2>()?;
    let b2 = b.view().into_dimensionality::<Ix2>()?;
    Ok(a2.dot(&b2).into_dyn().into_shared())
}

fn bmm_array<T: LinalgScalar>(
    a: &ArcArray<T, IxDyn>,
    b: &ArcArray<T, IxDyn>,
) -> TensorResult<ArcArray<T, IxDyn>> {
    let a3 = a.view().into_dimensionality::<Ix3>()?;
    let b3 = b.view().into_dimensionality::<Ix3>()?;
    let (batch, m, _) = a3.dim();
    let n = b3.dim().2;

    let mut out = Array3::<T>::zeros((batch, m, n));
    for ((mut c, x), y) in out.outer_iter_mut().zip(a3.outer_iter()).zip(b3.outer_iter()) {
        general_mat_mul(T::one(), &x, &y, T::zero(), &mut c);
    }
    Ok(out.into_dyn().into_shared())
}

fn softmax_array<T: Float>(a: &ArcArray<T, IxDyn>, axis: usize) -> ArcArray<T, IxDyn> {
    let mut out = a.to_owned();
    for mut lane in out.lanes_mut(Axis(axis)) {
        let max = lane.iter().copied().fold(T::NEG_INFINITY, T::max);
        if max == T::NEG_INFINITY {
            lane.fill(T::zero());
            continue;
        }
        lane.mapv_inplace(|x| (x - max).exp());
        let sum = lane.iter().copied().fold(T::zero(), |acc, x| acc + x);
        lane.mapv_inplace(|x| x / sum);
    }
    out.into_shared()
}

fn masked_fill_array<T: Copy>(
    a: &ArcArray<T, IxDyn>,
    flags: &[bool],
    inner: usize,
    value: T,
) -> ArcArray<T, IxDyn> {
    let mut out = a.as_standard_layout().into_owned();
    if inner > 0 {
        if let Some(data) = out.as_slice_mut() {
            for (chunk, &flag) in data.chunks_mut(inner).zip(flags) {
                if flag {
                    chunk.fill(value);
                }
            }
        }
    }
    out.into_shared()
}

fn index_add_array<T: LinalgScalar>(
    a: &ArcArray<T, IxDyn>,
    idx: &[usize],
    rows: &ArcArray<T, IxDyn>,
) -> ArcArray<T, IxDyn> {
    let mut out = a.to_owned();
    for (row, &i) in rows.outer_iter().zip(idx) {
        out.index_axis_mut(Axis(0), i)
            .zip_mut_with(&row, |t, &s| *t = *t + s);
    }
    out.into_shared()
}
