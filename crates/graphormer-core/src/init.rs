//! Random tensor construction and parameter initializers.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::{DType, Tensor, TensorError, TensorResult};

fn require_float(dtype: DType) -> TensorResult<()> {
    if !dtype.is_float() {
        return Err(TensorError::InvalidOperation(format!(
            "random initialization requires a float dtype, got {:?}",
            dtype
        )));
    }
    Ok(())
}

impl Tensor {
    /// Uniform samples in `[low, high)`.
    pub fn rand_uniform<R: Rng + ?Sized>(
        shape: &[usize],
        low: f64,
        high: f64,
        dtype: DType,
        rng: &mut R,
    ) -> TensorResult<Tensor> {
        require_float(dtype)?;
        if !(low < high) {
            return Err(TensorError::InvalidOperation(format!(
                "uniform range [{}, {}) is empty",
                low, high
            )));
        }
        let dist = Uniform::new(low, high);
        let n: usize = shape.iter().product();
        let values: Vec<f64> = (0..n).map(|_| dist.sample(rng)).collect();
        Tensor::from_values(values, shape, dtype)
    }

    /// Standard normal samples.
    pub fn randn<R: Rng + ?Sized>(
        shape: &[usize],
        dtype: DType,
        rng: &mut R,
    ) -> TensorResult<Tensor> {
        require_float(dtype)?;
        let n: usize = shape.iter().product();
        let values: Vec<f64> = (0..n).map(|_| StandardNormal.sample(rng)).collect();
        Tensor::from_values(values, shape, dtype)
    }

    /// Xavier (Glorot) uniform initialization for a `[fan_in, fan_out]` weight:
    /// samples from `U(-a, a)` with `a = gain * sqrt(6 / (fan_in + fan_out))`.
    pub fn xavier_uniform<R: Rng + ?Sized>(
        shape: &[usize],
        gain: f64,
        dtype: DType,
        rng: &mut R,
    ) -> TensorResult<Tensor> {
        if shape.len() != 2 {
            return Err(TensorError::InvalidOperation(format!(
                "xavier_uniform expects a 2D weight shape, got {:?}",
                shape
            )));
        }
        require_float(dtype)?;
        let (fan_in, fan_out) = (shape[0], shape[1]);
        if fan_in == 0 || fan_out == 0 {
            return Ok(Tensor::zeros(shape, dtype));
        }
        let bound = gain * (6.0 / (fan_in + fan_out) as f64).sqrt();
        if bound == 0.0 {
            return Ok(Tensor::zeros(shape, dtype));
        }
        Tensor::rand_uniform(shape, -bound, bound, dtype, rng)
    }

    /// Inverted-dropout mask: each element is `0` with probability `p`,
    /// otherwise `1 / (1 - p)`.
    pub fn dropout_mask<R: Rng + ?Sized>(
        shape: &[usize],
        p: f64,
        dtype: DType,
        rng: &mut R,
    ) -> TensorResult<Tensor> {
        require_float(dtype)?;
        if !(0.0..1.0).contains(&p) {
            return Err(TensorError::InvalidOperation(format!(
                "dropout probability must be in [0, 1), got {}",
                p
            )));
        }
        let scale = 1.0 / (1.0 - p);
        let n: usize = shape.iter().product();
        let values: Vec<f64> = (0..n)
            .map(|_| if rng.gen::<f64>() < p { 0.0 } else { scale })
            .collect();
        Tensor::from_values(values, shape, dtype)
    }
}
