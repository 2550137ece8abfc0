use graphormer_core::{Tensor, TensorResult};

use crate::no_grad::is_grad_enabled;

/// A learned tensor together with its gradient-accumulation buffer.
///
/// The buffer is allocated lazily on the first accumulation and has the
/// same shape and dtype as `data`.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub data: Tensor,
    pub requires_grad: bool,
    grad: Option<Tensor>,
}

impl Parameter {
    /// Create a new trainable parameter.
    pub fn new(data: Tensor) -> Self {
        Parameter { data, requires_grad: true, grad: None }
    }

    /// Create a parameter that never accumulates gradients.
    pub fn frozen(data: Tensor) -> Self {
        Parameter { data, requires_grad: false, grad: None }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    /// Add `grad` into the buffer. A no-op for frozen parameters or inside
    /// [`with_no_grad`](crate::with_no_grad).
    pub fn accumulate_grad(&mut self, grad: &Tensor) -> TensorResult<()> {
        self.data.ensure_same_dtype(grad)?;
        grad.ensure_shape(self.data.shape())?;
        if !self.requires_grad || !is_grad_enabled() {
            return Ok(());
        }
        self.grad = Some(match self.grad.take() {
            Some(acc) => (&acc + grad)?,
            None => grad.clone(),
        });
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    /// Replace the data tensor, keeping shape and dtype fixed.
    pub fn set_data(&mut self, data: Tensor) -> TensorResult<()> {
        self.data.ensure_same_dtype(&data)?;
        data.ensure_shape(self.data.shape())?;
        self.data = data;
        Ok(())
    }
}
