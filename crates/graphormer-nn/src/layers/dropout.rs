use graphormer_autodiff::Parameter;
use graphormer_core::{Tensor, TensorResult};
use rand::Rng;

use crate::error::{NnError, NnResult};
use crate::modules::Module;

/// Dropout layer: randomly zeros elements during training.
/// During inference (default), acts as identity.
#[derive(Debug, Clone)]
pub struct Dropout {
    pub p: f64,
    pub training: bool,
}

impl Dropout {
    pub fn new(p: f64) -> NnResult<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(NnError::InvalidDropout(p));
        }
        Ok(Dropout { p, training: false })
    }

    /// Apply dropout with the thread-local generator.
    pub fn forward(&self, x: &Tensor) -> TensorResult<Tensor> {
        self.forward_with_rng(x, &mut rand::thread_rng())
    }

    /// Apply dropout, drawing the keep mask from `rng`.
    pub fn forward_with_rng<R: Rng + ?Sized>(
        &self,
        x: &Tensor,
        rng: &mut R,
    ) -> TensorResult<Tensor> {
        if !self.training || self.p == 0.0 {
            return Ok(x.clone());
        }
        let mask = Tensor::dropout_mask(x.shape(), self.p, x.dtype(), rng)?;
        x * &mask
    }
}

impl Default for Dropout {
    fn default() -> Self {
        Dropout { p: 0.5, training: false }
    }
}

impl Module for Dropout {
    fn parameters(&self) -> Vec<&Parameter> {
        vec![]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}
