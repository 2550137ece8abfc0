use graphormer_autodiff::Parameter;
use graphormer_core::{DType, Tensor, TensorResult};
use rand::Rng;

use crate::error::{NnError, NnResult};
use crate::modules::Module;

/// Lookup table bridging discrete indices to dense vectors.
///
/// The row at `padding_idx`, if any, starts at zero and never receives
/// gradient, so it stays zero for the life of the table.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub num_embeddings: usize,
    pub embedding_dim: usize,
    pub padding_idx: Option<usize>,
    pub weight: Parameter,
}

impl Embedding {
    /// Create a table initialized from `N(0, 1)`.
    pub fn new<R: Rng + ?Sized>(
        num_embeddings: usize,
        embedding_dim: usize,
        padding_idx: Option<usize>,
        dtype: DType,
        rng: &mut R,
    ) -> NnResult<Self> {
        if let Some(idx) = padding_idx {
            if idx >= num_embeddings {
                return Err(NnError::InvalidConfig(format!(
                    "padding_idx {} must be within num_embeddings {}",
                    idx, num_embeddings
                )));
            }
        }
        let w_data = Tensor::randn(&[num_embeddings, embedding_dim], dtype, rng)?;
        let mut embedding = Embedding {
            num_embeddings,
            embedding_dim,
            padding_idx,
            weight: Parameter::new(w_data),
        };
        let zeroed = embedding.mask_padding_row(&embedding.weight.data)?;
        embedding.weight.set_data(zeroed)?;
        Ok(embedding)
    }

    /// Gather one row per index. `indices` must be `Int64`; the output shape
    /// is `indices.shape() ++ [embedding_dim]`.
    pub fn forward(&self, indices: &Tensor) -> TensorResult<Tensor> {
        self.weight.data.index_select(indices)
    }

    /// Scatter-add `grad_output` (shape `indices.shape() ++ [embedding_dim]`)
    /// into the weight gradient, skipping the padding row.
    pub fn backward(&mut self, indices: &Tensor, grad_output: &Tensor) -> TensorResult<()> {
        let base = Tensor::zeros(self.weight.shape(), self.weight.data.dtype());
        let grad = base.index_add(indices, grad_output)?;
        let grad = self.mask_padding_row(&grad)?;
        self.weight.accumulate_grad(&grad)
    }

    /// Zero the padding row of a `[num_embeddings, embedding_dim]` tensor.
    fn mask_padding_row(&self, t: &Tensor) -> TensorResult<Tensor> {
        let Some(idx) = self.padding_idx else {
            return Ok(t.clone());
        };
        let keep: Vec<f64> = (0..self.num_embeddings)
            .map(|row| if row == idx { 0.0 } else { 1.0 })
            .collect();
        let row_mask = Tensor::from_values(keep, &[self.num_embeddings, 1], t.dtype())?;
        t * &row_mask
    }
}

impl Module for Embedding {
    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weight]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weight]
    }
}
