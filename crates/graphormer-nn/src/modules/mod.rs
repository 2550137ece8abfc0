use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use graphormer_autodiff::Parameter;
use graphormer_core::{Tensor, TensorError};

use crate::error::{NnError, NnResult};

/// The base trait for all neural network modules.
///
/// Forward passes have module-specific inputs (graphs, dense batches), so the
/// trait only covers parameter bookkeeping, mode switching and persistence.
pub trait Module {
    /// All learned parameters in declaration order.
    fn parameters(&self) -> Vec<&Parameter>;

    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    /// Switch stochastic layers (dropout) between training and inference.
    fn set_training(&mut self, _training: bool) {}

    fn train(&mut self) {
        self.set_training(true);
    }

    fn eval(&mut self) {
        self.set_training(false);
    }

    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.data.numel()).sum()
    }

    fn zero_grad(&mut self) {
        for p in self.parameters_mut() {
            p.zero_grad();
        }
    }

    /// Write every parameter tensor to a binary file with `bincode`, mimicking a state_dict.
    fn save<P: AsRef<Path>>(&self, path: P) -> NnResult<()> {
        let tensors: Vec<Tensor> = self.parameters().into_iter().map(|p| p.data.clone()).collect();
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, &tensors)?;
        Ok(())
    }

    /// Load tensors written by [`Module::save`] into this module's parameters.
    /// The block count, shapes and dtypes must match exactly.
    fn load<P: AsRef<Path>>(&mut self, path: P) -> NnResult<()> {
        let reader = BufReader::new(File::open(path)?);
        let tensors: Vec<Tensor> = bincode::deserialize_from(reader)?;

        let mut params = self.parameters_mut();
        if params.len() != tensors.len() {
            return Err(NnError::InvalidConfig(format!(
                "Model architecture mismatch. Expected {} parameter blocks, file contains {}",
                params.len(),
                tensors.len()
            )));
        }
        // validate everything before touching any parameter
        for (param, loaded) in params.iter().zip(&tensors) {
            param.data.ensure_same_dtype(loaded)?;
            if param.shape() != loaded.shape() {
                return Err(TensorError::ShapeMismatch {
                    expected: param.shape().to_vec(),
                    got: loaded.shape().to_vec(),
                }
                .into());
            }
        }
        for (param, loaded) in params.iter_mut().zip(tensors) {
            param.set_data(loaded)?;
        }
        Ok(())
    }
}

pub mod graph;
