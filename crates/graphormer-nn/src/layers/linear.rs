use graphormer_autodiff::Parameter;
use graphormer_core::{DType, Tensor, TensorError, TensorResult};
use rand::Rng;

use crate::modules::Module;

/// A fully connected linear (dense) layer: Y = X @ W + B
///
/// `W` is stored as `[in_features, out_features]`. Inputs may have any number
/// of leading axes; the projection applies to the last one.
#[derive(Debug, Clone)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    pub weight: Parameter,
    pub bias: Option<Parameter>,
}

impl Linear {
    /// Create a new layer with Xavier-uniform weights and a zero bias.
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        bias: bool,
        dtype: DType,
        rng: &mut R,
    ) -> TensorResult<Self> {
        let w_data = Tensor::xavier_uniform(&[in_features, out_features], 1.0, dtype, rng)?;
        let bias = bias.then(|| Parameter::new(Tensor::zeros(&[out_features], dtype)));

        Ok(Linear {
            in_features,
            out_features,
            weight: Parameter::new(w_data),
            bias,
        })
    }

    pub fn dtype(&self) -> DType {
        self.weight.data.dtype()
    }

    /// Re-draw the weight from Xavier-uniform with `gain` and zero the bias.
    pub fn reset_xavier<R: Rng + ?Sized>(&mut self, gain: f64, rng: &mut R) -> TensorResult<()> {
        let dtype = self.dtype();
        let shape = [self.in_features, self.out_features];
        self.weight.set_data(Tensor::xavier_uniform(&shape, gain, dtype, rng)?)?;
        if let Some(b) = &mut self.bias {
            b.set_data(Tensor::zeros(&[self.out_features], dtype))?;
        }
        Ok(())
    }

    pub fn forward(&self, x: &Tensor) -> TensorResult<Tensor> {
        let shape = x.shape();
        if shape.last() != Some(&self.in_features) {
            let mut expected = shape.to_vec();
            match expected.last_mut() {
                Some(last) => *last = self.in_features,
                None => expected.push(self.in_features),
            }
            return Err(TensorError::ShapeMismatch { expected, got: shape.to_vec() });
        }

        let rows = x.numel() / self.in_features.max(1);
        let flat = x.reshape(&[rows, self.in_features])?;
        let mut out = flat.matmul(&self.weight.data)?;

        if let Some(b) = &self.bias {
            // Broadcasting addition: Y = (X @ W) + B
            out = (&out + &b.data)?;
        }

        let mut out_shape = shape.to_vec();
        if let Some(last) = out_shape.last_mut() {
            *last = self.out_features;
        }
        out.reshape(&out_shape)
    }
}

impl Module for Linear {
    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = vec![&self.weight];
        if let Some(b) = &self.bias {
            params.push(b);
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = vec![&mut self.weight];
        if let Some(b) = &mut self.bias {
            params.push(b);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(bias: bool) -> Linear {
        Linear::new(3, 2, bias, DType::Float64, &mut StdRng::seed_from_u64(42)).unwrap()
    }

    #[test]
    fn test_forward_matches_manual_product() {
        let mut lin = layer(true);
        lin.weight
            .set_data(Tensor::from_vec(vec![1.0f64, 0.0, 0.0, 1.0, 1.0, 1.0], &[3, 2]).unwrap())
            .unwrap();
        lin.bias
            .as_mut()
            .unwrap()
            .set_data(Tensor::from_vec(vec![0.5f64, -0.5], &[2]).unwrap())
            .unwrap();

        let x = Tensor::from_vec(vec![1.0f64, 2.0, 3.0], &[1, 3]).unwrap();
        let y = lin.forward(&x).unwrap();
        assert_eq!(y.to_vec::<f64>().unwrap(), vec![4.5, 4.5]);
    }

    #[test]
    fn test_forward_keeps_leading_axes() {
        let lin = layer(false);
        let x = Tensor::ones(&[2, 4, 3], DType::Float64);
        let y = lin.forward(&x).unwrap();
        assert_eq!(y.shape(), &[2, 4, 2]);
        // every row of ones maps to the column sums of W
        let w = lin.weight.data.to_vec::<f64>().unwrap();
        let col0 = w[0] + w[2] + w[4];
        assert!((y.to_vec::<f64>().unwrap()[0] - col0).abs() < 1e-12);
    }

    #[test]
    fn test_forward_rejects_wrong_width_and_dtype() {
        let lin = layer(true);
        assert!(matches!(
            lin.forward(&Tensor::ones(&[2, 4], DType::Float64)),
            Err(TensorError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            lin.forward(&Tensor::ones(&[2, 3], DType::Float32)),
            Err(TensorError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_reset_xavier_zeroes_bias() {
        let mut lin = layer(true);
        lin.bias.as_mut().unwrap().set_data(Tensor::ones(&[2], DType::Float64)).unwrap();
        lin.reset_xavier(0.5, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(lin.bias.as_ref().unwrap().data.to_vec::<f64>().unwrap(), vec![0.0, 0.0]);
        let bound = 0.5 * (6.0f64 / 5.0).sqrt();
        assert!(lin.weight.data.to_vec::<f64>().unwrap().iter().all(|w| w.abs() <= bound));
    }

    #[test]
    fn test_parameters() {
        assert_eq!(layer(true).parameters().len(), 2);
        assert_eq!(layer(false).parameters().len(), 1);
        assert_eq!(layer(true).num_parameters(), 8);
    }
}
