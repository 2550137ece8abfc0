use graphormer_autodiff::Parameter;
use graphormer_core::{DType, Tensor, TensorError};
use rand::Rng;
use tracing::{debug, instrument, trace};

use crate::config::{AttnBiasType, BiasedAttentionConfig};
use crate::error::NnResult;
use crate::layers::{Dropout, Linear};
use crate::modules::Module;

/// Dense multi-head attention with a structural bias, as introduced in
/// "Do Transformers Really Perform Bad for Graph Representation?".
///
/// Attention(Q, K, V) = softmax(Q * K^T / sqrt(d) (+|*) bias, masked) * V
///
/// Node features are `[batch, N, feat_size]`, the bias is
/// `[batch, N, N, num_heads]` and the mask is `[batch, N, N]` where a non-zero
/// entry hides a key from a query in every head.
#[derive(Debug, Clone)]
pub struct BiasedMultiheadAttention {
    pub feat_size: usize,
    pub num_heads: usize,
    pub head_dim: usize,
    pub attn_bias_type: AttnBiasType,
    scaling: f64,

    pub q_proj: Linear,
    pub k_proj: Linear,
    pub v_proj: Linear,
    pub out_proj: Linear,
    dropout: Dropout,
}

impl BiasedMultiheadAttention {
    pub fn new<R: Rng + ?Sized>(config: BiasedAttentionConfig, rng: &mut R) -> NnResult<Self> {
        config.validate()?;
        let (f, dtype) = (config.feat_size, config.dtype);
        let head_dim = config.head_dim();

        let mut attn = BiasedMultiheadAttention {
            feat_size: f,
            num_heads: config.num_heads,
            head_dim,
            attn_bias_type: config.attn_bias_type,
            scaling: 1.0 / (head_dim as f64).sqrt(),
            q_proj: Linear::new(f, f, config.bias, dtype, rng)?,
            k_proj: Linear::new(f, f, config.bias, dtype, rng)?,
            v_proj: Linear::new(f, f, config.bias, dtype, rng)?,
            out_proj: Linear::new(f, f, config.bias, dtype, rng)?,
            dropout: Dropout::new(config.attn_drop)?,
        };
        attn.reset_parameters(rng)?;

        debug!(
            feat_size = f,
            num_heads = config.num_heads,
            attn_bias_type = %config.attn_bias_type,
            attn_drop = config.attn_drop,
            "built biased multi-head attention"
        );
        Ok(attn)
    }

    /// Xavier-uniform projections: gain `2^-0.5` for q/k/v, `1` for the
    /// output. All biases are zeroed.
    pub fn reset_parameters<R: Rng + ?Sized>(&mut self, rng: &mut R) -> NnResult<()> {
        let gain = 2f64.powf(-0.5);
        self.q_proj.reset_xavier(gain, rng)?;
        self.k_proj.reset_xavier(gain, rng)?;
        self.v_proj.reset_xavier(gain, rng)?;
        self.out_proj.reset_xavier(1.0, rng)?;
        Ok(())
    }

    pub fn dtype(&self) -> DType {
        self.q_proj.dtype()
    }

    pub fn training(&self) -> bool {
        self.dropout.training
    }

    /// Attention output `[batch, N, feat_size]`. Dropout (training mode only)
    /// draws from the thread-local generator.
    pub fn forward(
        &self,
        node_features: &Tensor,
        attn_bias: Option<&Tensor>,
        attn_mask: Option<&Tensor>,
    ) -> NnResult<Tensor> {
        self.forward_with_rng(node_features, attn_bias, attn_mask, &mut rand::thread_rng())
    }

    /// Same as [`forward`](Self::forward) with an explicit dropout generator.
    #[instrument(skip_all)]
    pub fn forward_with_rng<R: Rng + ?Sized>(
        &self,
        node_features: &Tensor,
        attn_bias: Option<&Tensor>,
        attn_mask: Option<&Tensor>,
        rng: &mut R,
    ) -> NnResult<Tensor> {
        let (out, _) = self.attend(node_features, attn_bias, attn_mask, rng)?;
        Ok(out)
    }

    /// Attention output together with the post-dropout attention
    /// probabilities `[batch, num_heads, N, N]`.
    #[instrument(skip_all)]
    pub fn forward_with_weights<R: Rng + ?Sized>(
        &self,
        node_features: &Tensor,
        attn_bias: Option<&Tensor>,
        attn_mask: Option<&Tensor>,
        rng: &mut R,
    ) -> NnResult<(Tensor, Tensor)> {
        let (out, probs) = self.attend(node_features, attn_bias, attn_mask, rng)?;
        let n = probs.shape()[1];
        let batch = probs.shape()[0] / self.num_heads;
        Ok((out, probs.reshape(&[batch, self.num_heads, n, n])?))
    }

    /// Returns the output and the `[batch * num_heads, N, N]` probabilities.
    fn attend<R: Rng + ?Sized>(
        &self,
        x: &Tensor,
        attn_bias: Option<&Tensor>,
        attn_mask: Option<&Tensor>,
        rng: &mut R,
    ) -> NnResult<(Tensor, Tensor)> {
        if x.ndim() != 3 {
            return Err(TensorError::InvalidOperation(format!(
                "node features must be [batch, N, feat_size], got {:?}",
                x.shape()
            ))
            .into());
        }
        let (bsz, n) = (x.shape()[0], x.shape()[1]);
        let (h, d) = (self.num_heads, self.head_dim);
        trace!(batch = bsz, num_nodes = n, num_heads = h, "attention forward");

        let q = self.q_proj.forward(x)?.scalar_mul(self.scaling)?;
        let k = self.k_proj.forward(x)?;
        let v = self.v_proj.forward(x)?;

        // [B, N, F] -> [B, N, H, d] -> [B, H, N, d] -> [B*H, N, d]
        let split_heads = |t: Tensor| -> NnResult<Tensor> {
            Ok(t.reshape(&[bsz, n, h, d])?.permute(&[0, 2, 1, 3])?.reshape(&[bsz * h, n, d])?)
        };
        let (q, k, v) = (split_heads(q)?, split_heads(k)?, split_heads(v)?);

        // [B*H, N, N] -> [B, H, N, N] -> [B, N, N, H]
        let mut scores = q
            .bmm(&k.transpose(1, 2)?)?
            .reshape(&[bsz, h, n, n])?
            .permute(&[0, 2, 3, 1])?;

        if let Some(bias) = attn_bias {
            bias.ensure_shape(&[bsz, n, n, h])?;
            scores = match self.attn_bias_type {
                AttnBiasType::Add => (&scores + bias)?,
                AttnBiasType::Mul => (&scores * bias)?,
            };
        }

        if let Some(mask) = attn_mask {
            mask.ensure_shape(&[bsz, n, n])?;
            scores = scores.masked_fill(mask, f64::NEG_INFINITY)?;
        }

        // softmax over keys, then back to [B*H, N, N]
        let probs = scores
            .softmax(2)?
            .permute(&[0, 3, 1, 2])?
            .reshape(&[bsz * h, n, n])?;
        let probs = self.dropout.forward_with_rng(&probs, rng)?;

        // [B*H, N, d] -> [B, H, N, d] -> [B, N, H, d] -> [B, N, F]
        let attn = probs
            .bmm(&v)?
            .reshape(&[bsz, h, n, d])?
            .permute(&[0, 2, 1, 3])?
            .reshape(&[bsz, n, self.feat_size])?;

        Ok((self.out_proj.forward(&attn)?, probs))
    }
}

impl Module for BiasedMultiheadAttention {
    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = Vec::new();
        params.extend(self.q_proj.parameters());
        params.extend(self.k_proj.parameters());
        params.extend(self.v_proj.parameters());
        params.extend(self.out_proj.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = Vec::new();
        params.extend(self.q_proj.parameters_mut());
        params.extend(self.k_proj.parameters_mut());
        params.extend(self.v_proj.parameters_mut());
        params.extend(self.out_proj.parameters_mut());
        params
    }

    fn set_training(&mut self, training: bool) {
        self.dropout.set_training(training);
    }
}
