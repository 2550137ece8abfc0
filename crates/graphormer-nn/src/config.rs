//! Construction-time settings for the graph transformer modules.
//!
//! Defaults mirror the usual Graphormer layer signatures: both degree
//! directions, biased projections, additive attention bias and an attention
//! dropout of 0.1.

use std::fmt;
use std::str::FromStr;

use graphormer_core::DType;
use serde::{Deserialize, Serialize};

use crate::error::{NnError, NnResult};

/// Which degree(s) the degree encoder embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Direction {
    In,
    Out,
    /// Sum of the in-degree and out-degree embeddings.
    #[default]
    Both,
}

impl FromStr for Direction {
    type Err = NnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "both" => Ok(Direction::Both),
            other => Err(NnError::InvalidDirection(other.to_string())),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = NnError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Both => "both",
        };
        write!(f, "{}", name)
    }
}

/// How the structural bias is combined with raw attention scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum AttnBiasType {
    #[default]
    Add,
    Mul,
}

impl FromStr for AttnBiasType {
    type Err = NnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(AttnBiasType::Add),
            "mul" => Ok(AttnBiasType::Mul),
            other => Err(NnError::InvalidAttnBiasType(other.to_string())),
        }
    }
}

impl TryFrom<String> for AttnBiasType {
    type Error = NnError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for AttnBiasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttnBiasType::Add => "add",
            AttnBiasType::Mul => "mul",
        };
        write!(f, "{}", name)
    }
}

fn require_float(dtype: DType) -> NnResult<()> {
    if !dtype.is_float() {
        return Err(NnError::InvalidConfig(format!(
            "parameters need a float dtype, got {:?}",
            dtype
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegreeEncoderConfig {
    /// Degrees are clamped into `[0, max_degree]`.
    pub max_degree: usize,
    pub embedding_dim: usize,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub dtype: DType,
}

impl DegreeEncoderConfig {
    pub fn new(max_degree: usize, embedding_dim: usize) -> Self {
        DegreeEncoderConfig {
            max_degree,
            embedding_dim,
            direction: Direction::default(),
            dtype: DType::default(),
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn validate(&self) -> NnResult<()> {
        if self.embedding_dim == 0 {
            return Err(NnError::InvalidConfig("embedding_dim must be positive".into()));
        }
        require_float(self.dtype)
    }
}

fn default_bias() -> bool {
    true
}

fn default_attn_drop() -> f64 {
    0.1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasedAttentionConfig {
    pub feat_size: usize,
    pub num_heads: usize,
    /// Whether the linear projections carry an additive bias.
    #[serde(default = "default_bias")]
    pub bias: bool,
    #[serde(default)]
    pub attn_bias_type: AttnBiasType,
    /// Dropout probability on the attention weights.
    #[serde(default = "default_attn_drop")]
    pub attn_drop: f64,
    #[serde(default)]
    pub dtype: DType,
}

impl BiasedAttentionConfig {
    pub fn new(feat_size: usize, num_heads: usize) -> Self {
        BiasedAttentionConfig {
            feat_size,
            num_heads,
            bias: default_bias(),
            attn_bias_type: AttnBiasType::default(),
            attn_drop: default_attn_drop(),
            dtype: DType::default(),
        }
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    pub fn with_attn_bias_type(mut self, attn_bias_type: AttnBiasType) -> Self {
        self.attn_bias_type = attn_bias_type;
        self
    }

    pub fn with_attn_drop(mut self, attn_drop: f64) -> Self {
        self.attn_drop = attn_drop;
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn head_dim(&self) -> usize {
        if self.num_heads == 0 {
            0
        } else {
            self.feat_size / self.num_heads
        }
    }

    pub fn validate(&self) -> NnResult<()> {
        if self.feat_size == 0 || self.num_heads == 0 {
            return Err(NnError::InvalidConfig(format!(
                "feat_size and num_heads must be positive, got {} and {}",
                self.feat_size, self.num_heads
            )));
        }
        if self.feat_size % self.num_heads != 0 {
            return Err(NnError::IndivisibleHeads {
                feat_size: self.feat_size,
                num_heads: self.num_heads,
            });
        }
        if !(0.0..1.0).contains(&self.attn_drop) {
            return Err(NnError::InvalidDropout(self.attn_drop));
        }
        require_float(self.dtype)
    }
}
