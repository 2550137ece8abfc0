use graphormer_core::TensorError;
use graphormer_graph::GraphError;
use thiserror::Error;

/// Errors raised by the neural network modules.
///
/// Configuration problems are reported eagerly at construction; tensor and
/// graph errors raised during a forward pass pass through unchanged.
#[derive(Debug, Error)]
pub enum NnError {
    #[error("Supported direction options: \"in\", \"out\" and \"both\", but got {0}")]
    InvalidDirection(String),

    #[error("Supported attention bias types: \"add\" and \"mul\", but got {0}")]
    InvalidAttnBiasType(String),

    #[error("feat_size must be divisible by num_heads, got feat_size={feat_size} and num_heads={num_heads}")]
    IndivisibleHeads { feat_size: usize, num_heads: usize },

    #[error("Dropout probability must be in [0, 1), got {0}")]
    InvalidDropout(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type NnResult<T> = Result<T, NnError>;
