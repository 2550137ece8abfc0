use graphormer_core::TensorError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Duplicate node type: {0}")]
    DuplicateNodeType(String),

    #[error("Node id {id} out of range for node type {ntype} with {count} nodes")]
    NodeOutOfRange { ntype: String, id: usize, count: usize },

    #[error("Edge endpoint arrays differ in length: {src} sources, {dst} destinations")]
    EndpointLengthMismatch { src: usize, dst: usize },

    #[error("Degree query needs a homogeneous graph, got {ntypes} node types and {etypes} edge types")]
    NotHomogeneous { ntypes: usize, etypes: usize },

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type GraphResult<T> = Result<T, GraphError>;
