pub mod coo;
pub mod error;
pub mod hetero;

pub use coo::Coo;
pub use error::{GraphError, GraphResult};
pub use hetero::{HeteroGraph, Relation, DEFAULT_ETYPE, DEFAULT_NTYPE};
