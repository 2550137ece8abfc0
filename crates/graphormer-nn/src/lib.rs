pub mod config;
pub mod error;
pub mod layers;
pub mod modules;
pub mod graph {
    pub use crate::modules::graph::*;
}

pub use config::*;
pub use error::{NnError, NnResult};
pub use graph::*;
pub use layers::*;
pub use modules::Module;
