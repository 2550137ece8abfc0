pub mod dtype;
pub mod error;
pub mod shape;
pub mod tensor;
pub mod ops;
pub mod init;

pub use dtype::*;
pub use error::*;
pub use tensor::*;
