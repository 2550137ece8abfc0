pub mod dropout;
pub mod embedding;
pub mod linear;

pub use dropout::Dropout;
pub use embedding::Embedding;
pub use linear::Linear;
