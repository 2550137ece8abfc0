//! Graph transformer building blocks: structural encodings and attention
//! that consumes structural bias.

pub mod biased_attention;
pub use biased_attention::BiasedMultiheadAttention;

pub mod degree_encoder;
pub use degree_encoder::DegreeEncoder;
