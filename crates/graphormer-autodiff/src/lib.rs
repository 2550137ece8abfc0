pub mod no_grad;
pub mod parameter;

pub use no_grad::*;
pub use parameter::*;
