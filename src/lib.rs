// Quantized MLP face classifier served over a byte-oriented serial link
pub mod clock;
pub mod dataset;
pub mod mlp;
pub mod protocol;
pub mod serial;
pub mod session;

pub use mlp::network::{Engine, Precision};
pub use mlp::Model;
