pub mod activations;
pub mod config;
pub(crate) mod dropout;
pub mod error;
pub mod initialiser;

pub use activations::Activation;
pub use config::{Config, OneOrMany};
pub use initialiser::Initialiser;
