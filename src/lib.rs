//! Declarative construction of convolutional neural networks with `tch`.
//!
//! A network is described as data, either in Rust or in a JSON configuration file: an ordered
//! list of hidden layer specifications (convolution, pooling, adaptive pooling, linear), one or
//! more output heads, activations, dropout, batch normalization, categorical channel
//! embeddings, an output range restriction and a parameter initialisation scheme. The builder
//! validates the whole description, creates the layers in a `tch` variable store, initialises
//! the parameters from a seeded random generator and optionally prints a model summary.
//!
//! ```json
//! {
//!     "input_dim": 3,
//!     "hidden_layers_info": [
//!         ["conv", 16, 3, 1, 1],
//!         ["maxpool", 2, 2, 0],
//!         ["conv", 32, 3, 1, 1],
//!         ["adaptiveavgpool", 4, 4],
//!         ["linear", 512, 64]
//!     ],
//!     "output_dim": [10, 1],
//!     "output_activation": ["softmax", "sigmoid"],
//!     "dropout": 0.2,
//!     "batch_norm": true,
//!     "initialiser": "xavier",
//!     "random_seed": 42,
//!     "output_width_rule": "channels_times_spatial"
//! }
//! ```
//!
//! See the `cnn` module for the layer specification format and `cnn::Cnn` for the built network.

pub mod cnn;
pub mod common;

pub use common::error::NnBuilderError;
pub use common::{Activation, Config, Initialiser, OneOrMany};
