//! # Convolutional network builder
//!
//! Builds a convolutional network from a declarative list of hidden layers. Each hidden layer is
//! described by a `LayerSpec`, written in JSON configurations as a list whose first element is
//! the layer type:
//! - `["conv", channels, kernel_size, stride, padding]`
//! - `["maxpool", kernel_size, stride, padding]`
//! - `["avgpool", kernel_size, stride, padding]`
//! - `["adaptivemaxpool", output_height, output_width]`
//! - `["adaptiveavgpool", output_height, output_width]`
//! - `["linear", in_features, out_features]` or `["linear", out_features]`
//!
//! The last hidden layer must be a linear or adaptive pooling layer so that the width of the
//! output heads is known at construction time. One linear output head is attached per
//! requested output dimension.
//!
//! ```no_run
//! # fn main() -> Result<(), nn_builder::NnBuilderError> {
//! use nn_builder::cnn::{Cnn, CnnConfig};
//! use nn_builder::Config;
//! use tch::{nn, Device, Kind, Tensor};
//!
//! let config = CnnConfig::from_file("path/to/config.json")?;
//! let vs = nn::VarStore::new(Device::cuda_if_available());
//! let cnn = Cnn::new(vs.root(), &config)?;
//!
//! let input = Tensor::rand(&[16, config.input_dim, 32, 32], (Kind::Float, vs.device()));
//! let head_outputs = cnn.forward_t(&input, false)?;
//! # Ok(())
//! # }
//! ```

mod cnn_model;
mod config;
mod embeddings;
mod hidden;
mod layer_spec;
mod output;

pub use cnn_model::Cnn;
pub use config::{CnnConfig, OutputWidthRule};
pub use embeddings::ChannelEmbeddings;
pub use hidden::{build_hidden_layers, HiddenLayer};
pub use layer_spec::{LayerSpec, VALID_LAYER_TYPES};
pub use output::{build_output_layers, output_input_width};
