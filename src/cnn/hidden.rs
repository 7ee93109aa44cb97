use crate::cnn::config::CnnConfig;
use crate::cnn::layer_spec::LayerSpec;
use crate::NnBuilderError;
use std::borrow::Borrow;
use std::fmt;
use tch::{nn, Tensor};

#[derive(Debug)]
/// # Hidden layer of a `Cnn`
/// Constructed layer together with the input dimension it was built for.
pub enum HiddenLayer {
    Conv {
        in_channels: i64,
        out_channels: i64,
        kernel_size: i64,
        stride: i64,
        padding: i64,
        conv: nn::Conv2D,
    },
    MaxPool {
        kernel_size: i64,
        stride: i64,
        padding: i64,
    },
    AvgPool {
        kernel_size: i64,
        stride: i64,
        padding: i64,
    },
    AdaptiveMaxPool {
        channels: i64,
        output_height: i64,
        output_width: i64,
    },
    AdaptiveAvgPool {
        channels: i64,
        output_height: i64,
        output_width: i64,
    },
    Linear {
        in_features: i64,
        out_features: i64,
        linear: nn::Linear,
    },
}

impl HiddenLayer {
    pub fn has_weights(&self) -> bool {
        self.weight().is_some()
    }

    pub fn weight(&self) -> Option<&Tensor> {
        match self {
            HiddenLayer::Conv { conv, .. } => Some(&conv.ws),
            HiddenLayer::Linear { linear, .. } => Some(&linear.ws),
            _ => None,
        }
    }

    /// Weight and bias of a convolution or linear layer
    pub fn parameters_mut(&mut self) -> Option<(&mut Tensor, Option<&mut Tensor>)> {
        match self {
            HiddenLayer::Conv { conv, .. } => Some((&mut conv.ws, conv.bs.as_mut())),
            HiddenLayer::Linear { linear, .. } => Some((&mut linear.ws, Some(&mut linear.bs))),
            _ => None,
        }
    }

    /// Channels of a convolution or features of a linear layer. Sizes the batch normalization
    /// following the layer.
    pub fn num_output_features(&self) -> Option<i64> {
        match self {
            HiddenLayer::Conv { out_channels, .. } => Some(*out_channels),
            HiddenLayer::Linear { out_features, .. } => Some(*out_features),
            _ => None,
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, HiddenLayer::Linear { .. })
    }

    /// Applies the layer alone (no activation, normalization or dropout).
    /// Inputs of a linear layer are flattened from dimension 1. Shapes rejected by `tch`, such
    /// as an input smaller than a kernel, are returned as errors.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, NnBuilderError> {
        let output = match self {
            HiddenLayer::Conv {
                stride,
                padding,
                conv,
                ..
            } => input.f_conv2d(
                &conv.ws,
                conv.bs.as_ref(),
                &[*stride, *stride],
                &[*padding, *padding],
                &[1, 1],
                1,
            )?,
            HiddenLayer::MaxPool {
                kernel_size,
                stride,
                padding,
            } => input.f_max_pool2d(
                &[*kernel_size, *kernel_size],
                &[*stride, *stride],
                &[*padding, *padding],
                &[1, 1],
                false,
            )?,
            HiddenLayer::AvgPool {
                kernel_size,
                stride,
                padding,
            } => input.f_avg_pool2d(
                &[*kernel_size, *kernel_size],
                &[*stride, *stride],
                &[*padding, *padding],
                false,
                true,
                None::<i64>,
            )?,
            HiddenLayer::AdaptiveMaxPool {
                output_height,
                output_width,
                ..
            } => {
                input
                    .f_adaptive_max_pool2d(&[*output_height, *output_width])?
                    .0
            }
            HiddenLayer::AdaptiveAvgPool {
                output_height,
                output_width,
                ..
            } => input.f_adaptive_avg_pool2d(&[*output_height, *output_width])?,
            HiddenLayer::Linear {
                in_features,
                linear,
                ..
            } => {
                let flat_input = flatten(input);
                let width = flat_input.size()[1];
                if width != *in_features {
                    return Err(NnBuilderError::ShapeError(format!(
                        "linear layer expects {} input features, got {}",
                        in_features, width
                    )));
                }
                flat_input.apply(linear)
            }
        };
        Ok(output)
    }
}

/// Flattens every dimension after the batch dimension
pub(crate) fn flatten(input: &Tensor) -> Tensor {
    if input.dim() > 2 {
        input.flatten(1, -1)
    } else {
        input.shallow_clone()
    }
}

impl fmt::Display for HiddenLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HiddenLayer::Conv {
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
                ..
            } => write!(
                f,
                "Conv2d({}, {}, kernel_size=({k}, {k}), stride=({s}, {s}), padding=({p}, {p}))",
                in_channels,
                out_channels,
                k = kernel_size,
                s = stride,
                p = padding
            ),
            HiddenLayer::MaxPool {
                kernel_size,
                stride,
                padding,
            } => write!(
                f,
                "MaxPool2d(kernel_size={}, stride={}, padding={})",
                kernel_size, stride, padding
            ),
            HiddenLayer::AvgPool {
                kernel_size,
                stride,
                padding,
            } => write!(
                f,
                "AvgPool2d(kernel_size={}, stride={}, padding={})",
                kernel_size, stride, padding
            ),
            HiddenLayer::AdaptiveMaxPool {
                output_height,
                output_width,
                ..
            } => write!(
                f,
                "AdaptiveMaxPool2d(output_size=({}, {}))",
                output_height, output_width
            ),
            HiddenLayer::AdaptiveAvgPool {
                output_height,
                output_width,
                ..
            } => write!(
                f,
                "AdaptiveAvgPool2d(output_size=({}, {}))",
                output_height, output_width
            ),
            HiddenLayer::Linear {
                in_features,
                out_features,
                ..
            } => write!(
                f,
                "Linear(in_features={}, out_features={})",
                in_features, out_features
            ),
        }
    }
}

/// Builds the hidden layers of a network, one per entry of `config.hidden_layers_info`.
///
/// The output channel count of each convolution is the input channel count of the next one;
/// pooling layers pass it through unchanged. A linear layer without declared `in_features`
/// takes the width of the network input, of the previous linear layer or of the preceding
/// adaptive pooling.
///
/// # Arguments
///
/// * `p` - Variable store path under which the layers are created (`p / i` for layer `i`)
/// * `config` - validated `CnnConfig`
pub fn build_hidden_layers<'p, P>(
    p: P,
    config: &CnnConfig,
) -> Result<Vec<HiddenLayer>, NnBuilderError>
where
    P: Borrow<nn::Path<'p>>,
{
    let p = p.borrow();
    let mut in_channels = config.effective_input_dim()?;
    let mut known_width = Some(in_channels);
    let mut hidden_layers = Vec::with_capacity(config.hidden_layers_info.len());

    for (layer_index, layer_spec) in config.hidden_layers_info.iter().enumerate() {
        let layer = match *layer_spec {
            LayerSpec::Conv {
                channels,
                kernel_size,
                stride,
                padding,
            } => {
                let conv_config = nn::ConvConfig {
                    stride,
                    padding,
                    ..Default::default()
                };
                let conv = nn::conv2d(p / layer_index, in_channels, channels, kernel_size, conv_config);
                let layer = HiddenLayer::Conv {
                    in_channels,
                    out_channels: channels,
                    kernel_size,
                    stride,
                    padding,
                    conv,
                };
                in_channels = channels;
                known_width = None;
                layer
            }
            LayerSpec::MaxPool {
                kernel_size,
                stride,
                padding,
            } => {
                known_width = None;
                HiddenLayer::MaxPool {
                    kernel_size,
                    stride,
                    padding,
                }
            }
            LayerSpec::AvgPool {
                kernel_size,
                stride,
                padding,
            } => {
                known_width = None;
                HiddenLayer::AvgPool {
                    kernel_size,
                    stride,
                    padding,
                }
            }
            LayerSpec::AdaptiveMaxPool {
                output_height,
                output_width,
            } => {
                known_width = Some(config.adaptive_pool_width(
                    in_channels,
                    output_height,
                    output_width,
                )?);
                HiddenLayer::AdaptiveMaxPool {
                    channels: in_channels,
                    output_height,
                    output_width,
                }
            }
            LayerSpec::AdaptiveAvgPool {
                output_height,
                output_width,
            } => {
                known_width = Some(config.adaptive_pool_width(
                    in_channels,
                    output_height,
                    output_width,
                )?);
                HiddenLayer::AdaptiveAvgPool {
                    channels: in_channels,
                    output_height,
                    output_width,
                }
            }
            LayerSpec::Linear {
                in_features,
                out_features,
            } => {
                let in_features = in_features.or(known_width).ok_or_else(|| {
                    NnBuilderError::ShapeError(format!(
                        "in_features of linear layer {} can not be inferred",
                        layer_index
                    ))
                })?;
                let linear = nn::linear(p / layer_index, in_features, out_features, Default::default());
                known_width = Some(out_features);
                HiddenLayer::Linear {
                    in_features,
                    out_features,
                    linear,
                }
            }
        };
        log::debug!("hidden layer {}: {}", layer_index, layer);
        hidden_layers.push(layer);
    }
    Ok(hidden_layers)
}
