use crate::cnn::config::CnnConfig;
use crate::cnn::hidden::HiddenLayer;
use crate::NnBuilderError;
use std::borrow::Borrow;
use tch::nn;

/// Flattened feature width produced by the last hidden layer.
///
/// An adaptive pooling layer gives `output_height * output_width`, multiplied by its channel
/// count only under `OutputWidthRule::ChannelsTimesSpatial`. A linear layer gives its
/// `out_features`. Any other terminal layer has no width known at construction time.
pub fn output_input_width(
    hidden_layers: &[HiddenLayer],
    config: &CnnConfig,
) -> Result<i64, NnBuilderError> {
    match hidden_layers.last() {
        Some(HiddenLayer::AdaptiveMaxPool {
            channels,
            output_height,
            output_width,
        })
        | Some(HiddenLayer::AdaptiveAvgPool {
            channels,
            output_height,
            output_width,
        }) => config.adaptive_pool_width(*channels, *output_height, *output_width),
        Some(HiddenLayer::Linear { out_features, .. }) => Ok(*out_features),
        _ => Err(NnBuilderError::OutputShapeError(
            "Don't know dimensions for output layer. Must use adaptivemaxpool, adaptiveavgpool, or linear as final hidden layer"
                .to_string(),
        )),
    }
}

/// Builds one linear output head per requested output dimension, in the requested order.
///
/// # Arguments
///
/// * `p` - Variable store path under which the heads are created (`p / i` for head `i`)
/// * `hidden_layers` - hidden layers the heads are attached to
/// * `config` - validated `CnnConfig`
pub fn build_output_layers<'p, P>(
    p: P,
    hidden_layers: &[HiddenLayer],
    config: &CnnConfig,
) -> Result<Vec<nn::Linear>, NnBuilderError>
where
    P: Borrow<nn::Path<'p>>,
{
    let p = p.borrow();
    let input_width = output_input_width(hidden_layers, config)?;
    let output_layers = config
        .output_dims()
        .into_iter()
        .enumerate()
        .map(|(head_index, output_dim)| {
            log::debug!(
                "output head {}: Linear(in_features={}, out_features={})",
                head_index,
                input_width,
                output_dim
            );
            nn::linear(p / head_index, input_width, output_dim, Default::default())
        })
        .collect();
    Ok(output_layers)
}
