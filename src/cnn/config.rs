use crate::cnn::layer_spec::LayerSpec;
use crate::common::activations::Activation;
use crate::common::config::OneOrMany;
use crate::common::initialiser::Initialiser;
use crate::{Config, NnBuilderError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// # Flattened width of an adaptive pooling layer feeding the output heads
pub enum OutputWidthRule {
    /// `output_height * output_width`. The channel count is not multiplied in, which
    /// undercounts the flattened width of multi-channel inputs: the mismatch surfaces as a
    /// `ShapeError` in the forward pass.
    SpatialOnly,
    /// `channels * output_height * output_width`
    ChannelsTimesSpatial,
}

impl Default for OutputWidthRule {
    fn default() -> Self {
        OutputWidthRule::SpatialOnly
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # CNN configuration
/// Declarative description of a convolutional network: hidden layers, output heads,
/// activations, regularization and parameter initialisation.
pub struct CnnConfig {
    /// Number of input channels (e.g. 3 for RGB images)
    #[serde(default = "default_input_dim")]
    pub input_dim: i64,
    pub hidden_layers_info: Vec<LayerSpec>,
    /// One entry per output head
    pub output_dim: OneOrMany<i64>,
    /// Activation of the output heads, a single value applies to every head
    #[serde(default)]
    pub output_activation: Option<OneOrMany<Activation>>,
    /// Activation of the hidden layers, a list must hold one value per hidden layer
    #[serde(default = "default_hidden_activations")]
    pub hidden_activations: OneOrMany<Activation>,
    #[serde(default)]
    pub dropout: f64,
    #[serde(default)]
    pub initialiser: Initialiser,
    #[serde(default)]
    pub batch_norm: bool,
    /// Input channels holding category indices, replaced by their embeddings
    #[serde(default)]
    pub columns_of_data_to_be_embedded: Vec<i64>,
    /// `(number of categories, embedding width)` for each embedded channel
    #[serde(default)]
    pub embedding_dimensions: Vec<(i64, i64)>,
    #[serde(
        default,
        serialize_with = "serialize_y_range",
        deserialize_with = "deserialize_y_range"
    )]
    pub y_range: Option<(f64, f64)>,
    #[serde(default)]
    pub random_seed: u64,
    #[serde(default)]
    pub print_model_summary: bool,
    #[serde(default)]
    pub output_width_rule: OutputWidthRule,
}

fn default_input_dim() -> i64 {
    1
}

fn default_hidden_activations() -> OneOrMany<Activation> {
    OneOrMany::One(Activation::relu)
}

fn serialize_y_range<S>(y_range: &Option<(f64, f64)>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match y_range {
        Some((lower, upper)) => [*lower, *upper].serialize(serializer),
        None => Vec::<f64>::new().serialize(serializer),
    }
}

fn deserialize_y_range<'de, D>(deserializer: D) -> Result<Option<(f64, f64)>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<f64>> = Option::deserialize(deserializer)?;
    match values.as_deref() {
        None | Some([]) => Ok(None),
        Some(&[lower, upper]) => Ok(Some((lower, upper))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "y_range must be empty or of the form [lower, upper], got {:?}",
            other
        ))),
    }
}

impl Config for CnnConfig {}

impl CnnConfig {
    /// Creates a configuration with default values for every optional argument:
    /// 1 input channel, ReLU hidden activations, no output activation, no dropout,
    /// `tch` default initialisation, no batch norm, no embeddings and no output range.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nn_builder::cnn::{CnnConfig, LayerSpec};
    /// use nn_builder::Initialiser;
    ///
    /// let config = CnnConfig {
    ///     input_dim: 3,
    ///     initialiser: Initialiser::XavierUniform,
    ///     ..CnnConfig::new(
    ///         vec![LayerSpec::conv(16, 3, 1, 1), LayerSpec::adaptive_avg_pool(4, 4)],
    ///         10.into(),
    ///     )
    /// };
    /// ```
    pub fn new(hidden_layers_info: Vec<LayerSpec>, output_dim: OneOrMany<i64>) -> CnnConfig {
        CnnConfig {
            input_dim: default_input_dim(),
            hidden_layers_info,
            output_dim,
            output_activation: None,
            hidden_activations: default_hidden_activations(),
            dropout: 0.0,
            initialiser: Initialiser::Default,
            batch_norm: false,
            columns_of_data_to_be_embedded: vec![],
            embedding_dimensions: vec![],
            y_range: None,
            random_seed: 0,
            print_model_summary: false,
            output_width_rule: OutputWidthRule::SpatialOnly,
        }
    }

    /// Output dimensions normalized to one entry per head
    pub fn output_dims(&self) -> Vec<i64> {
        self.output_dim.to_vec()
    }

    /// Activation applied to output head `head_index`
    pub fn output_activation_for(&self, head_index: usize) -> Activation {
        self.output_activation
            .as_ref()
            .and_then(|activations| activations.get(head_index))
            .copied()
            .unwrap_or(Activation::none)
    }

    /// Number of channels reaching the first hidden layer once embedded channels are
    /// replaced by their embeddings
    pub fn effective_input_dim(&self) -> Result<i64, NnBuilderError> {
        let passthrough_dim = self.input_dim - self.columns_of_data_to_be_embedded.len() as i64;
        self.embedding_dimensions
            .iter()
            .try_fold(passthrough_dim, |total, (_, embedding_dim)| {
                total.checked_add(*embedding_dim)
            })
            .ok_or_else(|| {
                NnBuilderError::InvalidConfigurationError(format!(
                    "embedding dimensions {:?} overflow the number of input channels",
                    self.embedding_dimensions
                ))
            })
    }

    /// Checks that every argument is well-formed, failing on the first invalid one.
    /// Called by `Cnn::new` before any layer is created.
    pub fn validate(&self) -> Result<(), NnBuilderError> {
        self.check_input_dim_valid()?;
        self.check_output_dim_valid()?;
        self.check_hidden_layers_valid()?;
        self.check_activations_valid()?;
        self.check_initialiser_valid()?;
        self.check_dropout_valid()?;
        self.check_embeddings_valid()?;
        self.check_y_range_valid()?;
        Ok(())
    }

    fn check_input_dim_valid(&self) -> Result<(), NnBuilderError> {
        if self.input_dim <= 0 {
            return Err(NnBuilderError::InvalidConfigurationError(format!(
                "input_dim must be a positive integer, got {}",
                self.input_dim
            )));
        }
        Ok(())
    }

    fn check_output_dim_valid(&self) -> Result<(), NnBuilderError> {
        let output_dims = self.output_dims();
        if output_dims.is_empty() {
            return Err(NnBuilderError::InvalidConfigurationError(
                "output_dim must contain at least one output head".to_string(),
            ));
        }
        if let Some(dim) = output_dims.iter().find(|&&dim| dim <= 0) {
            return Err(NnBuilderError::InvalidConfigurationError(format!(
                "output dimensions must be positive integers, got {}",
                dim
            )));
        }
        Ok(())
    }

    fn check_hidden_layers_valid(&self) -> Result<(), NnBuilderError> {
        let last_layer = self.hidden_layers_info.last().ok_or_else(|| {
            NnBuilderError::InvalidLayerError(
                "hidden_layers_info must contain at least one layer".to_string(),
            )
        })?;
        for layer in self.hidden_layers_info.iter() {
            layer.validate()?;
        }
        if !last_layer.defines_output_width() {
            return Err(NnBuilderError::OutputShapeError(format!(
                "Don't know dimensions for output layer. Must use adaptivemaxpool, adaptiveavgpool, or linear as final hidden layer, got {}",
                last_layer.type_name()
            )));
        }

        // Width of the flattened features, when known before running the network
        let mut channels = self.effective_input_dim()?;
        let mut known_width = Some(channels);
        let mut after_linear = false;
        for (index, layer) in self.hidden_layers_info.iter().enumerate() {
            match *layer {
                LayerSpec::Linear {
                    in_features,
                    out_features,
                } => {
                    match (in_features, known_width) {
                        (None, None) => {
                            return Err(NnBuilderError::ShapeError(format!(
                                "in_features of linear layer {} can not be inferred after a {} layer, use ['linear', in_features, out_features]",
                                index,
                                self.hidden_layers_info[index - 1].type_name()
                            )));
                        }
                        (Some(declared), Some(previous)) if after_linear && declared != previous => {
                            return Err(NnBuilderError::ShapeError(format!(
                                "linear layer {} declares {} in_features but the previous linear layer outputs {}",
                                index, declared, previous
                            )));
                        }
                        _ => {}
                    }
                    known_width = Some(out_features);
                    after_linear = true;
                }
                _ if after_linear => {
                    return Err(NnBuilderError::ShapeError(format!(
                        "{} layer {} can not follow a linear layer",
                        layer.type_name(),
                        index
                    )));
                }
                LayerSpec::Conv { channels: out, .. } => {
                    channels = out;
                    known_width = None;
                }
                LayerSpec::MaxPool { .. } | LayerSpec::AvgPool { .. } => known_width = None,
                LayerSpec::AdaptiveMaxPool {
                    output_height,
                    output_width,
                }
                | LayerSpec::AdaptiveAvgPool {
                    output_height,
                    output_width,
                } => {
                    known_width = Some(self.adaptive_pool_width(
                        channels,
                        output_height,
                        output_width,
                    )?);
                }
            }
        }
        Ok(())
    }

    /// Flattened width of an adaptive pooling output under the configured `OutputWidthRule`
    pub fn adaptive_pool_width(
        &self,
        channels: i64,
        output_height: i64,
        output_width: i64,
    ) -> Result<i64, NnBuilderError> {
        let spatial_width = output_height.checked_mul(output_width);
        let width = match self.output_width_rule {
            OutputWidthRule::SpatialOnly => spatial_width,
            OutputWidthRule::ChannelsTimesSpatial => {
                spatial_width.and_then(|width| width.checked_mul(channels))
            }
        };
        width.ok_or_else(|| {
            NnBuilderError::InvalidLayerError(format!(
                "flattened width of {} channels pooled to ({}, {}) overflows",
                channels, output_height, output_width
            ))
        })
    }

    fn check_activations_valid(&self) -> Result<(), NnBuilderError> {
        if let Some(num_activations) = self.hidden_activations.list_len() {
            if num_activations != self.hidden_layers_info.len() {
                return Err(NnBuilderError::ShapeError(format!(
                    "Number of hidden activations ({}) must equal number of hidden layers ({})",
                    num_activations,
                    self.hidden_layers_info.len()
                )));
            }
        }
        if let Some(num_activations) = self
            .output_activation
            .as_ref()
            .and_then(OneOrMany::list_len)
        {
            let num_heads = self.output_dims().len();
            if num_activations != num_heads {
                return Err(NnBuilderError::ShapeError(format!(
                    "Number of output activations ({}) must equal number of output heads ({})",
                    num_activations, num_heads
                )));
            }
        }
        Ok(())
    }

    fn check_initialiser_valid(&self) -> Result<(), NnBuilderError> {
        let has_conv = self
            .hidden_layers_info
            .iter()
            .any(|layer| matches!(layer, LayerSpec::Conv { .. }));
        if has_conv && !self.initialiser.supports_dims(4) {
            return Err(NnBuilderError::InvalidConfigurationError(format!(
                "{} initialiser only supports 2-dimensional weights and can not be used with conv layers",
                self.initialiser
            )));
        }
        Ok(())
    }

    fn check_dropout_valid(&self) -> Result<(), NnBuilderError> {
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(NnBuilderError::InvalidConfigurationError(format!(
                "dropout must be a probability in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    fn check_embeddings_valid(&self) -> Result<(), NnBuilderError> {
        let columns = &self.columns_of_data_to_be_embedded;
        if columns.len() != self.embedding_dimensions.len() {
            return Err(NnBuilderError::InvalidConfigurationError(format!(
                "{} columns to embed but {} embedding dimensions given",
                columns.len(),
                self.embedding_dimensions.len()
            )));
        }
        let mut seen = HashSet::new();
        for &column in columns.iter() {
            if column < 0 || column >= self.input_dim {
                return Err(NnBuilderError::InvalidConfigurationError(format!(
                    "column to embed {} is not an input channel (input_dim {})",
                    column, self.input_dim
                )));
            }
            if !seen.insert(column) {
                return Err(NnBuilderError::InvalidConfigurationError(format!(
                    "column {} is embedded more than once",
                    column
                )));
            }
        }
        if let Some((num_categories, embedding_dim)) = self
            .embedding_dimensions
            .iter()
            .find(|(num_categories, embedding_dim)| *num_categories <= 0 || *embedding_dim <= 0)
        {
            return Err(NnBuilderError::InvalidConfigurationError(format!(
                "embedding dimensions must be positive, got [{}, {}]",
                num_categories, embedding_dim
            )));
        }
        if !columns.is_empty()
            && !matches!(self.hidden_layers_info.first(), Some(LayerSpec::Conv { .. }))
        {
            return Err(NnBuilderError::InvalidConfigurationError(
                "embeddings are only supported when the first hidden layer is a conv layer"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn check_y_range_valid(&self) -> Result<(), NnBuilderError> {
        if let Some((lower, upper)) = self.y_range {
            if !lower.is_finite() || !upper.is_finite() || lower >= upper {
                return Err(NnBuilderError::InvalidRangeError(format!(
                    "y_range must be of the form (lower, upper) with finite lower < upper, got ({}, {})",
                    lower, upper
                )));
            }
        }
        Ok(())
    }
}
