use crate::cnn::config::CnnConfig;
use crate::cnn::embeddings::ChannelEmbeddings;
use crate::cnn::hidden::{build_hidden_layers, flatten, HiddenLayer};
use crate::cnn::output::{build_output_layers, output_input_width};
use crate::common::activations::Activation;
use crate::common::config::OneOrMany;
use crate::common::dropout::Dropout;
use crate::common::initialiser::fans;
use crate::NnBuilderError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::borrow::Borrow;
use std::fmt;
use tch::nn::{BatchNorm, BatchNormConfig};
use tch::{nn, Tensor};

/// # Convolutional network built from a `CnnConfig`
/// It is made of the following blocks:
/// - `embeddings`: optional embeddings of categorical input channels
/// - `hidden_layers`: convolution, pooling and linear layers, in the configured order
/// - `batch_norm_layers`: optional batch normalization after each convolution and linear layer
/// - `dropout`: optional dropout after each convolution and linear layer
/// - `output_layers`: one linear head per requested output dimension
pub struct Cnn {
    input_dim: i64,
    embeddings: ChannelEmbeddings,
    hidden_layers: Vec<HiddenLayer>,
    hidden_activations: OneOrMany<Activation>,
    batch_norm_layers: Vec<Option<BatchNorm>>,
    dropout: Option<Dropout>,
    output_layers: Vec<nn::Linear>,
    output_input_width: i64,
    output_activations: Vec<Activation>,
    y_range: Option<(f64, f64)>,
}

impl Cnn {
    /// Build a new `Cnn`
    ///
    /// The configuration is validated before any variable is created in the variable store.
    /// Parameters are then initialised with the configured `Initialiser`, drawing from a random
    /// generator seeded with `config.random_seed` and owned by this call.
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the network
    /// * `config` - `CnnConfig` object defining the network architecture
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nn_builder::cnn::{Cnn, CnnConfig, LayerSpec};
    /// use tch::{nn, Device};
    ///
    /// let device = Device::Cpu;
    /// let vs = nn::VarStore::new(device);
    /// let config = CnnConfig {
    ///     input_dim: 3,
    ///     ..CnnConfig::new(
    ///         vec![
    ///             LayerSpec::conv(16, 3, 1, 1),
    ///             LayerSpec::max_pool(2, 2, 0),
    ///             LayerSpec::adaptive_avg_pool(4, 4),
    ///         ],
    ///         10.into(),
    ///     )
    /// };
    /// let cnn = Cnn::new(&vs.root() / "cnn", &config).unwrap();
    /// ```
    pub fn new<'p, P>(p: P, config: &CnnConfig) -> Result<Cnn, NnBuilderError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        config.validate()?;
        let p = p.borrow();

        let embeddings = ChannelEmbeddings::new(p / "embedding_layers", config);
        let hidden_layers = build_hidden_layers(p / "hidden_layers", config)?;
        let output_layers = build_output_layers(p / "output_layers", &hidden_layers, config)?;
        let output_input_width = output_input_width(&hidden_layers, config)?;

        let batch_norm_layers: Vec<Option<BatchNorm>> = if config.batch_norm {
            hidden_layers
                .iter()
                .enumerate()
                .map(|(layer_index, layer)| {
                    let num_features = layer.num_output_features()?;
                    let batch_norm_path = &(p / "batch_norm_layers") / layer_index;
                    Some(if layer.is_linear() {
                        nn::batch_norm1d(batch_norm_path, num_features, BatchNormConfig::default())
                    } else {
                        nn::batch_norm2d(batch_norm_path, num_features, BatchNormConfig::default())
                    })
                })
                .collect()
        } else {
            hidden_layers.iter().map(|_| None).collect()
        };

        let dropout = if config.dropout > 0.0 {
            Some(Dropout::new(config.dropout))
        } else {
            None
        };

        let output_activations: Vec<Activation> = (0..output_layers.len())
            .map(|head_index| config.output_activation_for(head_index))
            .collect();

        let mut cnn = Cnn {
            input_dim: config.input_dim,
            embeddings,
            hidden_layers,
            hidden_activations: config.hidden_activations.clone(),
            batch_norm_layers,
            dropout,
            output_layers,
            output_input_width,
            output_activations,
            y_range: config.y_range,
        };

        let mut rng = StdRng::seed_from_u64(config.random_seed);
        cnn.initialise_all_parameters(config, &mut rng)?;

        log::info!(
            "built CNN with {} hidden layers and {} output heads",
            cnn.hidden_layers.len(),
            cnn.output_layers.len()
        );
        if config.print_model_summary {
            println!("{}", cnn);
        }
        Ok(cnn)
    }

    /// Applies the configured initialiser to the embeddings, the weight-bearing hidden layers
    /// and the output heads, in that order. Each layer's weight is drawn before its bias.
    /// Pooling layers hold no parameters.
    fn initialise_all_parameters(
        &mut self,
        config: &CnnConfig,
        rng: &mut StdRng,
    ) -> Result<(), NnBuilderError> {
        let initialiser = config.initialiser;
        for ws in self.embeddings.weights_mut() {
            initialiser.initialise(ws, rng)?;
        }
        let layer_parameters = self
            .hidden_layers
            .iter_mut()
            .filter_map(HiddenLayer::parameters_mut)
            .chain(
                self.output_layers
                    .iter_mut()
                    .map(|output_layer| (&mut output_layer.ws, Some(&mut output_layer.bs))),
            );
        for (ws, bs) in layer_parameters {
            initialiser.initialise(ws, rng)?;
            if let Some(bs) = bs {
                let (fan_in, _) = fans(&ws.size())?;
                initialiser.initialise_bias(bs, fan_in, rng)?;
            }
        }
        Ok(())
    }

    pub fn embeddings(&self) -> &ChannelEmbeddings {
        &self.embeddings
    }

    pub fn hidden_layers(&self) -> &[HiddenLayer] {
        &self.hidden_layers
    }

    pub fn output_layers(&self) -> &[nn::Linear] {
        &self.output_layers
    }

    pub fn output_activations(&self) -> &[Activation] {
        &self.output_activations
    }

    pub fn y_range(&self) -> Option<(f64, f64)> {
        self.y_range
    }

    /// Flattened feature width expected by every output head
    pub fn output_input_width(&self) -> i64 {
        self.output_input_width
    }

    pub fn has_batch_norm(&self) -> bool {
        self.batch_norm_layers.iter().any(Option::is_some)
    }

    fn check_input(&self, input: &Tensor) -> Result<(), NnBuilderError> {
        let size = input.size();
        let expected_dims = if self.hidden_layers.first().map_or(false, HiddenLayer::is_linear) {
            2
        } else {
            4
        };
        if size.len() != expected_dims || size[1] != self.input_dim {
            return Err(NnBuilderError::ShapeError(format!(
                "input must be of shape {} with {} channels, got {:?}",
                if expected_dims == 4 {
                    "(batch, channels, height, width)"
                } else {
                    "(batch, features)"
                },
                self.input_dim,
                size
            )));
        }
        Ok(())
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    ///
    /// * `input` - input tensor of shape (*batch size*, *input_dim*, *height*, *width*), or
    ///   (*batch size*, *input_dim*) when the first hidden layer is linear. Embedded channels
    ///   hold category indices.
    /// * `train` - boolean flag to turn on/off the dropout layers and batch statistics updates.
    ///   Should be set to false for inference.
    ///
    /// # Returns
    ///
    /// * `Vec<Tensor>` with one tensor of shape (*batch size*, *output_dim*) per output head,
    ///   after the head activation and the optional output range restriction
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use nn_builder::cnn::{Cnn, CnnConfig, LayerSpec};
    /// # use tch::{nn, no_grad, Device, Kind, Tensor};
    /// # let vs = nn::VarStore::new(Device::Cpu);
    /// # let config = CnnConfig::new(vec![LayerSpec::conv(1, 3, 1, 1), LayerSpec::adaptive_avg_pool(4, 4)], 10.into());
    /// # let cnn = Cnn::new(vs.root(), &config).unwrap();
    /// let input = Tensor::rand(&[8, 1, 28, 28], (Kind::Float, Device::Cpu));
    /// let head_outputs = no_grad(|| cnn.forward_t(&input, false)).unwrap();
    /// ```
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Result<Vec<Tensor>, NnBuilderError> {
        self.check_input(input)?;
        let mut hidden_state = self.embeddings.forward(input)?;

        for (layer_index, (layer, batch_norm)) in self
            .hidden_layers
            .iter()
            .zip(self.batch_norm_layers.iter())
            .enumerate()
        {
            hidden_state = layer.forward(&hidden_state)?;
            if !layer.has_weights() {
                continue;
            }
            let activation = self
                .hidden_activations
                .get(layer_index)
                .copied()
                .unwrap_or(Activation::relu);
            hidden_state = (activation.get_function())(&hidden_state);
            if let Some(batch_norm) = batch_norm {
                let size = hidden_state.size();
                let values_per_channel = size[0] * size[2..].iter().product::<i64>();
                if train && values_per_channel < 2 {
                    return Err(NnBuilderError::ShapeError(format!(
                        "batch normalization after hidden layer {} needs more than one value per channel in training, got input of shape {:?}",
                        layer_index, size
                    )));
                }
                hidden_state = hidden_state.apply_t(batch_norm, train);
            }
            if let Some(dropout) = &self.dropout {
                hidden_state = hidden_state.apply_t(dropout, train);
            }
        }

        let hidden_state = flatten(&hidden_state);
        let width = hidden_state.size()[1];
        if width != self.output_input_width {
            return Err(NnBuilderError::ShapeError(format!(
                "output layers expect {} input features but the last hidden layer produced {}",
                self.output_input_width, width
            )));
        }

        Ok(self
            .output_layers
            .iter()
            .zip(self.output_activations.iter())
            .map(|(output_layer, activation)| {
                let output = (activation.get_function())(&hidden_state.apply(output_layer));
                match self.y_range {
                    Some((lower, upper)) => output.sigmoid() * (upper - lower) + lower,
                    None => output,
                }
            })
            .collect())
    }

    /// Forward pass returning the output heads concatenated along dimension 1
    pub fn forward_concat_t(&self, input: &Tensor, train: bool) -> Result<Tensor, NnBuilderError> {
        let head_outputs = self.forward_t(input, train)?;
        Ok(Tensor::cat(&head_outputs, 1))
    }
}

impl fmt::Display for Cnn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cnn(")?;
        if !self.embeddings.is_empty() {
            writeln!(f, "  (embedding_layers): [")?;
            write!(f, "{}", self.embeddings)?;
            writeln!(f, "  ]")?;
        }
        writeln!(f, "  (hidden_layers): [")?;
        for (layer_index, (layer, batch_norm)) in self
            .hidden_layers
            .iter()
            .zip(self.batch_norm_layers.iter())
            .enumerate()
        {
            write!(f, "    ({}): {}", layer_index, layer)?;
            if layer.has_weights() {
                if let Some(activation) = self.hidden_activations.get(layer_index) {
                    write!(f, " -> {}", activation)?;
                }
                if batch_norm.is_some() {
                    write!(f, " -> BatchNorm")?;
                }
                if let Some(dropout) = &self.dropout {
                    write!(f, " -> {}", dropout)?;
                }
            }
            writeln!(f)?;
        }
        writeln!(f, "  ]")?;
        writeln!(f, "  (output_layers): [")?;
        for (head_index, (output_layer, activation)) in self
            .output_layers
            .iter()
            .zip(self.output_activations.iter())
            .enumerate()
        {
            let size = output_layer.ws.size();
            writeln!(
                f,
                "    ({}): Linear(in_features={}, out_features={}) -> {}",
                head_index, size[1], size[0], activation
            )?;
        }
        writeln!(f, "  ]")?;
        if let Some((lower, upper)) = self.y_range {
            writeln!(f, "  (y_range): ({}, {})", lower, upper)?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Cnn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
