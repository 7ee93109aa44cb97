use crate::cnn::config::CnnConfig;
use crate::NnBuilderError;
use std::borrow::Borrow;
use std::fmt;
use tch::nn::{embedding, EmbeddingConfig};
use tch::{nn, Kind, Tensor};

#[derive(Debug)]
/// # Embeddings of categorical input channels
/// Each embedded channel holds category indices at every position. It is replaced by
/// `embedding_dim` channels holding the embedding of that category; the embedded channels are
/// appended after the channels passed through unchanged.
pub struct ChannelEmbeddings {
    embedded_columns: Vec<i64>,
    passthrough_columns: Vec<i64>,
    embedding_dimensions: Vec<(i64, i64)>,
    embeddings: Vec<nn::Embedding>,
}

impl ChannelEmbeddings {
    pub fn new<'p, P>(p: P, config: &CnnConfig) -> ChannelEmbeddings
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let embedded_columns = config.columns_of_data_to_be_embedded.clone();
        let passthrough_columns = (0..config.input_dim)
            .filter(|column| !embedded_columns.contains(column))
            .collect();
        let embeddings = config
            .embedding_dimensions
            .iter()
            .enumerate()
            .map(|(index, &(num_categories, embedding_dim))| {
                embedding(
                    p / index,
                    num_categories,
                    embedding_dim,
                    EmbeddingConfig::default(),
                )
            })
            .collect();
        ChannelEmbeddings {
            embedded_columns,
            passthrough_columns,
            embedding_dimensions: config.embedding_dimensions.clone(),
            embeddings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn weights_mut(&mut self) -> impl Iterator<Item = &mut Tensor> {
        self.embeddings.iter_mut().map(|embedding| &mut embedding.ws)
    }

    pub fn weights(&self) -> impl Iterator<Item = &Tensor> {
        self.embeddings.iter().map(|embedding| &embedding.ws)
    }

    /// Replaces the embedded channels of a `(batch, channels, height, width)` input by their
    /// embeddings.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, NnBuilderError> {
        if self.is_empty() {
            return Ok(input.shallow_clone());
        }
        let mut channels = Vec::with_capacity(self.embeddings.len() + 1);
        if !self.passthrough_columns.is_empty() {
            let index = Tensor::of_slice(&self.passthrough_columns).to_device(input.device());
            channels.push(input.index_select(1, &index));
        }
        for (column, (embedding, &(num_categories, _))) in self
            .embedded_columns
            .iter()
            .zip(self.embeddings.iter().zip(self.embedding_dimensions.iter()))
        {
            let categories = input.select(1, *column).to_kind(Kind::Int64);
            let max_category = categories.max().int64_value(&[]);
            let min_category = categories.min().int64_value(&[]);
            if min_category < 0 || max_category >= num_categories {
                return Err(NnBuilderError::ShapeError(format!(
                    "channel {} holds categories in [{}, {}], embedding expects [0, {})",
                    column, min_category, max_category, num_categories
                )));
            }
            channels.push(categories.apply(embedding).permute(&[0, 3, 1, 2]));
        }
        Ok(Tensor::cat(&channels, 1))
    }
}

impl fmt::Display for ChannelEmbeddings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (column, (num_categories, embedding_dim))) in self
            .embedded_columns
            .iter()
            .zip(self.embedding_dimensions.iter())
            .enumerate()
        {
            writeln!(
                f,
                "    ({}): Embedding({}, {}) on channel {}",
                index, num_categories, embedding_dim, column
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnn::LayerSpec;
    use tch::Device;

    fn embedding_config() -> CnnConfig {
        CnnConfig {
            input_dim: 3,
            columns_of_data_to_be_embedded: vec![1],
            embedding_dimensions: vec![(5, 4)],
            ..CnnConfig::new(
                vec![LayerSpec::conv(8, 3, 1, 1), LayerSpec::adaptive_avg_pool(1, 1)],
                1.into(),
            )
        }
    }

    #[test]
    fn embedded_channels_are_appended() {
        let vs = nn::VarStore::new(Device::Cpu);
        let embeddings = ChannelEmbeddings::new(vs.root(), &embedding_config());
        let continuous = Tensor::rand(&[2, 1, 6, 6], (Kind::Float, Device::Cpu));
        let categories = Tensor::randint(5, &[2, 1, 6, 6], (Kind::Float, Device::Cpu));
        let input = Tensor::cat(&[&continuous, &categories, &continuous], 1);

        let output = embeddings.forward(&input).unwrap();

        assert_eq!(embeddings.len(), 1);
        let weight_sizes: Vec<Vec<i64>> = embeddings.weights().map(Tensor::size).collect();
        assert_eq!(weight_sizes, vec![vec![5, 4]]);
        assert_eq!(output.size(), vec![2, 6, 6, 6]);
    }

    #[test]
    fn out_of_range_categories_are_rejected() {
        let vs = nn::VarStore::new(Device::Cpu);
        let embeddings = ChannelEmbeddings::new(vs.root(), &embedding_config());
        let input = Tensor::ones(&[2, 3, 4, 4], (Kind::Float, Device::Cpu)) * 7.0;

        assert!(matches!(
            embeddings.forward(&input),
            Err(NnBuilderError::ShapeError(_))
        ));
    }
}
