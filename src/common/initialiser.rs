use crate::NnBuilderError;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;
use tch::{no_grad, Tensor};

const ORTHOGONAL_EPS: f64 = 1e-10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
/// # Parameter initialisation scheme
/// Applied to the weight of every embedding, convolution and linear layer of a network.
/// Biases of convolution and linear layers are drawn from U(-1/sqrt(fan_in), 1/sqrt(fan_in))
/// with the same generator, unless the scheme is `Initialiser::Default`.
///
/// Values are drawn from an explicitly passed random generator, so that two networks built
/// from independent generators never share random state.
pub enum Initialiser {
    /// Keep the `tch` built-in initialisation
    Default,
    /// U(0, 1)
    Uniform,
    /// N(0, 1)
    Normal,
    /// Identity matrix, 2-dimensional weights only
    Eye,
    /// U(-b, b) with b = sqrt(6 / (fan_in + fan_out)) ([Glorot et al., 2010](http://proceedings.mlr.press/v9/glorot10a.html))
    XavierUniform,
    /// N(0, s) with s = sqrt(2 / (fan_in + fan_out))
    XavierNormal,
    /// U(-b, b) with b = sqrt(6 / fan_in) ([He et al., 2015](https://arxiv.org/abs/1502.01852))
    KaimingUniform,
    /// N(0, s) with s = sqrt(2 / fan_in)
    KaimingNormal,
    /// (Semi-)orthogonal matrix ([Saxe et al., 2013](https://arxiv.org/abs/1312.6120))
    Orthogonal,
}

impl Default for Initialiser {
    fn default() -> Self {
        Initialiser::Default
    }
}

impl Initialiser {
    const NAMES: [(&'static str, Initialiser); 12] = [
        ("default", Initialiser::Default),
        ("uniform", Initialiser::Uniform),
        ("normal", Initialiser::Normal),
        ("eye", Initialiser::Eye),
        ("xavier_uniform", Initialiser::XavierUniform),
        ("xavier", Initialiser::XavierUniform),
        ("xavier_normal", Initialiser::XavierNormal),
        ("kaiming_uniform", Initialiser::KaimingUniform),
        ("kaiming", Initialiser::KaimingUniform),
        ("kaiming_normal", Initialiser::KaimingNormal),
        ("he", Initialiser::KaimingNormal),
        ("orthogonal", Initialiser::Orthogonal),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Initialiser::Default => "default",
            Initialiser::Uniform => "uniform",
            Initialiser::Normal => "normal",
            Initialiser::Eye => "eye",
            Initialiser::XavierUniform => "xavier_uniform",
            Initialiser::XavierNormal => "xavier_normal",
            Initialiser::KaimingUniform => "kaiming_uniform",
            Initialiser::KaimingNormal => "kaiming_normal",
            Initialiser::Orthogonal => "orthogonal",
        }
    }

    /// Whether the scheme can initialise a weight with `num_dims` dimensions.
    pub fn supports_dims(&self, num_dims: usize) -> bool {
        match self {
            Initialiser::Default | Initialiser::Uniform | Initialiser::Normal => true,
            Initialiser::Eye => num_dims == 2,
            _ => num_dims >= 2,
        }
    }

    /// Samples the values of a weight of the given shape, in row-major order.
    ///
    /// # Arguments
    ///
    /// * `shape` - shape of the weight, output dimension first
    /// * `rng` - random generator the values are drawn from
    ///
    /// # Returns
    ///
    /// * `None` for `Initialiser::Default`, the sampled values otherwise
    pub fn sample<R: Rng + ?Sized>(
        &self,
        shape: &[i64],
        rng: &mut R,
    ) -> Result<Option<Vec<f32>>, NnBuilderError> {
        if !self.supports_dims(shape.len()) {
            return Err(NnBuilderError::InitialisationError(format!(
                "{} initialiser does not support weights of shape {:?}",
                self, shape
            )));
        }
        let num_elements = shape.iter().product::<i64>() as usize;
        let values = match self {
            Initialiser::Default => return Ok(None),
            Initialiser::Uniform => sample_from(Uniform::new(0f32, 1f32)?, num_elements, rng),
            Initialiser::Normal => sample_from(Normal::new(0f32, 1f32)?, num_elements, rng),
            Initialiser::Eye => eye(shape[0] as usize, shape[1] as usize),
            Initialiser::XavierUniform => {
                let (fan_in, fan_out) = fans(shape)?;
                let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
                sample_from(Uniform::new(-bound, bound)?, num_elements, rng)
            }
            Initialiser::XavierNormal => {
                let (fan_in, fan_out) = fans(shape)?;
                let std_dev = (2.0 / (fan_in + fan_out) as f32).sqrt();
                sample_from(Normal::new(0f32, std_dev)?, num_elements, rng)
            }
            Initialiser::KaimingUniform => {
                let (fan_in, _) = fans(shape)?;
                let bound = (6.0 / fan_in as f32).sqrt();
                sample_from(Uniform::new(-bound, bound)?, num_elements, rng)
            }
            Initialiser::KaimingNormal => {
                let (fan_in, _) = fans(shape)?;
                let std_dev = (2.0 / fan_in as f32).sqrt();
                sample_from(Normal::new(0f32, std_dev)?, num_elements, rng)
            }
            Initialiser::Orthogonal => {
                let rows = shape[0] as usize;
                orthogonal(rows, num_elements / rows, rng)?
            }
        };
        Ok(Some(values))
    }

    /// Overwrites `ws` in place with values sampled from `rng`.
    /// `Initialiser::Default` leaves the tensor untouched.
    pub fn initialise<R: Rng + ?Sized>(
        &self,
        ws: &mut Tensor,
        rng: &mut R,
    ) -> Result<(), NnBuilderError> {
        let shape = ws.size();
        if let Some(values) = self.sample(&shape, rng)? {
            copy_values(ws, &values);
        }
        Ok(())
    }

    /// Overwrites the bias `bs` of a layer whose weight has `fan_in` inputs per output, with
    /// values drawn from U(-1/sqrt(fan_in), 1/sqrt(fan_in)).
    /// `Initialiser::Default` leaves the tensor untouched.
    pub fn initialise_bias<R: Rng + ?Sized>(
        &self,
        bs: &mut Tensor,
        fan_in: usize,
        rng: &mut R,
    ) -> Result<(), NnBuilderError> {
        if *self == Initialiser::Default {
            return Ok(());
        }
        if fan_in == 0 {
            return Err(NnBuilderError::InitialisationError(
                "bias of a layer without inputs can not be initialised".to_string(),
            ));
        }
        let bound = 1.0 / (fan_in as f32).sqrt();
        let values = sample_from(Uniform::new(-bound, bound)?, bs.numel(), rng);
        copy_values(bs, &values);
        Ok(())
    }
}

fn copy_values(target: &mut Tensor, values: &[f32]) {
    let values = Tensor::of_slice(values)
        .view(target.size().as_slice())
        .to_kind(target.kind())
        .to_device(target.device());
    no_grad(|| target.copy_(&values));
}

/// Returns `(fan_in, fan_out)` for a weight of the given shape.
/// Dimensions after the first two form the receptive field of a convolution kernel.
pub fn fans(shape: &[i64]) -> Result<(usize, usize), NnBuilderError> {
    if shape.len() < 2 {
        return Err(NnBuilderError::InitialisationError(format!(
            "fan in and fan out can not be computed for a weight of shape {:?}",
            shape
        )));
    }
    let receptive_field = shape[2..].iter().product::<i64>() as usize;
    Ok((
        shape[1] as usize * receptive_field,
        shape[0] as usize * receptive_field,
    ))
}

fn sample_from<T, D: Distribution<T>, R: Rng + ?Sized>(
    distribution: D,
    n: usize,
    rng: &mut R,
) -> Vec<T> {
    (0..n).map(|_| distribution.sample(rng)).collect()
}

fn eye(rows: usize, cols: usize) -> Vec<f32> {
    let mut values = vec![0f32; rows * cols];
    for i in 0..rows.min(cols) {
        values[i * cols + i] = 1.0;
    }
    values
}

/// Modified Gram-Schmidt on a normal sample. The smaller of the two dimensions holds the
/// orthonormal vectors: rows when `rows <= cols`, columns otherwise.
fn orthogonal<R: Rng + ?Sized>(
    rows: usize,
    cols: usize,
    rng: &mut R,
) -> Result<Vec<f32>, NnBuilderError> {
    let normal = Normal::new(0f64, 1f64)?;
    let (num_vectors, length) = if rows <= cols {
        (rows, cols)
    } else {
        (cols, rows)
    };
    let mut vectors: Vec<Vec<f64>> = Vec::with_capacity(num_vectors);
    for _ in 0..num_vectors {
        vectors.push(sample_from(normal, length, rng));
    }

    for i in 0..num_vectors {
        for j in 0..i {
            let dot: f64 = vectors[i]
                .iter()
                .zip(vectors[j].iter())
                .map(|(a, b)| a * b)
                .sum();
            let (done, current) = vectors.split_at_mut(i);
            for (value, basis) in current[0].iter_mut().zip(done[j].iter()) {
                *value -= dot * basis;
            }
        }
        let norm = vectors[i].iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm < ORTHOGONAL_EPS {
            return Err(NnBuilderError::InitialisationError(
                "orthogonal initialisation sampled a degenerate matrix".to_string(),
            ));
        }
        vectors[i].iter_mut().for_each(|v| *v /= norm);
    }

    let mut values = vec![0f32; rows * cols];
    for row in 0..rows {
        for col in 0..cols {
            values[row * cols + col] = if rows <= cols {
                vectors[row][col]
            } else {
                vectors[col][row]
            } as f32;
        }
    }
    Ok(values)
}

impl FromStr for Initialiser {
    type Err = NnBuilderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowercase = s.to_lowercase();
        Initialiser::NAMES
            .iter()
            .find(|(name, _)| *name == lowercase)
            .map(|(_, initialiser)| *initialiser)
            .ok_or_else(|| {
                let valid_names: Vec<&str> =
                    Initialiser::NAMES.iter().map(|(name, _)| *name).collect();
                NnBuilderError::InvalidConfigurationError(format!(
                    "Initialiser {} not valid, use one of {:?}",
                    s, valid_names
                ))
            })
    }
}

impl TryFrom<String> for Initialiser {
    type Error = NnBuilderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Initialiser> for String {
    fn from(initialiser: Initialiser) -> Self {
        initialiser.name().to_string()
    }
}

impl fmt::Display for Initialiser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded_rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn parses_aliases() {
        assert_eq!(
            "xavier".parse::<Initialiser>().unwrap(),
            Initialiser::XavierUniform
        );
        assert_eq!(
            "He".parse::<Initialiser>().unwrap(),
            Initialiser::KaimingNormal
        );
        assert_eq!(
            "kaiming".parse::<Initialiser>().unwrap(),
            Initialiser::KaimingUniform
        );
        assert!("glorot".parse::<Initialiser>().is_err());
    }

    #[test]
    fn fans_include_receptive_field() {
        assert_eq!(fans(&[16, 3, 5, 5]).unwrap(), (75, 400));
        assert_eq!(fans(&[10, 20]).unwrap(), (20, 10));
        assert!(fans(&[10]).is_err());
    }

    #[test]
    fn default_samples_nothing() {
        let mut rng = seeded_rng(0);
        assert!(Initialiser::Default
            .sample(&[4, 4], &mut rng)
            .unwrap()
            .is_none());
    }

    #[test]
    fn same_seed_same_values() {
        let first = Initialiser::XavierNormal
            .sample(&[8, 4, 3, 3], &mut seeded_rng(7))
            .unwrap()
            .unwrap();
        let second = Initialiser::XavierNormal
            .sample(&[8, 4, 3, 3], &mut seeded_rng(7))
            .unwrap()
            .unwrap();
        let other = Initialiser::XavierNormal
            .sample(&[8, 4, 3, 3], &mut seeded_rng(8))
            .unwrap()
            .unwrap();

        assert_eq!(first.len(), 8 * 4 * 3 * 3);
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn kaiming_uniform_within_bound() {
        let values = Initialiser::KaimingUniform
            .sample(&[32, 24], &mut seeded_rng(1))
            .unwrap()
            .unwrap();
        let bound = (6.0f32 / 24.0).sqrt();
        assert!(values.iter().all(|v| v.abs() <= bound));
    }

    #[test]
    fn eye_only_for_matrices() {
        let values = Initialiser::Eye
            .sample(&[2, 3], &mut seeded_rng(0))
            .unwrap()
            .unwrap();
        assert_eq!(values, vec![1., 0., 0., 0., 1., 0.]);
        assert!(Initialiser::Eye
            .sample(&[2, 3, 3, 3], &mut seeded_rng(0))
            .is_err());
    }

    #[test]
    fn orthogonal_rows_are_orthonormal() {
        let (rows, cols) = (4, 6);
        let values = Initialiser::Orthogonal
            .sample(&[rows as i64, cols as i64], &mut seeded_rng(3))
            .unwrap()
            .unwrap();
        for i in 0..rows {
            for j in 0..rows {
                let dot: f32 = (0..cols)
                    .map(|k| values[i * cols + k] * values[j * cols + k])
                    .sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn orthogonal_tall_matrix_has_orthonormal_columns() {
        let (rows, cols) = (6, 3);
        let values = Initialiser::Orthogonal
            .sample(&[rows as i64, cols as i64], &mut seeded_rng(4))
            .unwrap()
            .unwrap();
        for i in 0..cols {
            for j in 0..cols {
                let dot: f32 = (0..rows)
                    .map(|k| values[k * cols + i] * values[k * cols + j])
                    .sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn bias_is_seeded_and_bounded() {
        let mut first = Tensor::zeros(&[16], (tch::Kind::Float, tch::Device::Cpu));
        let mut second = Tensor::zeros(&[16], (tch::Kind::Float, tch::Device::Cpu));
        Initialiser::XavierUniform
            .initialise_bias(&mut first, 25, &mut seeded_rng(5))
            .unwrap();
        Initialiser::XavierUniform
            .initialise_bias(&mut second, 25, &mut seeded_rng(5))
            .unwrap();

        assert!(first.equal(&second));
        assert!(first.abs().max().double_value(&[]) <= 0.2 + 1e-6);
        assert!(first.abs().sum(tch::Kind::Float).double_value(&[]) > 0.0);

        let mut untouched = Tensor::zeros(&[16], (tch::Kind::Float, tch::Device::Cpu));
        Initialiser::Default
            .initialise_bias(&mut untouched, 25, &mut seeded_rng(5))
            .unwrap();
        assert_eq!(untouched.abs().sum(tch::Kind::Float).double_value(&[]), 0.0);
    }
}
