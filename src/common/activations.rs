// Copyright 2019 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::common::config::OneOrMany;
use crate::NnBuilderError;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use tch::{Kind, Tensor};

const SELU_ALPHA: f64 = 1.673_263_242_354_377_3;
const SELU_SCALE: f64 = 1.050_700_987_355_480_5;
const LEAKY_RELU_SLOPE: f64 = 0.01;

pub fn _gelu(x: &Tensor) -> Tensor {
    x * 0.5 * (1.0 + (x / ((2.0_f64).sqrt())).erf())
}

pub fn _gelu_new(x: &Tensor) -> Tensor {
    x * 0.5 * (((x.pow(3.0f64) * 0.044715 + x) * ((2f64 / PI).sqrt())).tanh() + 1)
}

pub fn _relu(x: &Tensor) -> Tensor {
    x.relu()
}

pub fn _swish(x: &Tensor) -> Tensor {
    x * x.sigmoid()
}

pub fn _mish(x: &Tensor) -> Tensor {
    x * (x.softplus().tanh())
}

pub fn _sigmoid(x: &Tensor) -> Tensor {
    x.sigmoid()
}

pub fn _tanh(x: &Tensor) -> Tensor {
    x.tanh()
}

pub fn _softmax(x: &Tensor) -> Tensor {
    x.softmax(1, Kind::Float)
}

pub fn _log_softmax(x: &Tensor) -> Tensor {
    x.log_softmax(1, Kind::Float)
}

pub fn _softplus(x: &Tensor) -> Tensor {
    x.softplus()
}

pub fn _elu(x: &Tensor) -> Tensor {
    x.relu() + (x.exp() - 1.0).clamp_max(0.0)
}

pub fn _selu(x: &Tensor) -> Tensor {
    (x.relu() + (x.exp() - 1.0).clamp_max(0.0) * SELU_ALPHA) * SELU_SCALE
}

pub fn _leaky_relu(x: &Tensor) -> Tensor {
    x.relu() + x.clamp_max(0.0) * LEAKY_RELU_SLOPE
}

pub fn _relu6(x: &Tensor) -> Tensor {
    x.clamp(0.0, 6.0)
}

pub fn _hardtanh(x: &Tensor) -> Tensor {
    x.clamp(-1.0, 1.0)
}

pub fn _log_sigmoid(x: &Tensor) -> Tensor {
    x.log_sigmoid()
}

pub fn _softsign(x: &Tensor) -> Tensor {
    x / (x.abs() + 1.0)
}

pub fn _tanhshrink(x: &Tensor) -> Tensor {
    x - x.tanh()
}

pub fn _identity(x: &Tensor) -> Tensor {
    x.shallow_clone()
}

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
/// # Activation function applied to hidden layer or output head values
/// Names are matched case-insensitively when parsed from text.
pub enum Activation {
    /// Rectified Linear Unit
    relu,
    sigmoid,
    tanh,
    /// Softmax over the feature dimension (dim 1)
    softmax,
    /// Log-softmax over the feature dimension (dim 1)
    logsoftmax,
    softplus,
    /// Exponential Linear Unit, alpha = 1
    elu,
    /// Scaled Exponential Linear Unit ([Klambauer et al., 2017](https://arxiv.org/abs/1706.02515))
    selu,
    /// Leaky ReLU with a negative slope of 0.01
    leakyrelu,
    relu6,
    hardtanh,
    logsigmoid,
    softsign,
    tanhshrink,
    /// Gaussian Error Linear Unit ([Hendrycks et al., 2016,](https://arxiv.org/abs/1606.08415))
    gelu,
    /// Gaussian Error Linear Unit, tanh approximation
    gelu_new,
    /// Swish ([Ramachandran, 2017](https://arxiv.org/abs/1710.05941))
    swish,
    /// Mish ([Misra, 2019](https://arxiv.org/abs/1908.08681))
    mish,
    /// Identity, values are passed through unchanged
    none,
}

impl Activation {
    pub const ALL: [Activation; 19] = [
        Activation::relu,
        Activation::sigmoid,
        Activation::tanh,
        Activation::softmax,
        Activation::logsoftmax,
        Activation::softplus,
        Activation::elu,
        Activation::selu,
        Activation::leakyrelu,
        Activation::relu6,
        Activation::hardtanh,
        Activation::logsigmoid,
        Activation::softsign,
        Activation::tanhshrink,
        Activation::gelu,
        Activation::gelu_new,
        Activation::swish,
        Activation::mish,
        Activation::none,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Activation::relu => "relu",
            Activation::sigmoid => "sigmoid",
            Activation::tanh => "tanh",
            Activation::softmax => "softmax",
            Activation::logsoftmax => "logsoftmax",
            Activation::softplus => "softplus",
            Activation::elu => "elu",
            Activation::selu => "selu",
            Activation::leakyrelu => "leakyrelu",
            Activation::relu6 => "relu6",
            Activation::hardtanh => "hardtanh",
            Activation::logsigmoid => "logsigmoid",
            Activation::softsign => "softsign",
            Activation::tanhshrink => "tanhshrink",
            Activation::gelu => "gelu",
            Activation::gelu_new => "gelu_new",
            Activation::swish => "swish",
            Activation::mish => "mish",
            Activation::none => "none",
        }
    }

    pub fn get_function(&self) -> fn(&Tensor) -> Tensor {
        match self {
            Activation::relu => _relu,
            Activation::sigmoid => _sigmoid,
            Activation::tanh => _tanh,
            Activation::softmax => _softmax,
            Activation::logsoftmax => _log_softmax,
            Activation::softplus => _softplus,
            Activation::elu => _elu,
            Activation::selu => _selu,
            Activation::leakyrelu => _leaky_relu,
            Activation::relu6 => _relu6,
            Activation::hardtanh => _hardtanh,
            Activation::logsigmoid => _log_sigmoid,
            Activation::softsign => _softsign,
            Activation::tanhshrink => _tanhshrink,
            Activation::gelu => _gelu,
            Activation::gelu_new => _gelu_new,
            Activation::swish => _swish,
            Activation::mish => _mish,
            Activation::none => _identity,
        }
    }
}

impl FromStr for Activation {
    type Err = NnBuilderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowercase = s.to_lowercase();
        Activation::ALL
            .iter()
            .find(|activation| activation.name() == lowercase)
            .copied()
            .ok_or_else(|| {
                let valid_names: Vec<&str> = Activation::ALL.iter().map(|a| a.name()).collect();
                NnBuilderError::InvalidConfigurationError(format!(
                    "Activation {} not valid, use one of {:?}",
                    s, valid_names
                ))
            })
    }
}

impl TryFrom<String> for Activation {
    type Error = NnBuilderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Activation> for OneOrMany<Activation> {
    fn from(value: Activation) -> Self {
        OneOrMany::One(value)
    }
}

impl From<Vec<Activation>> for OneOrMany<Activation> {
    fn from(values: Vec<Activation>) -> Self {
        OneOrMany::Many(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("ReLU".parse::<Activation>().unwrap(), Activation::relu);
        assert_eq!(
            "LogSoftmax".parse::<Activation>().unwrap(),
            Activation::logsoftmax
        );
        assert_eq!("None".parse::<Activation>().unwrap(), Activation::none);
    }

    #[test]
    fn unknown_name_lists_valid_activations() {
        let error = "swishy".parse::<Activation>().unwrap_err();
        let message = error.to_string();
        assert!(message.contains("swishy"));
        assert!(message.contains("leakyrelu"));
    }

    #[test]
    fn deserializes_from_json_strings() {
        let activations: OneOrMany<Activation> =
            serde_json::from_str(r#"["Sigmoid", "softmax"]"#).unwrap();
        assert_eq!(
            activations,
            OneOrMany::Many(vec![Activation::sigmoid, Activation::softmax])
        );
        assert!(serde_json::from_str::<Activation>(r#""step""#).is_err());
    }

    #[test]
    fn every_name_round_trips() {
        for activation in Activation::ALL.iter() {
            assert_eq!(activation.name().parse::<Activation>().unwrap(), *activation);
        }
    }

    #[test]
    fn log_sigmoid_is_finite_for_large_negative_inputs() {
        let input = Tensor::of_slice(&[-200f32, 0.0, 200.0]);
        let output = (Activation::logsigmoid.get_function())(&input);
        let values: Vec<f32> = Vec::<f32>::from(&output);

        assert!(values.iter().all(|value| value.is_finite()));
        assert!((values[0] + 200.0).abs() < 1e-3);
        assert!((values[1] + 2f32.ln()).abs() < 1e-5);
        assert!(values[2].abs() < 1e-5);
    }
}
