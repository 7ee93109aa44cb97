use crate::NnBuilderError;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::convert::TryFrom;
use std::fmt;

/// Tags accepted as first element of a layer specification
pub const VALID_LAYER_TYPES: [&str; 6] = [
    "conv",
    "maxpool",
    "avgpool",
    "adaptivemaxpool",
    "adaptiveavgpool",
    "linear",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<Value>")]
/// # Hidden layer specification
/// One entry of the hidden layer list of a `CnnConfig`. In JSON configurations each entry is
/// written as a list whose first element is the (case-insensitive) layer type:
/// - `["conv", channels, kernel_size, stride, padding]`
/// - `["maxpool", kernel_size, stride, padding]`
/// - `["avgpool", kernel_size, stride, padding]`
/// - `["adaptivemaxpool", output_height, output_width]`
/// - `["adaptiveavgpool", output_height, output_width]`
/// - `["linear", in_features, out_features]` or `["linear", out_features]`
pub enum LayerSpec {
    /// 2D convolution with square kernel, stride and padding
    Conv {
        channels: i64,
        kernel_size: i64,
        stride: i64,
        padding: i64,
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
        output_height: i64,
        output_width: i64,
    },
    AdaptiveAvgPool {
        output_height: i64,
        output_width: i64,
    },
    /// Fully connected layer. Without `in_features` the width is inferred from the preceding
    /// layer (network input, linear layer or adaptive pooling).
    Linear {
        in_features: Option<i64>,
        out_features: i64,
    },
}

impl LayerSpec {
    pub fn conv(channels: i64, kernel_size: i64, stride: i64, padding: i64) -> LayerSpec {
        LayerSpec::Conv {
            channels,
            kernel_size,
            stride,
            padding,
        }
    }

    pub fn max_pool(kernel_size: i64, stride: i64, padding: i64) -> LayerSpec {
        LayerSpec::MaxPool {
            kernel_size,
            stride,
            padding,
        }
    }

    pub fn avg_pool(kernel_size: i64, stride: i64, padding: i64) -> LayerSpec {
        LayerSpec::AvgPool {
            kernel_size,
            stride,
            padding,
        }
    }

    pub fn adaptive_max_pool(output_height: i64, output_width: i64) -> LayerSpec {
        LayerSpec::AdaptiveMaxPool {
            output_height,
            output_width,
        }
    }

    pub fn adaptive_avg_pool(output_height: i64, output_width: i64) -> LayerSpec {
        LayerSpec::AdaptiveAvgPool {
            output_height,
            output_width,
        }
    }

    pub fn linear(in_features: i64, out_features: i64) -> LayerSpec {
        LayerSpec::Linear {
            in_features: Some(in_features),
            out_features,
        }
    }

    pub fn linear_inferred(out_features: i64) -> LayerSpec {
        LayerSpec::Linear {
            in_features: None,
            out_features,
        }
    }

    /// Layer type tag, as used in list-form specifications
    pub fn type_name(&self) -> &'static str {
        match self {
            LayerSpec::Conv { .. } => "conv",
            LayerSpec::MaxPool { .. } => "maxpool",
            LayerSpec::AvgPool { .. } => "avgpool",
            LayerSpec::AdaptiveMaxPool { .. } => "adaptivemaxpool",
            LayerSpec::AdaptiveAvgPool { .. } => "adaptiveavgpool",
            LayerSpec::Linear { .. } => "linear",
        }
    }

    /// Whether the flattened output width of this layer is known without running the network
    pub fn defines_output_width(&self) -> bool {
        matches!(
            self,
            LayerSpec::Linear { .. }
                | LayerSpec::AdaptiveMaxPool { .. }
                | LayerSpec::AdaptiveAvgPool { .. }
        )
    }

    /// Checks the value ranges of the layer fields.
    pub fn validate(&self) -> Result<(), NnBuilderError> {
        let valid = match *self {
            LayerSpec::Conv {
                channels,
                kernel_size,
                stride,
                padding,
            } => channels > 0 && kernel_size > 0 && stride > 0 && padding >= 0,
            LayerSpec::MaxPool {
                kernel_size,
                stride,
                padding,
            }
            | LayerSpec::AvgPool {
                kernel_size,
                stride,
                padding,
            } => kernel_size > 0 && stride > 0 && padding >= 0 && padding <= kernel_size / 2,
            LayerSpec::AdaptiveMaxPool {
                output_height,
                output_width,
            }
            | LayerSpec::AdaptiveAvgPool {
                output_height,
                output_width,
            } => output_height > 0 && output_width > 0,
            LayerSpec::Linear {
                in_features,
                out_features,
            } => in_features.map_or(true, |value| value > 0) && out_features > 0,
        };
        if valid {
            Ok(())
        } else {
            Err(NnBuilderError::InvalidLayerError(format!(
                "{} is invalid: {}",
                self,
                self.expected_form()
            )))
        }
    }

    fn expected_form(&self) -> &'static str {
        form_for_type(self.type_name())
    }
}

fn form_for_type(type_name: &str) -> &'static str {
    match type_name {
        "conv" => "conv layer must be of form ['conv', channels, kernel_size, stride, padding] where channels, kernel_size and stride are positive integers and padding is a non-negative integer",
        "maxpool" => "maxpool layer must be of form ['maxpool', kernel_size, stride, padding] where kernel_size and stride are positive integers and padding is a non-negative integer at most half of kernel_size",
        "avgpool" => "avgpool layer must be of form ['avgpool', kernel_size, stride, padding] where kernel_size and stride are positive integers and padding is a non-negative integer at most half of kernel_size",
        "adaptivemaxpool" => "adaptivemaxpool layer must be of form ['adaptivemaxpool', output_height, output_width] where both are positive integers",
        "adaptiveavgpool" => "adaptiveavgpool layer must be of form ['adaptiveavgpool', output_height, output_width] where both are positive integers",
        _ => "linear layer must be of form ['linear', in_features, out_features] or ['linear', out_features] where the features are positive integers",
    }
}

fn integer_fields(type_name: &str, values: &[Value]) -> Result<Vec<i64>, NnBuilderError> {
    values
        .iter()
        .map(|value| {
            value.as_i64().ok_or_else(|| {
                NnBuilderError::InvalidLayerError(format!(
                    "{} is not an integer, {}",
                    value,
                    form_for_type(type_name)
                ))
            })
        })
        .collect()
}

impl TryFrom<&[Value]> for LayerSpec {
    type Error = NnBuilderError;

    fn try_from(values: &[Value]) -> Result<Self, Self::Error> {
        let type_name = values
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| {
                NnBuilderError::InvalidLayerError(format!(
                    "First element in a layer specification must be one of {:?}",
                    VALID_LAYER_TYPES
                ))
            })?
            .to_lowercase();
        if !VALID_LAYER_TYPES.contains(&type_name.as_str()) {
            return Err(NnBuilderError::InvalidLayerError(format!(
                "Layer name {} not valid, use one of {:?}",
                type_name, VALID_LAYER_TYPES
            )));
        }
        let fields = integer_fields(&type_name, &values[1..])?;

        let layer = match (type_name.as_str(), fields.as_slice()) {
            ("conv", &[channels, kernel_size, stride, padding]) => {
                LayerSpec::conv(channels, kernel_size, stride, padding)
            }
            ("maxpool", &[kernel_size, stride, padding]) => {
                LayerSpec::max_pool(kernel_size, stride, padding)
            }
            ("avgpool", &[kernel_size, stride, padding]) => {
                LayerSpec::avg_pool(kernel_size, stride, padding)
            }
            ("adaptivemaxpool", &[output_height, output_width]) => {
                LayerSpec::adaptive_max_pool(output_height, output_width)
            }
            ("adaptiveavgpool", &[output_height, output_width]) => {
                LayerSpec::adaptive_avg_pool(output_height, output_width)
            }
            ("linear", &[in_features, out_features]) => LayerSpec::linear(in_features, out_features),
            ("linear", &[out_features]) => LayerSpec::linear_inferred(out_features),
            _ => {
                return Err(NnBuilderError::InvalidLayerError(format!(
                    "wrong number of elements in {:?}, {}",
                    values,
                    form_for_type(&type_name)
                )));
            }
        };
        Ok(layer)
    }
}

impl TryFrom<Vec<Value>> for LayerSpec {
    type Error = NnBuilderError;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        LayerSpec::try_from(values.as_slice())
    }
}

impl Serialize for LayerSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let fields: Vec<i64> = match *self {
            LayerSpec::Conv {
                channels,
                kernel_size,
                stride,
                padding,
            } => vec![channels, kernel_size, stride, padding],
            LayerSpec::MaxPool {
                kernel_size,
                stride,
                padding,
            }
            | LayerSpec::AvgPool {
                kernel_size,
                stride,
                padding,
            } => vec![kernel_size, stride, padding],
            LayerSpec::AdaptiveMaxPool {
                output_height,
                output_width,
            }
            | LayerSpec::AdaptiveAvgPool {
                output_height,
                output_width,
            } => vec![output_height, output_width],
            LayerSpec::Linear {
                in_features: Some(in_features),
                out_features,
            } => vec![in_features, out_features],
            LayerSpec::Linear {
                in_features: None,
                out_features,
            } => vec![out_features],
        };
        let mut seq = serializer.serialize_seq(Some(fields.len() + 1))?;
        seq.serialize_element(self.type_name())?;
        for field in fields {
            seq.serialize_element(&field)?;
        }
        seq.end()
    }
}

impl fmt::Display for LayerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(list_form) => f.write_str(&list_form),
            Err(_) => Err(fmt::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<LayerSpec, NnBuilderError> {
        match value {
            Value::Array(values) => LayerSpec::try_from(values),
            _ => panic!("layer specifications are arrays"),
        }
    }

    #[test]
    fn parses_every_layer_type() {
        assert_eq!(
            parse(json!(["conv", 16, 3, 1, 1])).unwrap(),
            LayerSpec::conv(16, 3, 1, 1)
        );
        assert_eq!(
            parse(json!(["maxpool", 2, 2, 0])).unwrap(),
            LayerSpec::max_pool(2, 2, 0)
        );
        assert_eq!(
            parse(json!(["avgpool", 3, 1, 1])).unwrap(),
            LayerSpec::avg_pool(3, 1, 1)
        );
        assert_eq!(
            parse(json!(["adaptivemaxpool", 4, 2])).unwrap(),
            LayerSpec::adaptive_max_pool(4, 2)
        );
        assert_eq!(
            parse(json!(["adaptiveavgpool", 4, 4])).unwrap(),
            LayerSpec::adaptive_avg_pool(4, 4)
        );
        assert_eq!(
            parse(json!(["linear", 64, 10])).unwrap(),
            LayerSpec::linear(64, 10)
        );
        assert_eq!(
            parse(json!(["linear", 10])).unwrap(),
            LayerSpec::linear_inferred(10)
        );
    }

    #[test]
    fn layer_type_is_case_insensitive() {
        assert_eq!(
            parse(json!(["Conv", 8, 3, 1, 0])).unwrap(),
            LayerSpec::conv(8, 3, 1, 0)
        );
        assert_eq!(
            parse(json!(["AdaptiveAvgPool", 1, 1])).unwrap(),
            LayerSpec::adaptive_avg_pool(1, 1)
        );
    }

    #[test]
    fn unknown_tag_names_valid_types() {
        let error = parse(json!(["dense", 10, 10])).unwrap_err();
        match error {
            NnBuilderError::InvalidLayerError(message) => {
                assert!(message.contains("dense"));
                for layer_type in VALID_LAYER_TYPES.iter() {
                    assert!(message.contains(layer_type));
                }
            }
            _ => panic!("unexpected error {:?}", error),
        }
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(parse(json!(["conv", 16, 3, 1])).is_err());
        assert!(parse(json!(["maxpool", 2, 2])).is_err());
        assert!(parse(json!(["adaptiveavgpool", 4])).is_err());
        assert!(parse(json!(["linear", 1, 2, 3])).is_err());
        assert!(parse(json!([])).is_err());
    }

    #[test]
    fn non_integer_fields_are_rejected() {
        assert!(parse(json!(["conv", 16, 3.5, 1, 1])).is_err());
        assert!(parse(json!(["linear", "10"])).is_err());
        assert!(parse(json!([3, 16])).is_err());
    }

    #[test]
    fn validate_checks_value_ranges() {
        assert!(LayerSpec::conv(16, 3, 1, 0).validate().is_ok());
        assert!(LayerSpec::conv(0, 3, 1, 0).validate().is_err());
        assert!(LayerSpec::conv(16, 3, 1, -1).validate().is_err());
        assert!(LayerSpec::max_pool(2, 0, 0).validate().is_err());
        assert!(LayerSpec::adaptive_avg_pool(0, 4).validate().is_err());
        assert!(LayerSpec::linear(0, 4).validate().is_err());
        assert!(LayerSpec::linear_inferred(-1).validate().is_err());
    }

    #[test]
    fn pooling_padding_is_at_most_half_the_kernel() {
        assert!(LayerSpec::max_pool(3, 1, 1).validate().is_ok());
        assert!(LayerSpec::avg_pool(5, 1, 2).validate().is_ok());
        assert!(LayerSpec::max_pool(2, 2, 5).validate().is_err());
        assert!(LayerSpec::avg_pool(3, 1, 2).validate().is_err());
        match LayerSpec::max_pool(2, 2, 2).validate() {
            Err(NnBuilderError::InvalidLayerError(message)) => {
                assert!(message.contains("at most half of kernel_size"))
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn serializes_to_list_form() {
        let layers = vec![LayerSpec::conv(16, 3, 1, 1), LayerSpec::linear_inferred(10)];
        let serialized = serde_json::to_value(&layers).unwrap();
        assert_eq!(serialized, json!([["conv", 16, 3, 1, 1], ["linear", 10]]));

        let parsed: Vec<LayerSpec> = serde_json::from_value(serialized).unwrap();
        assert_eq!(parsed, layers);
    }
}
