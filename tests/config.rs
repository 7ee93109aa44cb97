extern crate anyhow;

use nn_builder::cnn::{Cnn, CnnConfig, LayerSpec, OutputWidthRule};
use nn_builder::{Activation, Config, Initialiser, NnBuilderError, OneOrMany};
use std::io::Write;
use tch::{nn, Device};

#[test]
fn cnn_config_from_file() -> anyhow::Result<()> {
    //    Set-up configuration file
    let mut config_file = tempfile::NamedTempFile::new()?;
    write!(
        config_file,
        r#"{{
            "input_dim": 3,
            "hidden_layers_info": [
                ["Conv", 8, 3, 1, 1],
                ["maxpool", 2, 2, 0],
                ["avgpool", 2, 2, 0],
                ["AdaptiveMaxPool", 2, 2],
                ["linear", 16],
                ["linear", 16, 8]
            ],
            "output_dim": [3, 1],
            "output_activation": ["softmax", "sigmoid"],
            "hidden_activations": "tanh",
            "dropout": 0.1,
            "initialiser": "he",
            "batch_norm": true,
            "y_range": [],
            "random_seed": 7,
            "output_width_rule": "channels_times_spatial"
        }}"#
    )?;

    //    Load and build
    let config = CnnConfig::from_file(config_file.path())?;
    assert_eq!(config.input_dim, 3);
    assert_eq!(config.hidden_layers_info[0], LayerSpec::conv(8, 3, 1, 1));
    assert_eq!(config.hidden_layers_info[3], LayerSpec::adaptive_max_pool(2, 2));
    assert_eq!(config.hidden_layers_info[4], LayerSpec::linear_inferred(16));
    assert_eq!(config.output_dim, OneOrMany::Many(vec![3, 1]));
    assert_eq!(config.hidden_activations, OneOrMany::One(Activation::tanh));
    assert_eq!(config.initialiser, Initialiser::KaimingNormal);
    assert_eq!(config.y_range, None);
    assert_eq!(config.output_width_rule, OutputWidthRule::ChannelsTimesSpatial);

    let vs = nn::VarStore::new(Device::Cpu);
    let cnn = Cnn::new(vs.root(), &config)?;
    assert_eq!(cnn.hidden_layers()[4].num_output_features(), Some(16));
    assert_eq!(cnn.hidden_layers()[4].weight().unwrap().size(), vec![16, 32]);
    assert_eq!(cnn.output_layers()[1].ws.size(), vec![1, 8]);
    Ok(())
}

#[test]
fn missing_config_file_is_an_io_error() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;

    let result = CnnConfig::from_file(directory.path().join("missing.json"));

    assert!(matches!(result, Err(NnBuilderError::IOError(_))));
    Ok(())
}

#[test]
fn malformed_config_file_is_a_parsing_error() -> anyhow::Result<()> {
    let mut config_file = tempfile::NamedTempFile::new()?;
    write!(
        config_file,
        r#"{{"hidden_layers_info": [["conv", 8, 3]], "output_dim": 1}}"#
    )?;

    let result = CnnConfig::from_file(config_file.path());

    assert!(matches!(result, Err(NnBuilderError::ParsingError(_))));
    Ok(())
}

#[test]
fn config_serializes_to_list_form() -> anyhow::Result<()> {
    let config = CnnConfig {
        y_range: Some((-2.0, 2.0)),
        ..CnnConfig::new(
            vec![LayerSpec::conv(4, 3, 1, 0), LayerSpec::adaptive_avg_pool(1, 1)],
            2.into(),
        )
    };

    let value = serde_json::to_value(&config)?;

    assert_eq!(value["hidden_layers_info"][0], serde_json::json!(["conv", 4, 3, 1, 0]));
    assert_eq!(value["y_range"], serde_json::json!([-2.0, 2.0]));
    let reloaded: CnnConfig = serde_json::from_value(value)?;
    assert_eq!(reloaded.hidden_layers_info, config.hidden_layers_info);
    Ok(())
}
