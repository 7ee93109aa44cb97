extern crate tch;

use nn_builder::cnn::{Cnn, CnnConfig};
use nn_builder::{Config, NnBuilderError};
use tch::{nn, Device};

/// Builds the network described by a JSON configuration, prints its summary and optionally
/// saves the initial weights in the `tch` variable store format.
pub fn main() -> Result<(), NnBuilderError> {
    env_logger::init();

    let args: Vec<_> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        return Err(NnBuilderError::InvalidConfigurationError(format!(
            "usage: {} config.json [destination.ot]",
            args[0].as_str()
        )));
    }

    let config = CnnConfig::from_file(&args[1])?;
    let vs = nn::VarStore::new(Device::cuda_if_available());
    let cnn = Cnn::new(vs.root(), &config)?;
    if !config.print_model_summary {
        println!("{}", cnn);
    }

    if let Some(destination_file) = args.get(2) {
        vs.save(destination_file)?;
        log::info!("saved initial weights to {}", destination_file);
    }

    Ok(())
}
