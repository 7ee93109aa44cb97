use rand_distr::uniform::Error as UniformError;
use rand_distr::NormalError;
use tch::TchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NnBuilderError {
    #[error("IO error: {0}")]
    IOError(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Tch tensor error: {0}")]
    TchError(String),

    #[error("Invalid layer error: {0}")]
    InvalidLayerError(String),

    #[error("Shape error: {0}")]
    ShapeError(String),

    #[error("Output shape error: {0}")]
    OutputShapeError(String),

    #[error("Invalid range error: {0}")]
    InvalidRangeError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    #[error("Initialisation error: {0}")]
    InitialisationError(String),
}

impl From<std::io::Error> for NnBuilderError {
    fn from(error: std::io::Error) -> Self {
        NnBuilderError::IOError(error.to_string())
    }
}

impl From<serde_json::Error> for NnBuilderError {
    fn from(error: serde_json::Error) -> Self {
        NnBuilderError::ParsingError(error.to_string())
    }
}

impl From<TchError> for NnBuilderError {
    fn from(error: TchError) -> Self {
        NnBuilderError::TchError(error.to_string())
    }
}

impl From<UniformError> for NnBuilderError {
    fn from(error: UniformError) -> Self {
        NnBuilderError::InitialisationError(error.to_string())
    }
}

impl From<NormalError> for NnBuilderError {
    fn from(error: NormalError) -> Self {
        NnBuilderError::InitialisationError(error.to_string())
    }
}
