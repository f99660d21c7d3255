use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Missing image data: {0}")]
    NotFound(String),

    #[error("Image type mismatch: {0}")]
    ImageType(String),

    #[error("Image size mismatch: {0}")]
    Size(String),

    #[error("Internal logic error: {0}")]
    Logic(String),

    #[error("Configuration parse error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, FusionError>;
