use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown enum value: {0}")]
    UnknownValue(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
