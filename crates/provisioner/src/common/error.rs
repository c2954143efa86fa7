use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl From<serde_json::error::Error> for ProvisionerError {
    fn from(e: serde_json::error::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            Self::DeserializationError(e.to_string())
        } else {
            Self::SerializationError(e.to_string())
        }
    }
}
