use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl PipelineError {
    /// True for every failure that means "these bytes are not a usable image".
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::InvalidDimensions { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// Serialized as the display string so batch manifests can carry it
impl serde::Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_failure_classification() {
        assert!(PipelineError::Decode("bad".to_string()).is_decode_failure());
        assert!(PipelineError::InvalidDimensions { width: 0, height: 4 }.is_decode_failure());
        assert!(!PipelineError::Encode("x".to_string()).is_decode_failure());
        assert!(!PipelineError::Processing("join".to_string()).is_decode_failure());
    }

    #[test]
    fn test_serializes_as_message() {
        let err = PipelineError::InvalidDimensions { width: 0, height: 0 };
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Invalid image dimensions: 0x0\"");
    }
}
