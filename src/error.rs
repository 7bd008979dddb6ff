use thiserror::Error;

#[derive(Debug, Error)]
pub enum SncError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("incomplete recovery: {recovered} of {total} symbols recovered")]
    IncompleteRecovery { recovered: usize, total: usize },
    #[error("division by zero in finite field")]
    DivideByZero,
    #[error("segment {segment} not decoded after {packets} packets")]
    Stalled { segment: usize, packets: usize },
    #[error("digest mismatch: expected sha256 {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for SncError {
    fn from(e: toml::de::Error) -> Self {
        SncError::Config(e.to_string())
    }
}

impl SncError {
    /// Errors that leave the session usable. The caller may keep feeding packets.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SncError::MalformedPacket(_) | SncError::IncompleteRecovery { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = SncError::IncompleteRecovery {
            recovered: 3,
            total: 8,
        };
        assert_eq!(e.to_string(), "incomplete recovery: 3 of 8 symbols recovered");
        assert_eq!(
            SncError::DivideByZero.to_string(),
            "division by zero in finite field"
        );
        let e = SncError::DigestMismatch {
            expected: "ab".into(),
            actual: "cd".into(),
        };
        assert_eq!(e.to_string(), "digest mismatch: expected sha256 ab, got cd");
        assert!(!e.is_recoverable());
    }

    #[test]
    fn recoverable_classes() {
        assert!(SncError::MalformedPacket("short".into()).is_recoverable());
        assert!(!SncError::InvalidParameter("g".into()).is_recoverable());
        assert!(!SncError::DivideByZero.is_recoverable());
    }
}
