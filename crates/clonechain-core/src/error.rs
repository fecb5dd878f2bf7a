use thiserror::Error;

/// Result alias for core operations.
pub type ClonechainResult<T> = Result<T, ClonechainError>;

#[derive(Error, Debug)]
pub enum ClonechainError {
    #[error("[CC1000] io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[CC1001] toml config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("[CC1002] yaml config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("[CC1003] json decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("[CC1100] configuration error: {0}")]
    InvalidConfig(String),

    #[error("[CC1200] {object} not found: {reason}")]
    ObjectNotFound { object: String, reason: String },

    #[error("[CC1201] invalid location `{0}` (expected pool/image[@snap])")]
    InvalidCoordinate(String),

    #[error("[CC2000] provider error: {0}")]
    Provider(String),

    #[error("[CC2001] pool `{pool}` unreachable: {reason}")]
    BackendUnreachable { pool: String, reason: String },

    #[error("[CC2002] malformed backend response: {0}")]
    MalformedResponse(String),
}

impl ClonechainError {
    pub fn code(&self) -> &'static str {
        match self {
            ClonechainError::Io(_) => "CC1000",
            ClonechainError::Toml(_) => "CC1001",
            ClonechainError::Yaml(_) => "CC1002",
            ClonechainError::Json(_) => "CC1003",
            ClonechainError::InvalidConfig(_) => "CC1100",
            ClonechainError::ObjectNotFound { .. } => "CC1200",
            ClonechainError::InvalidCoordinate(_) => "CC1201",
            ClonechainError::Provider(_) => "CC2000",
            ClonechainError::BackendUnreachable { .. } => "CC2001",
            ClonechainError::MalformedResponse(_) => "CC2002",
        }
    }

    /// True for the "object vanished" and "pool unreachable" conditions that a
    /// traversal treats as "no further information" instead of failing.
    pub fn is_absorbable(&self) -> bool {
        matches!(
            self,
            ClonechainError::ObjectNotFound { .. } | ClonechainError::BackendUnreachable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_prefix() {
        let err = ClonechainError::BackendUnreachable {
            pool: "volumes".into(),
            reason: "timed out".into(),
        };
        assert!(err.to_string().starts_with("[CC2001]"));
        assert_eq!(err.code(), "CC2001");
    }

    #[test]
    fn only_not_found_conditions_are_absorbable() {
        assert!(ClonechainError::ObjectNotFound {
            object: "volumes/volume-1".into(),
            reason: "gone".into()
        }
        .is_absorbable());
        assert!(ClonechainError::BackendUnreachable {
            pool: "volumes".into(),
            reason: "down".into()
        }
        .is_absorbable());
        assert!(!ClonechainError::Provider("boom".into()).is_absorbable());
        assert!(!ClonechainError::MalformedResponse("x".into()).is_absorbable());
    }
}
