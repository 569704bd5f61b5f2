use std::io;

use thiserror::Error;

/// Error type for loading, resolving, ranking and remote fetch failures.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid ZIP code format: '{0}'")]
    InvalidZipFormat(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("no data found for district {0}")]
    NoDataForDistrict(String),
    #[error("variable {0} not found in the measurement table")]
    VariableNotFound(String),
    #[error("remote fetch failed after {attempts} attempt(s): {reason}")]
    RemoteFetch { attempts: u32, reason: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RankError {
    /// Errors the user can act on by changing their input or retrying later.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RankError::InvalidZipFormat(_)
                | RankError::NotFound(_)
                | RankError::NoDataForDistrict(_)
                | RankError::VariableNotFound(_)
                | RankError::RemoteFetch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(RankError::InvalidZipFormat("abc".into()).is_recoverable());
        assert!(RankError::NotFound("ZIP 00000".into()).is_recoverable());
        assert!(!RankError::Configuration("empty".into()).is_recoverable());
    }

    #[test]
    fn test_messages() {
        let err = RankError::RemoteFetch { attempts: 3, reason: "timeout".into() };
        assert_eq!(err.to_string(), "remote fetch failed after 3 attempt(s): timeout");
    }
}
