use std::convert::From;
use std::error;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A refresh for this source is already running. [source_id]
    SourceBusy(String),
    /// No source is configured with this ID. [source_id]
    SourceNotFound(String),
    /// The upstream adapter failed. [source_id, reason]
    Fetch { source_id: String, reason: String },
    /// The upstream adapter did not answer in time. [source_id, timeout]
    Timeout { source_id: String, timeout: Duration },
    /// Storage backend failure. [reason]
    Backend(String),
    /// A search filter could not be parsed. [reason]
    InvalidFilter(String),
}

impl StoreError {
    pub fn fetch<E: fmt::Display>(source_id: &str, err: E) -> Self {
        StoreError::Fetch {
            source_id: source_id.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn timeout(source_id: &str, timeout: Duration) -> Self {
        StoreError::Timeout {
            source_id: source_id.to_string(),
            timeout,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use StoreError::*;
        match self {
            SourceBusy(id) => write!(f, "Source {} is busy refreshing", id),
            SourceNotFound(id) => write!(f, "Source {} not found", id),
            Fetch { source_id, reason } => write!(f, "Fetch from {} failed [{}]", source_id, reason),
            Timeout { source_id, timeout } => write!(
                f,
                "Fetch from {} timed out after {}ms",
                source_id,
                timeout.as_millis()
            ),
            Backend(reason) => write!(f, "Storage backend error [{}]", reason),
            InvalidFilter(reason) => write!(f, "Invalid filter [{}]", reason),
        }
    }
}

impl error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::Backend(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Backend(error.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(error: tokio::task::JoinError) -> Self {
        StoreError::Backend(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            StoreError::fetch("rs1", "connection refused").to_string(),
            "Fetch from rs1 failed [connection refused]"
        );
        assert_eq!(
            StoreError::timeout("rs2", Duration::from_millis(1500)).to_string(),
            "Fetch from rs2 timed out after 1500ms"
        );
        assert_eq!(
            StoreError::SourceBusy("rs1".into()).to_string(),
            "Source rs1 is busy refreshing"
        );
    }
}
