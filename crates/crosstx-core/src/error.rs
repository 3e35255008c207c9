use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("relational store error: {0}")]
    Relational(String),

    #[error("append-only write to '{stream}' failed: {message}")]
    AppendOnly { stream: String, message: String },

    #[error("row is missing primary key field '{field}'")]
    MissingPrimaryKey { field: String },

    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_only_error_names_stream() {
        let err = StoreError::AppendOnly {
            stream: "events".to_string(),
            message: "broker unavailable".to_string(),
        };

        let msg = err.to_string();

        assert!(msg.contains("events"));
        assert!(msg.contains("broker unavailable"));
    }

    #[test]
    fn missing_primary_key_names_field() {
        let err = StoreError::MissingPrimaryKey {
            field: "event_id".to_string(),
        };

        assert!(err.to_string().contains("event_id"));
    }
}
