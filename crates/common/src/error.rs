use thiserror::Error;

/// Errors raised inside the notification core.
///
/// Transport errors are turned into delivery outcomes at the channel boundary,
/// so callers of the dispatcher only ever see `Render` errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {service}: status={status}, body={body}")]
    Api {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Usage counter error: {0}")]
    Counter(String),

    #[error("{0}")]
    Other(String),
}

impl From<redis::RedisError> for NotifyError {
    fn from(err: redis::RedisError) -> Self {
        NotifyError::Counter(err.to_string())
    }
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message() {
        let err = NotifyError::Api {
            service: "pushover".to_string(),
            status: 400,
            body: "user key is invalid".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pushover"));
        assert!(msg.contains("400"));
    }
}
