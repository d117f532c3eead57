#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Cannot plot more than {max} series at once")]
    CapacityExceeded { max: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Chart error: {0}")]
    Chart(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// Malformed payloads are handled exactly like failed requests.
    #[must_use]
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Self::Network(_) | Self::MalformedResponse(_))
    }

    /// The message shown to the user. Logging stays with the caller.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) | Self::MalformedResponse(_) => {
                "Unable to load data from the server. Please try again.".to_string()
            }
            Self::CapacityExceeded { max } => {
                format!("A maximum of {max} series can be plotted at once. Remove a series before adding another.")
            }
            Self::Config(_) => "Configuration error".to_string(),
            Self::NotFound(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::Chart(_) => "The chart could not be updated.".to_string(),
            Self::Csv(_) | Self::Io(_) => "CSV export failed".to_string(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_counts_as_network_failure() {
        assert!(AppError::Network("timeout".into()).is_network_failure());
        assert!(AppError::MalformedResponse("bad json".into()).is_network_failure());
        assert!(!AppError::CapacityExceeded { max: 6 }.is_network_failure());
    }

    #[test]
    fn capacity_message_names_limit() {
        let msg = AppError::CapacityExceeded { max: 6 }.user_message();
        assert!(msg.contains('6'));
    }

    #[test]
    fn network_details_stay_out_of_user_message() {
        let msg = AppError::Network("HTTP 500: stack trace".into()).user_message();
        assert!(!msg.contains("stack trace"));
        assert_eq!(msg, AppError::MalformedResponse("bad json".into()).user_message());
    }
}
