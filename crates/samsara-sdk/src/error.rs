// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while building a client from its configuration.
///
/// These are fatal to construction and never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("URL for Ingestion API should be specified.")]
    MissingUrl,

    #[error("Incorrect compression option: '{0}'. Must be one of: gzip, none")]
    UnknownCompression(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Errors raised when an event does not conform to the ingestion API requirements.
///
/// A rejected event is never enqueued nor sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field '{field}' is required and must be of {expected} type")]
    MissingField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Field '{field}' can't be blank")]
    BlankField { field: &'static str },

    #[error("timestamp can't be less than 0, got {0}")]
    NegativeTimestamp(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Invalid("flush interval must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: flush interval must be greater than 0"
        );
        assert_eq!(
            ConfigError::MissingUrl.to_string(),
            "URL for Ingestion API should be specified."
        );
    }

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError::MissingField {
            field: "sourceId",
            expected: "string",
        };
        assert_eq!(
            error.to_string(),
            "Field 'sourceId' is required and must be of string type"
        );

        let error = ValidationError::BlankField { field: "eventName" };
        assert_eq!(error.to_string(), "Field 'eventName' can't be blank");
    }

    #[test]
    fn test_error_debug() {
        let error = ValidationError::NegativeTimestamp(-1);
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("NegativeTimestamp"));
    }
}
