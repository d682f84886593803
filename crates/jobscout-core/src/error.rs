use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retry-policy category assigned to every failure the pipeline sees.
///
/// The category, not the error itself, decides what the queue does next:
/// `Transient` and `Resource` retry with backoff, `Permanent` fails on the
/// first occurrence, `Unknown` gets one conservative retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Transient,
    Permanent,
    Resource,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transient" => Ok(ErrorCategory::Transient),
            "permanent" => Ok(ErrorCategory::Permanent),
            "resource" => Ok(ErrorCategory::Resource),
            "unknown" => Ok(ErrorCategory::Unknown),
            _ => Err(format!("Unknown error category: {}", s)),
        }
    }
}

/// Application-wide error types for jobscout.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (fetching a page or careers endpoint).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    Network(String),

    /// Inference API rate limit or quota exhausted.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// No inference backend is currently accepting work.
    #[error("No inference backend available: {0}")]
    NoBackend(String),

    /// Inference API call failed.
    #[error("Inference error (HTTP {status_code}): {message}")]
    Inference {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// A source signaled bot protection or an otherwise blocked scrape.
    #[error("Source blocked: {0}")]
    Blocked(String),

    /// Authentication against a source or protected API failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Structured extraction produced unusable output.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// A queue item carried the wrong payload for its stage.
    #[error("Invalid payload for stage {stage}: expected {expected}")]
    Payload {
        stage: &'static str,
        expected: &'static str,
    },

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A URL could not be parsed or normalized.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration or policy file is missing or invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// An active item with the same dedupe key already exists.
    #[error("Duplicate item: {0}")]
    Duplicate(String),

    /// Spawning would exceed the configured lineage depth cap.
    #[error("Spawn depth {depth} exceeds cap {max}")]
    SpawnDepthExceeded { depth: u32, max: u32 },

    /// A referenced record does not exist.
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Classify this error for retry handling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Timeout(_) | AppError::Network(_) => ErrorCategory::Transient,
            AppError::Http(msg) => {
                if msg.contains("timeout") || msg.contains("connect") || msg.contains("reset") {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Unknown
                }
            }
            AppError::RateLimited | AppError::NoBackend(_) => ErrorCategory::Resource,
            AppError::Inference {
                status_code,
                retryable,
                ..
            } => {
                if *status_code == 429 {
                    ErrorCategory::Resource
                } else if *status_code >= 500 || *retryable {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Permanent
                }
            }
            AppError::Blocked(_)
            | AppError::Auth(_)
            | AppError::Extraction(_)
            | AppError::Payload { .. }
            | AppError::Serialization(_)
            | AppError::InvalidUrl(_)
            | AppError::Config(_)
            | AppError::Duplicate(_)
            | AppError::SpawnDepthExceeded { .. }
            | AppError::NotFound(..) => ErrorCategory::Permanent,
            AppError::Database(_) | AppError::Generic(_) => ErrorCategory::Unknown,
        }
    }

    /// Returns true if the category permits another attempt at all.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::Resource | ErrorCategory::Unknown
        )
    }
}
