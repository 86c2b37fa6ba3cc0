use thiserror::Error;

/// Classification of failures reported by a language-model or embedding API.
///
/// The kind decides whether the shared retry policy tries the call again
/// and which hint the CLI prints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Authentication failure (401, invalid API key)
    Authentication,
    /// Rate limit exceeded (429)
    RateLimit,
    /// Quota exceeded (insufficient_quota)
    QuotaExceeded,
    /// Server error or service unavailable (5xx)
    ServerError,
    /// Network/connection error
    NetworkError,
    /// Anything else the API rejected (bad request, unknown model, ...)
    Unknown,
}

/// Structured error details from an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct LlmErrorDetails {
    pub kind: LlmErrorKind,
    /// Human-readable error message from the API
    pub message: String,
    /// HTTP status code, 0 when no response was received
    pub status_code: u16,
}

impl LlmErrorDetails {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code,
        }
    }
}

impl std::fmt::Display for LlmErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LLM API error (HTTP {}): {}", self.status_code, self.message)
    }
}

/// Application-wide error types.
///
/// Every fallible operation in the Vesta crates returns this type. Whether an
/// error is transient is decided by [`AppError::is_retryable`], which the
/// [`RetryPolicy`](crate::retry::RetryPolicy) consults before backing off.
///
/// # Examples
///
/// ```
/// use vesta_core::error::AppError;
///
/// fn parse_portal(url: &str) -> Result<(), AppError> {
///     Err(AppError::InvalidPortalUrl(url.to_string()))
/// }
///
/// assert!(parse_portal("not a url").is_err());
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP client request failed.
    ///
    /// Covers transport failures that are neither a timeout nor a refused
    /// connection, plus client construction errors.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// The portal answered with a 5xx status.
    #[error("Upstream server error: HTTP {0}")]
    UpstreamError(u16),

    /// The portal answered with a non-retryable status (4xx other than 429).
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Embedding or chat-completion API call failed.
    #[error("LLM error: {0}")]
    LlmError(LlmErrorDetails),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid CKAN portal URL provided.
    #[error("Invalid CKAN portal URL: {0}")]
    InvalidPortalUrl(String),

    /// API response contained no data.
    #[error("Empty response from API")]
    EmptyResponse,

    /// The response parsed as JSON but did not have the expected shape,
    /// or the portal reported `success: false`.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded. Carries the server's `Retry-After` hint in seconds.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded { retry_after: Option<u64> },

    /// A table tool call named an unknown table, column or function, or
    /// carried arguments that do not parse.
    #[error("Tool error: {0}")]
    ToolError(String),

    /// Configuration file or value error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Shorthand for a rate-limit error without a `Retry-After` hint.
    pub fn rate_limited() -> Self {
        AppError::RateLimitExceeded { retry_after: None }
    }

    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. The portal may be slow or unreachable.\n   \
                     Try again later or check the portal URL."
                        .to_string()
                } else if msg.contains("connect") {
                    format!(
                        "Cannot connect to portal: {}\n   Check your internet connection and the portal URL.",
                        msg
                    )
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::UpstreamError(status) => {
                format!(
                    "The portal returned HTTP {}.\n   It may be temporarily unavailable. Try again later.",
                    status
                )
            }
            AppError::LlmError(details) => match details.kind {
                LlmErrorKind::Authentication => {
                    "Invalid OpenAI API key.\n   Check your OPENAI_API_KEY environment variable."
                        .to_string()
                }
                LlmErrorKind::RateLimit => {
                    "OpenAI rate limit reached.\n   Wait a moment and try again.".to_string()
                }
                LlmErrorKind::QuotaExceeded => {
                    "OpenAI quota exceeded.\n   Check your OpenAI account billing.".to_string()
                }
                LlmErrorKind::ServerError => {
                    format!(
                        "OpenAI server error (HTTP {}).\n   Please try again later.",
                        details.status_code
                    )
                }
                LlmErrorKind::NetworkError => {
                    format!(
                        "Network error connecting to OpenAI: {}\n   Check your internet connection.",
                        details.message
                    )
                }
                LlmErrorKind::Unknown => format!("OpenAI error: {}", details.message),
            },
            AppError::InvalidPortalUrl(url) => {
                format!("Invalid portal URL: {}\n   Example: https://data.gov.sg", url)
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The server may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded { .. } => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            AppError::EmptyResponse => {
                "The API returned no data. The portal may be temporarily unavailable.".to_string()
            }
            AppError::ConfigError(msg) => {
                format!("Configuration error: {}\n   Check your configuration file.", msg)
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is transient and the call may be retried.
    ///
    /// # Examples
    ///
    /// ```
    /// use vesta_core::error::AppError;
    ///
    /// assert!(AppError::NetworkError("connection reset".to_string()).is_retryable());
    /// assert!(AppError::rate_limited().is_retryable());
    /// assert!(AppError::UpstreamError(503).is_retryable());
    /// assert!(!AppError::EmptyResponse.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded { .. }
            | AppError::UpstreamError(_) => true,
            AppError::ClientError(msg) => {
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connect")
                    || msg.contains("connection")
            }
            AppError::LlmError(details) => matches!(
                details.kind,
                LlmErrorKind::RateLimit | LlmErrorKind::NetworkError | LlmErrorKind::ServerError
            ),
            AppError::HttpStatus { .. }
            | AppError::SerializationError(_)
            | AppError::InvalidUrl(_)
            | AppError::InvalidPortalUrl(_)
            | AppError::EmptyResponse
            | AppError::MalformedResponse(_)
            | AppError::ToolError(_)
            | AppError::ConfigError(_)
            | AppError::Generic(_) => false,
        }
    }

    /// Server-provided delay hint, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        }
    }
}
