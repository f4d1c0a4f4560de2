//! Error types for the Orra SDK
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Retry/fatal classification for the session actor and `orra-worker run`
//! - Exit codes for the `orra-worker` binary

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Connection errors (3xx)
    ConnectionFailed = 300,
    ConnectionTimeout = 301,
    ConnectionLost = 303,
    HttpFailed = 305,

    // Protocol errors (4xx)
    ProtocolMalformed = 401,

    // Registration errors (5xx)
    RegistrationRejected = 500,
    RegistrationIncomplete = 501,
    PersistenceFailed = 502,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Connection errors
            400..=499 => 40, // Protocol errors
            500..=599 => 50, // Registration errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the SDK
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Invalid client construction arguments (empty URL or key)
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP transport error during registration
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Connection timeout
    #[error("Connection to {url} timed out after {timeout_secs}s")]
    ConnectionTimeout { url: String, timeout_secs: u64 },

    /// Connection lost
    #[error("Lost connection to platform: {message}")]
    ConnectionLost { message: String },

    /// Generic connection error
    #[error("Connection error: {0}")]
    Connection(String),

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Malformed inbound message
    #[error("Malformed protocol message: {message}")]
    ProtocolMalformed { message: String },

    // ─────────────────────────────────────────────────────────────
    // Registration Errors
    // ─────────────────────────────────────────────────────────────

    /// Platform rejected the registration request
    #[error("Failed to register {kind}: {status} {status_text}: {body}")]
    Registration {
        kind: String,
        status: u16,
        status_text: String,
        body: String,
    },

    /// Platform accepted the request but returned no identifier
    #[error("Registration of {kind} succeeded but the response carried no id")]
    RegistrationMissingId { kind: String },

    /// Identity could not be stored after a successful registration
    #[error("Failed to persist service identity: {message}")]
    Persistence { message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::ProtocolMalformed,

            Error::WebSocket(_) => ErrorCode::ConnectionFailed,
            Error::Http(_) => ErrorCode::HttpFailed,
            Error::ConnectionTimeout { .. } => ErrorCode::ConnectionTimeout,
            Error::ConnectionLost { .. } => ErrorCode::ConnectionLost,
            Error::Connection(_) => ErrorCode::ConnectionFailed,

            Error::ProtocolMalformed { .. } => ErrorCode::ProtocolMalformed,

            Error::Registration { .. } => ErrorCode::RegistrationRejected,
            Error::RegistrationMissingId { .. } => ErrorCode::RegistrationIncomplete,
            Error::Persistence { .. } => ErrorCode::PersistenceFailed,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable. A session URL the transport
    /// refuses will not get better on the next attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::WebSocket(e) => !matches!(e, tokio_tungstenite::tungstenite::Error::Url(_)),
            Error::ConnectionTimeout { .. }
            | Error::ConnectionLost { .. }
            | Error::Connection(_)
            | Error::Http(_)
            | Error::Io(_)
            | Error::IoRead { .. }
            | Error::IoWrite { .. } => true,
            _ => false,
        }
    }

    /// Check if the error is fatal (worker should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Config(_)
                | Error::Registration { .. }
                | Error::RegistrationMissingId { .. }
                | Error::Persistence { .. }
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'orra-worker config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'orra-worker config validate' to see details."
            ),
            Error::ConfigValidation { .. } | Error::Config(_) => Some(
                "Set platform.api_url and platform.api_key in the config file or via ORRA_URL / ORRA_KEY."
            ),

            Error::WebSocket(_) | Error::Http(_) => Some(
                "Check your network connection and verify the platform URL is correct."
            ),
            Error::ConnectionTimeout { .. } => Some(
                "The platform may be down or unreachable. Check your firewall settings."
            ),
            Error::ConnectionLost { .. } => Some(
                "Connection was interrupted. The client will automatically attempt to reconnect."
            ),

            Error::Registration { status: 401, .. } | Error::Registration { status: 403, .. } => Some(
                "The platform rejected the API key. Check platform.api_key or ORRA_KEY."
            ),
            Error::Registration { .. } | Error::RegistrationMissingId { .. } => Some(
                "Registration did not complete. Check the platform logs and retry."
            ),
            Error::Persistence { .. } => Some(
                "Make sure the identity file location is writable, or change persistence.identity_file."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", code.as_str(), self);

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a connection timeout error
    pub fn connection_timeout(url: impl Into<String>, timeout_secs: u64) -> Self {
        Error::ConnectionTimeout {
            url: url.into(),
            timeout_secs,
        }
    }

    /// Create a malformed protocol message error
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::ProtocolMalformed {
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Error::Persistence {
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
