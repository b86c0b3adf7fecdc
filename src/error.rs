//! Unified error handling for the Gemini CryptoTrader core
//!
//! Every fallible operation in the library returns `TraderResult<T>`. The
//! variants follow the failure taxonomy of the application: bad user input,
//! missing secret material, vault failures, transient per-call exchange
//! failures and invariant violations.

use std::fmt;
use std::io;

/// Main error type for the trading client
#[derive(Debug)]
pub enum TraderError {
    // User input
    Validation(String),
    NotFound(String),

    // Credentials and roles
    Credential(String),
    RoleNotPermitted(String, &'static str), // (account_id, role)

    // Vault
    Crypto(String),

    // Exchange and market data calls
    Network(String),
    Timeout(String),
    Parse(String),
    Exchange { reason: String, message: String },
    Http(u16),

    // Invariant violations
    State(String),

    // Configuration
    ConfigNotFound(String),
    ConfigParse(String),
    ConfigValidation(String),

    // IO
    FileRead(String),
    FileWrite(String),

    Internal(String),
}

impl TraderError {
    pub fn exchange(reason: impl Into<String>, message: impl Into<String>) -> Self {
        TraderError::Exchange {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            TraderError::Crypto(msg) => {
                format!(
                    "Could not unlock the account vault: {}\n\n\
                    💡 Wrong password or corrupt file.\n\
                    Re-enter the password, or restore Accounts.enc from a backup",
                    msg
                )
            }
            TraderError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: gemini-trader init\n\
                    2. Add an account: gemini-trader account add ...\n\
                    3. Try again",
                    path
                )
            }
            TraderError::Credential(msg) => {
                format!(
                    "Missing or invalid API credentials: {}\n\n\
                    💡 Check:\n\
                    - The selected account has an API key and secret\n\
                    - The keys were created for the right environment (sandbox or production)",
                    msg
                )
            }
            TraderError::RoleNotPermitted(account, role) => {
                format!(
                    "Account '{}' does not have the {} role\n\n\
                    💡 Enable it with: gemini-trader account update {} --{} true",
                    account,
                    role,
                    account,
                    role.replace(' ', "-")
                )
            }
            TraderError::Exchange { reason, message } if reason == "InvalidNonce" => {
                format!(
                    "Exchange rejected the request nonce: {}\n\n\
                    💡 Another client may be using the same API key",
                    message
                )
            }
            TraderError::State(msg) => {
                format!(
                    "Account store is inconsistent: {}\n\n\
                    💡 Reload the store from a known-good backup",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Transient failures the poller skips over
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TraderError::Network(_)
                | TraderError::Timeout(_)
                | TraderError::Parse(_)
                | TraderError::Exchange { .. }
                | TraderError::Http(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TraderError::Validation(_) | TraderError::NotFound(_) => "validation",

            TraderError::Credential(_) | TraderError::RoleNotPermitted(_, _) => "credential",

            TraderError::Crypto(_) => "crypto",

            TraderError::Network(_) | TraderError::Timeout(_) => "network",

            TraderError::Parse(_) | TraderError::Exchange { .. } | TraderError::Http(_) => {
                "exchange"
            }

            TraderError::State(_) => "state",

            TraderError::ConfigNotFound(_)
            | TraderError::ConfigParse(_)
            | TraderError::ConfigValidation(_) => "config",

            TraderError::FileRead(_) | TraderError::FileWrite(_) => "io",

            TraderError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for TraderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraderError::Validation(msg) => write!(f, "Validation failed: {}", msg),
            TraderError::NotFound(id) => write!(f, "Account not found: {}", id),

            TraderError::Credential(msg) => write!(f, "Credential error: {}", msg),
            TraderError::RoleNotPermitted(account, role) => {
                write!(f, "Account '{}' lacks the {} role", account, role)
            }

            TraderError::Crypto(msg) => write!(f, "Vault error: {}", msg),

            TraderError::Network(msg) => write!(f, "Network error: {}", msg),
            TraderError::Timeout(msg) => write!(f, "Request timed out: {}", msg),
            TraderError::Parse(msg) => write!(f, "Parse error: {}", msg),
            TraderError::Exchange { reason, message } => {
                if message.is_empty() {
                    write!(f, "Exchange error: {}", reason)
                } else {
                    write!(f, "Exchange error: {} ({})", reason, message)
                }
            }
            TraderError::Http(status) => write!(f, "HTTP error: {}", status),

            TraderError::State(msg) => write!(f, "Invalid state: {}", msg),

            TraderError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path)
            }
            TraderError::ConfigParse(msg) => write!(f, "Configuration parse error: {}", msg),
            TraderError::ConfigValidation(msg) => {
                write!(f, "Configuration validation error: {}", msg)
            }

            TraderError::FileRead(msg) => write!(f, "File read error: {}", msg),
            TraderError::FileWrite(msg) => write!(f, "File write error: {}", msg),

            TraderError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for TraderError {}

// Conversion implementations for common error types

impl From<io::Error> for TraderError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => TraderError::Timeout(err.to_string()),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => TraderError::Network(err.to_string()),
            _ => TraderError::FileRead(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TraderError {
    fn from(err: serde_json::Error) -> Self {
        TraderError::Parse(format!("JSON parse error: {}", err))
    }
}

impl From<toml::de::Error> for TraderError {
    fn from(err: toml::de::Error) -> Self {
        TraderError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<reqwest::Error> for TraderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TraderError::Timeout(err.to_string())
        } else if err.is_decode() {
            TraderError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            TraderError::Http(status.as_u16())
        } else {
            TraderError::Network(err.to_string())
        }
    }
}

impl From<crate::config::ConfigError> for TraderError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::FileNotFound(path) => TraderError::ConfigNotFound(path),
            ConfigError::FileRead(msg) => TraderError::FileRead(msg),
            ConfigError::FileWrite(msg) => TraderError::FileWrite(msg),
            ConfigError::Parse(msg) | ConfigError::Serialize(msg) => TraderError::ConfigParse(msg),
            ConfigError::Validation(msg) => TraderError::ConfigValidation(msg),
        }
    }
}

impl From<String> for TraderError {
    fn from(msg: String) -> Self {
        TraderError::Internal(msg)
    }
}

impl From<&str> for TraderError {
    fn from(msg: &str) -> Self {
        TraderError::Internal(msg.to_string())
    }
}

/// Result type alias using TraderError
pub type TraderResult<T> = Result<T, TraderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TraderError::NotFound("alice".to_string());
        assert!(err.to_string().contains("alice"));

        let err = TraderError::exchange("InvalidSignature", "");
        assert_eq!(err.to_string(), "Exchange error: InvalidSignature");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(TraderError::Validation("x".into()).category(), "validation");
        assert_eq!(TraderError::Crypto("x".into()).category(), "crypto");
        assert_eq!(TraderError::Timeout("x".into()).category(), "network");
        assert_eq!(TraderError::exchange("r", "m").category(), "exchange");
        assert_eq!(TraderError::State("x".into()).category(), "state");
    }

    #[test]
    fn test_retryable() {
        assert!(TraderError::Network("down".into()).is_retryable());
        assert!(TraderError::Http(502).is_retryable());
        assert!(!TraderError::Crypto("bad".into()).is_retryable());
        assert!(!TraderError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn test_user_message() {
        let msg = TraderError::Crypto("authentication tag mismatch".into()).user_message();
        assert!(msg.contains("Wrong password or corrupt file"));

        let msg = TraderError::RoleNotPermitted("alice".into(), "fund manager").user_message();
        assert!(msg.contains("--fund-manager"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "probe");
        let err: TraderError = io_err.into();
        assert!(matches!(err, TraderError::Timeout(_)));
    }
}
