//! Custom error types for autokey.
//!
//! Every failure class the tool can hit has its own variant so callers can
//! decide what to do with it: seed defaults when the config file is missing,
//! skip a single action when a key cannot be resolved, degrade when a hotkey
//! cannot be claimed. None of them is fatal to a running playback.

use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main error type for autokey operations.
#[derive(Error, Debug)]
pub enum AutoKeyError {
    /// The config file does not exist.
    #[error("config file '{path}' does not exist")]
    ConfigNotFound { path: String },

    /// The config file exists but could not be read or parsed.
    #[error("failed to load config from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Error writing configuration file.
    #[error("failed to save config to '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    /// Configuration validation error.
    #[error("configuration error: {0}")]
    ConfigValidation(String),

    /// The specified key is invalid or unsupported.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Error parsing a key combination.
    #[error("invalid key combination '{combo}': {reason}")]
    InvalidKeyCombination { combo: String, reason: String },

    /// Modifier combinations cannot be posted to a background window.
    #[error("'{combo}' cannot be delivered to a background window: only single keys are supported")]
    UnsupportedBackgroundCombo { combo: String },

    /// The bound window handle no longer refers to a live window.
    #[error("window {window_id:#x} no longer exists")]
    StaleWindow { window_id: u64 },

    /// Error sending key to window.
    #[error("failed to send key '{key}' to window {window_id:#x}: {reason}")]
    KeySendFailed {
        key: String,
        window_id: u64,
        reason: String,
    },

    /// Synthetic input was rejected by the OS.
    #[error("input injection failed: {0}")]
    InputFailed(String),

    /// Error registering or handling hotkey.
    #[error("hotkey error: {0}")]
    Hotkey(String),

    /// Two hotkey bindings resolve to the same combination.
    #[error("hotkeys '{first}' and '{second}' are both bound to '{combo}'")]
    HotkeyConflict {
        first: String,
        second: String,
        combo: String,
    },

    /// The playback worker did not finish within the shutdown grace period.
    #[error("playback worker did not stop within {0:?}; abandoned")]
    ShutdownTimeout(Duration),

    /// Platform-specific operation is not supported.
    #[error("operation not supported on this platform: {0}")]
    UnsupportedPlatform(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for autokey operations.
pub type Result<T> = std::result::Result<T, AutoKeyError>;

impl AutoKeyError {
    /// Create a new ConfigNotFound error.
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.display().to_string(),
        }
    }

    /// Create a new ConfigLoad error.
    pub fn config_load(path: &Path, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigSave error.
    pub fn config_save(path: &Path, reason: impl Into<String>) -> Self {
        Self::ConfigSave {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigValidation error.
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    /// Create a new InvalidKey error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidKeyCombination error.
    pub fn invalid_key_combination(combo: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKeyCombination {
            combo: combo.into(),
            reason: reason.into(),
        }
    }

    /// Create a new KeySendFailed error.
    pub fn key_send_failed(
        key: impl Into<String>,
        window_id: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self::KeySendFailed {
            key: key.into(),
            window_id,
            reason: reason.into(),
        }
    }

    /// Create a new InputFailed error.
    pub fn input_failed(message: impl Into<String>) -> Self {
        Self::InputFailed(message.into())
    }

    /// Create a new Hotkey error.
    pub fn hotkey(message: impl Into<String>) -> Self {
        Self::Hotkey(message.into())
    }

    /// Create a new UnsupportedPlatform error.
    pub fn unsupported_platform(message: impl Into<String>) -> Self {
        Self::UnsupportedPlatform(message.into())
    }

    /// True when the error only means "there is no file yet".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ConfigNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AutoKeyError::invalid_key("xyz", "unknown key");
        assert_eq!(err.to_string(), "invalid key 'xyz': unknown key");

        let err = AutoKeyError::config_validation("no actions configured");
        assert_eq!(
            err.to_string(),
            "configuration error: no actions configured"
        );

        let err = AutoKeyError::StaleWindow { window_id: 0x1f };
        assert_eq!(err.to_string(), "window 0x1f no longer exists");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: AutoKeyError = io_err.into();
        assert!(matches!(err, AutoKeyError::Io(_)));
    }

    #[test]
    fn test_not_found_is_distinct() {
        let missing = AutoKeyError::config_not_found(Path::new("default_config.json"));
        let broken = AutoKeyError::config_load(Path::new("default_config.json"), "EOF");
        assert!(missing.is_not_found());
        assert!(!broken.is_not_found());
    }
}
