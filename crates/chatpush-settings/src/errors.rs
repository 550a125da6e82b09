//! Why a settings load was refused.

use std::path::PathBuf;

/// Settings could not be loaded; the server must not start.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        /// File that was opened.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The settings file is not JSON, or a field has the wrong type.
    #[error("settings file {} is malformed: {source}", path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Decoder failure, with line and column.
        source: serde_json::Error,
    },
    /// The compiled defaults could not be turned into a JSON document.
    #[error("cannot encode default settings: {0}")]
    Defaults(#[source] serde_json::Error),
    /// Values that parse but cannot work together at runtime.
    #[error("{field}: {reason}")]
    Invalid {
        /// camelCase key as written in the settings file.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/chatpush.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let text = err.to_string();
        assert!(text.contains("/etc/chatpush.json"), "{text}");
        assert!(text.contains("denied"), "{text}");
    }

    #[test]
    fn parse_keeps_position() {
        let source = serde_json::from_str::<serde_json::Value>("{\n  oops").unwrap_err();
        let err = SettingsError::Parse {
            path: PathBuf::from("settings.json"),
            source,
        };
        let text = err.to_string();
        assert!(text.starts_with("settings file settings.json is malformed"), "{text}");
        assert!(text.contains("line 2"), "{text}");
    }

    #[test]
    fn invalid_names_the_field() {
        let err = SettingsError::invalid("sendQueueCapacity", "must be at least 1");
        assert_eq!(err.to_string(), "sendQueueCapacity: must be at least 1");
    }
}
