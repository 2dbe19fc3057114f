use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value parsed but the server cannot run with it.
    #[error("{key}: {reason}")]
    InvalidValue { key: &'static str, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_file() {
        let err = SettingsError::Io {
            path: PathBuf::from("/etc/scout/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /etc/scout/settings.json: denied");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_value_names_the_key() {
        let err = SettingsError::InvalidValue {
            key: "server.maxSendQueue",
            reason: "must be at least 1",
        };
        assert_eq!(err.to_string(), "server.maxSendQueue: must be at least 1");
    }
}
