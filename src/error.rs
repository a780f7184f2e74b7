use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single submission. Every variant is shown to the user as the
/// same "upload failed" notification; the detail only goes to the log.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("failed to send request: {0}")]
    Transport(String),

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("upload failed with status: {0}")]
    Status(u16),

    #[error("unexpected response body: {0}")]
    Protocol(String),
}

impl SubmitError {
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            SubmitError::Timeout { secs: timeout_secs }
        } else if let Some(status) = err.status() {
            SubmitError::Status(status.as_u16())
        } else {
            SubmitError::Transport(err.to_string())
        }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, SubmitError::Protocol(_))
    }
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("there is no markup result to export")]
    NothingToExport,

    #[error("an export is already running")]
    AlreadyRunning,

    #[error("PDF generation failed: {0}")]
    Pdf(String),

    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rejections raised by the session guards. Nothing is sent over the network
/// when one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no file selected")]
    NoFileSelected,

    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_includes_code() {
        let e = SubmitError::Status(500);
        assert!(e.to_string().contains("500"), "got: {e}");
        assert!(!e.is_protocol());
    }

    #[test]
    fn invalid_transition_display() {
        let e = SessionError::InvalidTransition {
            from: "submitting",
            action: "submit",
        };
        assert_eq!(e.to_string(), "cannot submit while submitting");
    }
}
