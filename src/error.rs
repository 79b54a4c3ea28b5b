use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HuntError {
    #[error("no tabular store configured; pass --store or set HUNT_STORE (e.g. sqlite:jobs.db or sheets:<spreadsheet-id>)")]
    MissingStore,

    #[error("no email source configured; pass --source or set HUNT_SOURCE (e.g. imap:you@gmail.com, gmail:me or dir:./mail)")]
    MissingSource,

    #[error("invalid {kind} '{value}': {reason}")]
    InvalidLocator {
        kind: &'static str,
        value: String,
        reason: String,
    },

    #[error("{what} needs an OAuth access token; set GOOGLE_ACCESS_TOKEN or pass --access-token")]
    MissingToken { what: &'static str },

    #[error("cannot read credentials from {}: {reason}", .path.display())]
    UnreadableCredentials { path: PathBuf, reason: String },

    #[error("invalid URL rules: {0}")]
    InvalidRules(String),

    #[error("{what} failed: {message}")]
    Remote { what: String, message: String },
}

impl HuntError {
    /// Configuration problems abort the run before any message is touched.
    pub fn is_config(&self) -> bool {
        !matches!(self, HuntError::Remote { .. })
    }

    pub fn remote(what: impl Into<String>, message: impl ToString) -> Self {
        HuntError::Remote {
            what: what.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_flagged() {
        assert!(HuntError::MissingStore.is_config());
        assert!(HuntError::InvalidRules("x".into()).is_config());
        assert!(HuntError::MissingToken { what: "Gmail" }.is_config());
        assert!(
            HuntError::UnreadableCredentials {
                path: PathBuf::from("/nope/app_password.txt"),
                reason: "not found".into(),
            }
            .is_config()
        );
        assert!(!HuntError::remote("append Registry", "503").is_config());
    }

    #[test]
    fn test_messages_name_the_remedy() {
        assert!(HuntError::MissingStore.to_string().contains("HUNT_STORE"));
        assert!(HuntError::MissingSource.to_string().contains("--source"));
        assert_eq!(
            HuntError::remote("append LinkedIn", "quota").to_string(),
            "append LinkedIn failed: quota"
        );
    }
}
