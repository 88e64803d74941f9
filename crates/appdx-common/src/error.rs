use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppdError {
    #[error("{host} - transport error: {reason}")]
    Transport { host: String, reason: String },
    #[error("{host} - authentication failed: {reason}")]
    Authentication { host: String, reason: String },
    #[error("{host} - {context} failed with code:{status}")]
    Fetch {
        host: String,
        context: String,
        status: u16,
    },
    #[error("{host} - {context} failed to parse response body: {reason}")]
    Parse {
        host: String,
        context: String,
        reason: String,
    },
    #[error("{0} - session is closed")]
    SessionClosed(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppdError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Authentication { .. } => "authentication",
            Self::Fetch { .. } => "fetch",
            Self::Parse { .. } => "parse",
            Self::SessionClosed(_) => "session_closed",
            Self::Config(_) => "config",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Internal(_) => "internal",
            Self::Io(_) => "io",
        }
    }

    /// Controller host the failure is attributed to, when there is one.
    pub fn controller(&self) -> Option<&str> {
        match self {
            Self::Transport { host, .. }
            | Self::Authentication { host, .. }
            | Self::Fetch { host, .. }
            | Self::Parse { host, .. } => Some(host),
            Self::SessionClosed(host) => Some(host),
            Self::Config(_) | Self::InvalidArgument(_) | Self::Internal(_) | Self::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppdError>;

#[cfg(test)]
mod tests {
    use super::AppdError;

    #[test]
    fn fetch_error_reports_status_and_host() {
        let err = AppdError::Fetch {
            host: "ctl.example.com".to_string(),
            context: "Gathering applications".to_string(),
            status: 503,
        };

        assert_eq!(err.kind(), "fetch");
        assert_eq!(err.controller(), Some("ctl.example.com"));
        assert_eq!(
            err.to_string(),
            "ctl.example.com - Gathering applications failed with code:503"
        );
    }

    #[test]
    fn config_error_has_no_controller() {
        let err = AppdError::Config("bad mapping".to_string());
        assert_eq!(err.controller(), None);
    }
}
