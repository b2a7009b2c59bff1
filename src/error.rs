use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything a logical call can be rejected with.
#[derive(Debug)]
pub enum Error {
    /// Connection, DNS, TLS or timeout failure reported by the transport.
    Transport(BoxError),
    /// The redirect chain went past `max_redirects`.
    TooManyRedirects { max: usize },
    /// The response body could not be parsed in JSON decode mode.
    InvalidJson(serde_json::Error),
    /// A pre-send or post-response step failed (cookie jar, body length query).
    Adapter {
        step: &'static str,
        source: BoxError,
    },
    /// The request URL, or a redirect target, is not a usable URL.
    InvalidUrl { url: String, reason: String },
    /// The wire request could not be assembled from the descriptor.
    Http(http::Error),
}

impl Error {
    pub(crate) fn adapter(step: &'static str, source: BoxError) -> Self {
        Error::Adapter { step, source }
    }

    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_too_many_redirects(&self) -> bool {
        matches!(self, Error::TooManyRedirects { .. })
    }

    /// Check if the transport gave up because the call's timeout elapsed
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Transport(err) => err.downcast_ref::<TimedOut>().is_some(),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(err) => write!(f, "{}", err),
            Error::TooManyRedirects { max } => {
                write!(f, "Too many redirects (limit {})", max)
            }
            Error::InvalidJson(_) => write!(f, "Invalid JSON"),
            Error::Adapter { step, source } => write!(f, "{} failed: {}", step, source),
            Error::InvalidUrl { url, reason } => write!(f, "Invalid URL {:?}: {}", url, reason),
            Error::Http(err) => write!(f, "Invalid request: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(err) => Some(err.as_ref()),
            Error::InvalidJson(err) => Some(err),
            Error::Adapter { source, .. } => Some(source.as_ref()),
            Error::Http(err) => Some(err),
            Error::TooManyRedirects { .. } | Error::InvalidUrl { .. } => None,
        }
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Error::Http(err)
    }
}

/// The transport's deadline elapsed before a response head arrived.
#[derive(Debug)]
pub struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request timed out")
    }
}

impl std::error::Error for TimedOut {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::TooManyRedirects { max: 3 }.to_string(),
            "Too many redirects (limit 3)"
        );
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(Error::InvalidJson(err).to_string(), "Invalid JSON");
        let err = Error::adapter("cookie lookup", "jar is closed".into());
        assert_eq!(err.to_string(), "cookie lookup failed: jar is closed");
    }

    #[test]
    fn test_timeout_detection() {
        assert!(Error::Transport(Box::new(TimedOut)).is_timeout());
        assert!(!Error::Transport("connection refused".into()).is_timeout());
        assert!(!Error::TooManyRedirects { max: 0 }.is_timeout());
    }
}
