use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    /// The API answered with anything other than 200.
    Request { status: u16, body: String },
    /// A token-only operation was attempted on an anonymous session.
    Unauthorized,
    ZoneNotFound { module: String, zone: u64 },
    TileNotFound { module: String, tile: u64 },
    Protocol(String),
    Io(std::io::Error),
}

impl Error {
    /// HTTP status associated with the error. `Unauthorized` reports 401
    /// even though it never reached the network.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Request { status, .. } => Some(*status),
            Error::Unauthorized => Some(401),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the caller should ask the user to log in again rather
    /// than treat the failure as transient.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status_code(), Some(401 | 403))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Request { status, body } => {
                write!(f, "request failed with status {status}: {body}")
            }
            Error::Unauthorized => write!(f, "unauthorized"),
            Error::ZoneNotFound { module, zone } => {
                write!(f, "zone {zone} not found in module {module}")
            }
            Error::TileNotFound { module, tile } => {
                write!(f, "tile {tile} not found in module {module}")
            }
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
