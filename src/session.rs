use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

use crate::{Error, Result};

/// Durable form of an authenticated session, suitable for persisting in
/// host configuration and handing back to [`crate::TechClientBuilder::credentials`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub user_id: String,
    #[serde(serialize_with = "serialize_token")]
    pub token: SecretString,
}

// Persisting is the one place the token leaves the secret wrapper.
fn serialize_token<S: Serializer>(token: &SecretString, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(token.expose_secret())
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: SecretString::from(token.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated(Credentials),
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Session::Authenticated(creds) => Some(&creds.user_id),
            Session::Anonymous => None,
        }
    }

    /// Credentials for a token-only call, or `Unauthorized`.
    pub fn require(&self) -> Result<&Credentials> {
        match self {
            Session::Authenticated(creds) => Ok(creds),
            Session::Anonymous => Err(Error::Unauthorized),
        }
    }
}
