use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// What goes into the `Authorization` header.
///
/// Login uses the user's name and password; every later call uses the API
/// token handed out in the login snapshot.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    UsernamePassword { username: String, password: String },
    Token(String),
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UsernamePassword {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn token(api_token: impl Into<String>) -> Self {
        Self::Token(api_token.into())
    }

    pub fn as_header_value(&self) -> String {
        match self {
            Credentials::UsernamePassword { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
            }
            Credentials::Token(token) => format!("Bearer {}", STANDARD.encode(token)),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}
