//! Error taxonomy for the mailbox gateway
//!
//! One enum covers every failure mode described in the design: bad
//! request bodies, envelope/authentication failures, missing records,
//! upstream mail-server failures, and configuration problems. The
//! HTTP layer maps each variant to a status code exactly once (see
//! `http::error_response`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication failure")]
    AuthFailure,

    #[error("not found")]
    NotFound,

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status code for this error, per spec §7. `NotFound` is 400
    /// everywhere except the message endpoints, which map it to 404
    /// themselves rather than through this default (see
    /// `http::messages`).
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Config(_) | Self::Io(_) => 500,
            Self::Validation(_) | Self::AuthFailure | Self::Upstream(_) | Self::NotFound => 400,
        }
    }

    /// Machine-readable error code, used in the `{error, code}` body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::AuthFailure => "AuthFailure",
            Self::NotFound => "NotFound",
            Self::Upstream(_) => "Upstream",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "Io",
        }
    }
}

impl From<async_imap::error::Error> for Error {
    fn from(e: async_imap::error::Error) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for Error {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Self::Upstream(e.to_string())
    }
}
