use std::fmt;
use std::rc::Rc;

/// The failure carried by `end(Some(reason))` and `stop(Some(reason))`.
///
/// Errors are cheap to clone, because a single failure usually fans out to many consumers
/// (every subscriber of a shared stream, every index of a `combine`, ...).
///
/// # Examples
/// ```
/// use rill_streams::Error;
///
/// let err = Error::msg("socket closed");
/// assert_eq!(err.to_string(), "socket closed");
///
/// let not_enough = Error::NotEnoughEmissions { expected: 3, actual: 1 };
/// assert_eq!(not_enough.to_string(), "expected at least 3 emissions, but got 1");
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(Rc<str>),

    #[error("expected at least {expected} emissions, but got {actual}")]
    NotEnoughEmissions { expected: usize, actual: usize },

    #[error("{0}")]
    Custom(Rc<dyn std::error::Error>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn msg<M: fmt::Display>(message: M) -> Error {
        Error::Message(message.to_string().into())
    }

    /// Wraps any error type so it can travel through the protocol.
    pub fn custom<E: std::error::Error + 'static>(error: E) -> Error {
        Error::Custom(Rc::new(error))
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::msg(message)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Message(message.into())
    }
}
