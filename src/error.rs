//! Error and result.
//!
//! The crate uses a single error type everywhere. It wraps `io::Error`
//! rather than hiding it, since most callers ultimately want to know
//! whether a failure was a would-block condition, a timeout, or something
//! genuinely fatal.

use std::error;
use std::fmt;
use std::io;
use std::result;

#[cfg(feature = "tls")]
use openssl::ssl::Error as SslError;

//------------ Error ---------------------------------------------------------

/// The error type.
#[derive(Debug)]
pub enum Error {
    /// An I/O error, including would-block conditions surfaced from a
    /// non-blocking socket.
    Io(io::Error),
    /// A TLS engine reported a fatal, non-recoverable condition.
    Tls(String),
    /// A blocking operation exceeded its deadline.
    Timeout,
    /// An operation was attempted on a connection that isn't in a state
    /// that supports it (not yet connected, or already closed/errored).
    NotConnected,
}

impl Error {
    /// Whether this error is simply "try again later", i.e. the
    /// underlying socket would have blocked.
    pub fn would_block(&self) -> bool {
        match *self {
            Error::Io(ref err) => err.kind() == io::ErrorKind::WouldBlock,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => err.fmt(f),
            Error::Tls(ref msg) => f.write_str(msg),
            Error::Timeout => f.write_str("operation timed out"),
            Error::NotConnected => f.write_str("connection is not in a usable state"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(feature = "tls")]
impl From<SslError> for Error {
    /// Converts a fatal TLS engine error. `WantRead`/`WantWrite` are not
    /// errors in the usual sense -- callers driving a handshake or a
    /// `read`/`write` should classify those themselves before falling
    /// back to this conversion for anything left over.
    fn from(err: SslError) -> Error {
        if let Some(io_err) = err.io_error() {
            return Error::Io(io::Error::new(io_err.kind(), io_err.to_string()));
        }
        Error::Tls(err.to_string())
    }
}

#[cfg(feature = "tls")]
impl From<openssl::error::ErrorStack> for Error {
    fn from(err: openssl::error::ErrorStack) -> Error {
        Error::Tls(err.to_string())
    }
}

//------------ Result ---------------------------------------------------------

pub type Result<T> = result::Result<T, Error>;
