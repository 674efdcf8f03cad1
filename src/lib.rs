//! A non-blocking TCP/TLS connection abstraction for event-driven
//! applications.
//!
//! See the [introduction](intro) for the shape of the design: a single
//! [Connection] type, fixed to one transport at creation, driven from
//! the outside by a [Registrar] the caller already has (or the bundled
//! [registrar::PollRegistrar] reference implementation if they don't).
//! The readiness loop itself -- the thing that owns a `Registrar`, polls
//! it, and calls [`Connection::notify_ready`] -- is not part of this
//! crate; see the introduction for why.

#[macro_use]
extern crate log;

#[cfg(feature = "tls")]
extern crate openssl;

pub use crate::connection::{drain_pending, Connection};
pub use crate::error::{Error, Result};
pub use crate::handlers::{AcceptHandler, ConnectHandler, ReadHandler, WriteHandler};
pub use crate::registrar::{Interest, NullRegistrar, PollRegistrar, Registrar};
pub use crate::state::ConnState;

#[cfg(feature = "tls")]
pub use crate::config::{clear_tls_config, install_tls_config, TlsConfig};

pub mod connection;

#[cfg(feature = "tls")]
pub mod config;

pub mod error;
pub mod handlers;
pub mod intro;
pub mod registrar;
pub mod state;
pub mod sync;

mod tcp;
mod transport;

#[cfg(feature = "tls")]
mod tls;
