//! Handler slot types.
//!
//! A [Connection][crate::Connection] does not take trait objects for its
//! callbacks; it takes plain boxed closures. `connect`/`accept` handlers
//! are single-shot (`FnOnce`) and are consumed the moment they fire.
//! `read`/`write` handlers persist across events until explicitly
//! replaced or cleared, so they are `FnMut`.

use crate::connection::Connection;

/// Fired once, when an outbound connect attempt resolves (successfully or
/// not -- check `conn.state()`/`conn.last_error()`).
pub type ConnectHandler = Box<dyn FnOnce(&mut Connection) + Send>;

/// Fired once, when an accepted connection finishes setting up its
/// transport (e.g. a TLS handshake) and becomes usable.
pub type AcceptHandler = Box<dyn FnOnce(&mut Connection) + Send>;

/// Fired whenever the connection has data available to read, until
/// replaced or cleared with [`Connection::set_read_handler`].
pub type ReadHandler = Box<dyn FnMut(&mut Connection) + Send>;

/// Fired whenever the connection is ready to accept more written data,
/// until replaced or cleared with [`Connection::set_write_handler`].
pub type WriteHandler = Box<dyn FnMut(&mut Connection) + Send>;
