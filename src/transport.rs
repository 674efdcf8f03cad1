//! The internal transport abstraction.
//!
//! `Transport` is what lets [Connection][crate::Connection] be a single
//! concrete type regardless of whether it is backed by a plain TCP stream
//! or a TLS session on top of one. It is not exposed publicly: the
//! distinction between transports only matters to the two implementations
//! in [crate::tcp] and [crate::tls], never to a caller holding a
//! `Connection`.

use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::connection::ConnCore;
use crate::error::Result;
use crate::registrar::{Interest, Registrar};

/// The outcome of driving a connect or accept handshake one step further.
pub(crate) enum Progress {
    /// Still waiting on more readiness events.
    Pending,
    /// The handshake is done, successfully or not.
    Done(Result<()>),
}

/// Transport-specific mechanics, factored out of [Connection][crate::connection::Connection].
///
/// Every method is given the connection's shared [ConnCore] and the
/// [Registrar] it was created with; transport implementations use these
/// to update physical readiness registration but never touch handler
/// slots or fire callbacks themselves -- that dispatch logic lives in
/// `Connection` and is shared across transports.
pub(crate) trait Transport: Send {
    /// Starts an outbound connection to `addr`. Must leave `core.fd` set
    /// and the socket registered for at least write-readiness.
    fn start_connect(
        &mut self,
        core: &mut ConnCore,
        registrar: &dyn Registrar,
        addr: SocketAddr,
    ) -> Result<()>;

    /// Starts setting up a transport on top of an already-accepted
    /// socket. For a transport with no handshake (plain TCP) this
    /// completes immediately.
    fn start_accept(&mut self, core: &mut ConnCore, registrar: &dyn Registrar) -> Result<()>;

    /// Advances an in-flight connect on a readiness event.
    fn poll_connect(
        &mut self,
        core: &mut ConnCore,
        registrar: &dyn Registrar,
        ready: Interest,
    ) -> Progress;

    /// Advances an in-flight accept-side handshake on a readiness event.
    fn poll_accept(
        &mut self,
        core: &mut ConnCore,
        registrar: &dyn Registrar,
        ready: Interest,
    ) -> Progress;

    /// A non-blocking logical read. Returns `Error::would_block` (checked
    /// via [`Error::would_block`][crate::error::Error::would_block]) when
    /// there is nothing available right now.
    fn read(&mut self, core: &mut ConnCore, registrar: &dyn Registrar, buf: &mut [u8]) -> Result<usize>;

    /// A non-blocking logical write.
    fn write(&mut self, core: &mut ConnCore, registrar: &dyn Registrar, buf: &[u8]) -> Result<usize>;

    /// Recomputes physical read/write registration from the logical
    /// handler slots and any outstanding inversion bits, and applies it
    /// through `registrar`. Called after every dispatch while
    /// `Connected`.
    fn reconcile(&mut self, core: &mut ConnCore, registrar: &dyn Registrar);

    /// Whether the transport is holding already-received plaintext that
    /// a reader hasn't drained yet (relevant for transports that buffer
    /// internally, such as TLS).
    fn has_pending(&self) -> bool {
        false
    }

    /// Tears down the transport's own resources. `core`'s fd and
    /// registration bookkeeping are handled by the caller.
    fn shutdown(&mut self, core: &mut ConnCore, registrar: &dyn Registrar);

    /// A blocking connect with an overall deadline, used by the
    /// synchronous facade in [crate::sync].
    fn blocking_connect(&mut self, core: &mut ConnCore, addr: SocketAddr, timeout: Duration) -> Result<()>;

    /// A blocking read with a deadline.
    fn sync_read(&mut self, core: &mut ConnCore, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// A blocking write with a deadline.
    fn sync_write(&mut self, core: &mut ConnCore, buf: &[u8], timeout: Duration) -> Result<usize>;

    /// The raw descriptor backing this transport, once known.
    fn fd(&self) -> Option<RawFd>;
}
