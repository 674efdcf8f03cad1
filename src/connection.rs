//! The connection record.
//!
//! [Connection] is the single public type callers hold regardless of
//! whether it is backed by plain TCP or TLS; see [crate::transport] for
//! how that's done. Most of this module is concerned with one thing:
//! making sure a handler slot is always cleared before it's invoked, and
//! a still-registered persistent handler is never invoked twice for the
//! same readiness event.

use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{FromRawFd, IntoRawFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::handlers::{AcceptHandler, ConnectHandler, ReadHandler, WriteHandler};
use crate::registrar::{Interest, Registrar};
use crate::state::{ConnState, Inversion};
use crate::tcp::TcpTransport;
use crate::transport::{Progress, Transport};

#[cfg(feature = "tls")]
use crate::tls::TlsTransport;

/// Fields shared by every transport, and manipulated directly by
/// [crate::transport::Transport] implementations.
pub(crate) struct ConnCore {
    pub(crate) state: ConnState,
    pub(crate) fd: Option<RawFd>,
    pub(crate) last_error: Option<Error>,
    pub(crate) private_data: Option<Box<dyn Any + Send>>,

    pub(crate) read_handler: Option<ReadHandler>,
    pub(crate) write_handler: Option<WriteHandler>,
    pub(crate) connect_handler: Option<ConnectHandler>,
    pub(crate) accept_handler: Option<AcceptHandler>,

    pub(crate) read_registered: bool,
    pub(crate) write_registered: bool,

    /// Set to `true` by `set_read_handler`/`set_write_handler` whenever
    /// called while dispatch is in progress for that direction, so the
    /// dispatcher knows not to blindly put the old handler back.
    pub(crate) read_touched: bool,
    pub(crate) write_touched: bool,

    pub(crate) closed: bool,
    pub(crate) inversion: Inversion,
}

impl ConnCore {
    pub(crate) fn new() -> ConnCore {
        ConnCore {
            state: ConnState::None,
            fd: None,
            last_error: None,
            private_data: None,
            read_handler: None,
            write_handler: None,
            connect_handler: None,
            accept_handler: None,
            read_registered: false,
            write_registered: false,
            read_touched: false,
            write_touched: false,
            closed: false,
            inversion: Inversion::none(),
        }
    }
}

/// A non-blocking TCP or TLS connection.
///
/// A `Connection` is exclusively owned by whoever created it; this crate
/// never keeps a second reference to one. Its transport is fixed at
/// creation and never changes for the connection's lifetime.
pub struct Connection {
    pub(crate) core: ConnCore,
    transport: Box<dyn Transport>,
    registrar: Rc<dyn Registrar>,
}

impl Connection {
    /// Creates a new, not-yet-connected plain TCP connection.
    pub fn new_tcp(registrar: Rc<dyn Registrar>) -> Connection {
        Connection {
            core: ConnCore::new(),
            transport: Box::new(TcpTransport::new()),
            registrar,
        }
    }

    /// Creates a new, not-yet-connected TLS connection.
    #[cfg(feature = "tls")]
    pub fn new_tls(registrar: Rc<dyn Registrar>) -> Connection {
        Connection {
            core: ConnCore::new(),
            transport: Box::new(TlsTransport::new()),
            registrar,
        }
    }

    /// Wraps an already-accepted plain TCP socket. The caller must still
    /// call [`accept`][Connection::accept] to receive the completion
    /// callback (for plain TCP this resolves immediately, but the
    /// two-phase shape is kept uniform across transports).
    pub fn from_accepted_tcp(registrar: Rc<dyn Registrar>, stream: mio::net::TcpStream) -> Connection {
        Connection {
            core: ConnCore::new(),
            transport: Box::new(TcpTransport::from_stream(stream)),
            registrar,
        }
    }

    /// Wraps an already-accepted TCP socket on which a TLS handshake
    /// should be performed as the server.
    #[cfg(feature = "tls")]
    pub fn from_accepted_tls(registrar: Rc<dyn Registrar>, stream: mio::net::TcpStream) -> Connection {
        Connection {
            core: ConnCore::new(),
            transport: Box::new(TlsTransport::from_stream(stream)),
            registrar,
        }
    }

    /// Test-only seam: builds a `Connection` around an arbitrary transport
    /// double, for modules outside this one that need to drive
    /// `notify_ready`'s dispatch logic with a mock engine.
    #[cfg(test)]
    pub(crate) fn new_for_test(registrar: Rc<dyn Registrar>, transport: Box<dyn Transport>) -> Connection {
        Connection { core: ConnCore::new(), transport, registrar }
    }

    //-------- introspection --------------------------------------------

    pub fn state(&self) -> ConnState {
        self.core.state
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.core.fd
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.core.last_error.as_ref()
    }

    /// Whether the transport is holding decoded data that a read handler
    /// hasn't been given yet. TLS can have this be `true` right after a
    /// dispatch with no further socket event pending.
    pub fn has_pending(&self) -> bool {
        self.transport.has_pending()
    }

    pub fn set_private_data<T: Any + Send>(&mut self, data: T) {
        self.core.private_data = Some(Box::new(data));
    }

    pub fn private_data<T: Any + Send>(&self) -> Option<&T> {
        self.core.private_data.as_ref().and_then(|d| d.downcast_ref())
    }

    pub fn private_data_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.core.private_data.as_mut().and_then(|d| d.downcast_mut())
    }

    /// Briefly borrows the fd as a `socket2::Socket` to run `f`, then gives
    /// the descriptor back without closing it -- the same borrow-and-return
    /// trick the transports use for OS-level socket options this crate
    /// otherwise has no direct handle to.
    fn with_socket<R>(&self, f: impl FnOnce(&socket2::Socket) -> io::Result<R>) -> Result<R> {
        let fd = self.core.fd.ok_or(Error::NotConnected)?;
        let socket = unsafe { socket2::Socket::from_raw_fd(fd) };
        let result = f(&socket);
        let _ = socket.into_raw_fd();
        result.map_err(Error::from)
    }

    /// The address of the remote end of this connection's socket.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.with_socket(|s| {
            s.peer_addr()?.as_socket().ok_or_else(|| io::Error::new(io::ErrorKind::Other, "not an inet socket"))
        })
    }

    /// Reads and clears the socket's pending error, if any, without
    /// affecting the connection's own lifecycle state.
    pub fn take_socket_error(&self) -> Result<Option<io::Error>> {
        self.with_socket(|s| s.take_error())
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.with_socket(|s| s.set_nonblocking(nonblocking))
    }

    pub fn set_tcp_nodelay(&self, nodelay: bool) -> Result<()> {
        self.with_socket(|s| s.set_nodelay(nodelay))
    }

    /// Enables TCP keepalive with the given probe interval, or disables it
    /// when `interval` is `None`.
    pub fn set_keepalive(&self, interval: Option<Duration>) -> Result<()> {
        self.with_socket(|s| match interval {
            Some(interval) => {
                s.set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(interval))?;
                s.set_keepalive(true)
            }
            None => s.set_keepalive(false),
        })
    }

    pub fn set_send_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.with_socket(|s| s.set_write_timeout(timeout))
    }

    //-------- lifecycle --------------------------------------------------

    /// Starts an outbound connect. `on_done` fires exactly once, whether
    /// the attempt succeeds or fails -- including failures discovered
    /// synchronously.
    pub fn connect(&mut self, addr: SocketAddr, on_done: ConnectHandler) -> Result<()> {
        if self.core.state != ConnState::None {
            return Err(Error::NotConnected);
        }
        self.core.connect_handler = Some(on_done);
        match self.transport.start_connect(&mut self.core, &*self.registrar, addr) {
            Ok(()) => {
                debug!("connect to {} started, fd={:?}", addr, self.core.fd);
                self.core.state = ConnState::Connecting;
                Ok(())
            }
            Err(err) => {
                warn!("connect to {} failed synchronously: {}", addr, err);
                self.core.last_error = Some(clone_for_storage(&err));
                self.core.state = ConnState::Error;
                self.fire_connect();
                Err(err)
            }
        }
    }

    /// Starts setting up the transport on an accepted socket. `on_done`
    /// fires exactly once.
    pub fn accept(&mut self, on_done: AcceptHandler) -> Result<()> {
        if self.core.state != ConnState::None {
            return Err(Error::NotConnected);
        }
        self.core.accept_handler = Some(on_done);
        match self.transport.start_accept(&mut self.core, &*self.registrar) {
            Ok(()) => {
                debug!("accept started, fd={:?}", self.core.fd);
                self.core.state = ConnState::Accepting;
                // A transport with no handshake (plain TCP) is already
                // usable; poll once synchronously rather than waiting for
                // an event that will never come.
                if let Progress::Done(result) =
                    self.transport.poll_accept(&mut self.core, &*self.registrar, Interest::NONE)
                {
                    self.finish_accept(result);
                }
                Ok(())
            }
            Err(err) => {
                self.core.last_error = Some(clone_for_storage(&err));
                self.core.state = ConnState::Error;
                self.fire_accept();
                Err(err)
            }
        }
    }

    /// Closes the connection: deregisters it, tears down the transport,
    /// and marks it terminal. Idempotent.
    pub fn close(&mut self) {
        if self.core.closed {
            return;
        }
        debug!("closing connection, fd={:?}", self.core.fd);
        if let Some(fd) = self.core.fd.take() {
            let _ = self.registrar.deregister(fd);
        }
        self.transport.shutdown(&mut self.core, &*self.registrar);
        self.core.read_registered = false;
        self.core.write_registered = false;
        self.core.closed = true;
        self.core.state = ConnState::Closed;
    }

    //-------- handler slots -----------------------------------------------

    pub fn set_read_handler(&mut self, handler: Option<ReadHandler>) -> Result<()> {
        if self.core.closed {
            return Err(Error::NotConnected);
        }
        self.core.read_handler = handler;
        self.core.read_touched = true;
        if self.core.state == ConnState::Connected {
            self.transport.reconcile(&mut self.core, &*self.registrar);
        }
        Ok(())
    }

    pub fn set_write_handler(&mut self, handler: Option<WriteHandler>) -> Result<()> {
        if self.core.closed {
            return Err(Error::NotConnected);
        }
        self.core.write_handler = handler;
        self.core.write_touched = true;
        if self.core.state == ConnState::Connected {
            self.transport.reconcile(&mut self.core, &*self.registrar);
        }
        Ok(())
    }

    //-------- I/O -----------------------------------------------------------

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.core.state != ConnState::Connected {
            return Err(Error::NotConnected);
        }
        let result = self.transport.read(&mut self.core, &*self.registrar, buf);
        if self.core.state == ConnState::Connected {
            self.transport.reconcile(&mut self.core, &*self.registrar);
        }
        result
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.core.state != ConnState::Connected {
            return Err(Error::NotConnected);
        }
        let result = self.transport.write(&mut self.core, &*self.registrar, buf);
        if self.core.state == ConnState::Connected {
            self.transport.reconcile(&mut self.core, &*self.registrar);
        }
        result
    }

    //-------- event dispatch -------------------------------------------------

    /// Advances the connection on a readiness notification for `ready`.
    ///
    /// This is the only entry point the (external, not-part-of-this-crate)
    /// readiness loop needs: it is told which fd became ready for which
    /// directions, looks up the `Connection` that fd belongs to by
    /// whatever means it likes, and calls this method.
    pub fn notify_ready(&mut self, ready: Interest) {
        match self.core.state {
            ConnState::Connecting => {
                if let Progress::Done(result) = self.transport.poll_connect(&mut self.core, &*self.registrar, ready) {
                    self.finish_connect(result);
                }
            }
            ConnState::Accepting => {
                if let Progress::Done(result) = self.transport.poll_accept(&mut self.core, &*self.registrar, ready) {
                    self.finish_accept(result);
                }
            }
            ConnState::Connected => {
                let inversion = self.core.inversion;
                let mut read_fired = false;
                let mut write_fired = false;

                if ready.is_readable() && inversion.write_wants_read() {
                    trace!("fd={:?} write-wants-read resolved by read readiness", self.core.fd);
                    self.core.inversion.clear_write_wants_read();
                    self.dispatch_write();
                    write_fired = true;
                }
                if ready.is_writable() && inversion.read_wants_write() {
                    trace!("fd={:?} read-wants-write resolved by write readiness", self.core.fd);
                    self.core.inversion.clear_read_wants_write();
                    self.dispatch_read();
                    read_fired = true;
                }
                if ready.is_readable() && !read_fired && self.core.read_handler.is_some() {
                    self.dispatch_read();
                }
                if ready.is_writable() && !write_fired && self.core.write_handler.is_some() {
                    self.dispatch_write();
                }
                if self.core.state == ConnState::Connected {
                    self.transport.reconcile(&mut self.core, &*self.registrar);
                    self.drain_self();
                }
            }
            ConnState::None | ConnState::Error | ConnState::Closed => {}
        }
    }

    /// Keeps invoking the read handler while the transport still holds
    /// decoded data and no new socket event is needed to produce more of
    /// it. A no-op for transports (like plain TCP) that never buffer.
    fn drain_self(&mut self) {
        while self.core.state == ConnState::Connected
            && self.transport.has_pending()
            && self.core.read_handler.is_some()
        {
            self.dispatch_read();
        }
    }

    fn finish_connect(&mut self, result: Result<()>) {
        match result {
            Ok(()) => {
                debug!("connect complete, fd={:?}", self.core.fd);
                self.core.state = ConnState::Connected;
            }
            Err(err) => {
                warn!("connect failed: {}", err);
                self.core.last_error = Some(err);
                self.core.state = ConnState::Error;
            }
        }
        self.fire_connect();
    }

    fn finish_accept(&mut self, result: Result<()>) {
        match result {
            Ok(()) => {
                debug!("accept complete, fd={:?}", self.core.fd);
                self.core.state = ConnState::Connected;
            }
            Err(err) => {
                warn!("accept failed: {}", err);
                self.core.last_error = Some(err);
                self.core.state = ConnState::Error;
            }
        }
        self.fire_accept();
    }

    fn fire_connect(&mut self) {
        if let Some(cb) = self.core.connect_handler.take() {
            cb(self);
        }
    }

    fn fire_accept(&mut self) {
        if let Some(cb) = self.core.accept_handler.take() {
            cb(self);
        }
    }

    fn dispatch_read(&mut self) {
        if let Some(mut cb) = self.core.read_handler.take() {
            self.core.read_touched = false;
            cb(self);
            if !self.core.closed && !self.core.read_touched {
                self.core.read_handler = Some(cb);
            }
        }
    }

    fn dispatch_write(&mut self) {
        if let Some(mut cb) = self.core.write_handler.take() {
            self.core.write_touched = false;
            cb(self);
            if !self.core.closed && !self.core.write_touched {
                self.core.write_handler = Some(cb);
            }
        }
    }

    //-------- blocking facade, see crate::sync ------------------------------

    pub fn blocking_connect(&mut self, addr: SocketAddr, timeout: Duration) -> Result<()> {
        if self.core.state != ConnState::None {
            return Err(Error::NotConnected);
        }
        let result = self.transport.blocking_connect(&mut self.core, addr, timeout);
        self.core.state = if result.is_ok() { ConnState::Connected } else { ConnState::Error };
        if let Err(ref err) = result {
            self.core.last_error = Some(clone_for_storage(err));
        }
        result
    }

    pub fn sync_read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.core.state != ConnState::Connected {
            return Err(Error::NotConnected);
        }
        self.transport.sync_read(&mut self.core, buf, timeout)
    }

    pub fn sync_write(&mut self, buf: &[u8], timeout: Duration) -> Result<usize> {
        if self.core.state != ConnState::Connected {
            return Err(Error::NotConnected);
        }
        self.transport.sync_write(&mut self.core, buf, timeout)
    }
}

/// Host-loop hook: call once per iteration, typically right before the
/// registrar blocks waiting for the next event, so TLS connections that
/// are sitting on buffered plaintext the socket layer already delivered
/// (and so will generate no further readable event) still get to run
/// their read handler. A no-op for connections with nothing pending.
pub fn drain_pending<'a, I>(connections: I)
where
    I: IntoIterator<Item = &'a mut Connection>,
{
    for conn in connections {
        conn.drain_self();
    }
}

/// `Error` can't derive `Clone` (`io::Error` doesn't), but we sometimes
/// need to both return an error and stash a copy of it on `core`.
fn clone_for_storage(err: &Error) -> Error {
    match *err {
        Error::Io(ref io_err) => Error::Io(std::io::Error::new(io_err.kind(), io_err.to_string())),
        Error::Tls(ref msg) => Error::Tls(msg.clone()),
        Error::Timeout => Error::Timeout,
        Error::NotConnected => Error::NotConnected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar::NullRegistrar;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A transport double that reports one byte of buffered plaintext
    /// until it has been read once, for exercising `drain_pending`
    /// without a real TLS session.
    struct PendingOnceTransport {
        pending: bool,
    }

    impl Transport for PendingOnceTransport {
        fn start_connect(&mut self, _: &mut ConnCore, _: &dyn Registrar, _: SocketAddr) -> Result<()> {
            Ok(())
        }
        fn start_accept(&mut self, _: &mut ConnCore, _: &dyn Registrar) -> Result<()> {
            Ok(())
        }
        fn poll_connect(&mut self, _: &mut ConnCore, _: &dyn Registrar, _: Interest) -> Progress {
            Progress::Done(Ok(()))
        }
        fn poll_accept(&mut self, _: &mut ConnCore, _: &dyn Registrar, _: Interest) -> Progress {
            Progress::Done(Ok(()))
        }
        fn read(&mut self, _: &mut ConnCore, _: &dyn Registrar, buf: &mut [u8]) -> Result<usize> {
            self.pending = false;
            buf[0] = b'x';
            Ok(1)
        }
        fn write(&mut self, _: &mut ConnCore, _: &dyn Registrar, buf: &[u8]) -> Result<usize> {
            Ok(buf.len())
        }
        fn reconcile(&mut self, _: &mut ConnCore, _: &dyn Registrar) {}
        fn has_pending(&self) -> bool {
            self.pending
        }
        fn shutdown(&mut self, _: &mut ConnCore, _: &dyn Registrar) {}
        fn blocking_connect(&mut self, _: &mut ConnCore, _: SocketAddr, _: Duration) -> Result<()> {
            Ok(())
        }
        fn sync_read(&mut self, _: &mut ConnCore, _: &mut [u8], _: Duration) -> Result<usize> {
            Ok(0)
        }
        fn sync_write(&mut self, _: &mut ConnCore, _: &[u8], _: Duration) -> Result<usize> {
            Ok(0)
        }
        fn fd(&self) -> Option<RawFd> {
            None
        }
    }

    fn registrar() -> Rc<dyn Registrar> {
        Rc::new(NullRegistrar::new())
    }

    #[test]
    fn connect_requires_none_state() {
        let mut conn = Connection::new_tcp(registrar());
        conn.core.state = ConnState::Connected;
        let result = conn.connect("127.0.0.1:0".parse().unwrap(), Box::new(|_| {}));
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[test]
    fn read_handler_persists_unless_touched() {
        let mut conn = Connection::new_tcp(registrar());
        conn.core.state = ConnState::Connected;
        let calls = Rc::new(RefCell::new(0));
        let calls_clone = calls.clone();
        conn.set_read_handler(Some(Box::new(move |_conn| {
            *calls_clone.borrow_mut() += 1;
        })))
        .unwrap();

        conn.dispatch_read();
        assert_eq!(*calls.borrow(), 1);
        assert!(conn.core.read_handler.is_some());

        conn.dispatch_read();
        assert_eq!(*calls.borrow(), 2);
    }

    #[test]
    fn read_handler_cleared_inside_callback_stays_cleared() {
        let mut conn = Connection::new_tcp(registrar());
        conn.core.state = ConnState::Connected;
        conn.set_read_handler(Some(Box::new(|conn| {
            conn.set_read_handler(None).unwrap();
        })))
        .unwrap();

        conn.dispatch_read();
        assert!(conn.core.read_handler.is_none());
    }

    #[test]
    fn read_handler_replaced_inside_callback_keeps_new_one() {
        let mut conn = Connection::new_tcp(registrar());
        conn.core.state = ConnState::Connected;
        let second_calls = Rc::new(RefCell::new(0));
        let second_calls_clone = second_calls.clone();

        conn.set_read_handler(Some(Box::new(move |conn| {
            let inner = second_calls_clone.clone();
            conn.set_read_handler(Some(Box::new(move |_| {
                *inner.borrow_mut() += 1;
            })))
            .unwrap();
        })))
        .unwrap();

        conn.dispatch_read();
        conn.dispatch_read();
        assert_eq!(*second_calls.borrow(), 1);
    }

    #[test]
    fn connect_handler_fires_exactly_once_on_sync_failure() {
        let mut conn = Connection::new_tcp(registrar());
        let calls = Rc::new(RefCell::new(0));
        let calls_clone = calls.clone();
        // An address of 0.0.0.0:0 is fine for start_connect (non-blocking
        // connect never fails synchronously for a routable address), so
        // we force the failure path directly to test firing semantics.
        conn.core.last_error = None;
        conn.core.connect_handler = Some(Box::new(move |_| {
            *calls_clone.borrow_mut() += 1;
        }));
        conn.finish_connect(Err(Error::Timeout));
        assert_eq!(*calls.borrow(), 1);
        assert!(conn.core.connect_handler.is_none());
        assert_eq!(conn.state(), ConnState::Error);
    }

    #[test]
    fn close_is_idempotent() {
        let mut conn = Connection::new_tcp(registrar());
        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnState::Closed);
    }

    #[test]
    fn private_data_roundtrips() {
        let mut conn = Connection::new_tcp(registrar());
        conn.set_private_data(42u32);
        assert_eq!(conn.private_data::<u32>(), Some(&42));
        assert_eq!(conn.private_data::<u64>(), None);
    }

    #[test]
    fn introspection_requires_an_fd() {
        let conn = Connection::new_tcp(registrar());
        assert!(matches!(conn.peer_addr(), Err(Error::NotConnected)));
        assert!(matches!(conn.set_tcp_nodelay(true), Err(Error::NotConnected)));
    }

    #[test]
    fn drain_pending_dispatches_buffered_reads_across_connections() {
        let mut conn = Connection {
            core: ConnCore::new(),
            transport: Box::new(PendingOnceTransport { pending: true }),
            registrar: registrar(),
        };
        conn.core.state = ConnState::Connected;
        let reads = Rc::new(RefCell::new(0));
        let reads_clone = reads.clone();
        conn.set_read_handler(Some(Box::new(move |conn| {
            let mut buf = [0u8; 1];
            let _ = conn.read(&mut buf);
            *reads_clone.borrow_mut() += 1;
        })))
        .unwrap();

        let mut connections = vec![conn];
        drain_pending(connections.iter_mut());
        assert_eq!(*reads.borrow(), 1);
        assert!(!connections[0].has_pending());
    }

    #[test]
    fn introspection_roundtrips_over_a_real_socket() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut conn = Connection::new_tcp(registrar());
        conn.blocking_connect(addr, Duration::from_secs(1)).unwrap();

        assert_eq!(conn.peer_addr().unwrap(), addr);
        conn.set_tcp_nodelay(true).unwrap();
        conn.set_keepalive(Some(Duration::from_secs(30))).unwrap();
        conn.set_keepalive(None).unwrap();
        assert!(conn.take_socket_error().unwrap().is_none());
    }
}
