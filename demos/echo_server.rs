//! A small TCP echo server built directly on `netconn`.
//!
//! This is the reference loop from the crate introduction made concrete:
//! a `HashMap` standing in for a slab, `PollRegistrar` driving `mio`, and
//! every connection's `notify_ready` called from one place.

use std::collections::HashMap;
use std::net::TcpListener as StdTcpListener;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;

use log::{debug, info, warn};
use mio::net::TcpListener;
use mio::Events;

use netconn::{drain_pending, Connection, Interest, PollRegistrar, Registrar};

fn install_echo_handlers(conn: &mut Connection) {
    conn.set_read_handler(Some(Box::new(|conn: &mut Connection| {
        let mut buf = [0u8; 4096];
        match conn.read(&mut buf) {
            Ok(0) => conn.close(),
            Ok(n) => {
                // A production echo server would track the unwritten
                // tail and retry on the write handler; this demo keeps
                // it to one best-effort write per read.
                let _ = conn.write(&buf[..n]);
            }
            Err(err) if err.would_block() => {}
            Err(_) => conn.close(),
        }
    })))
    .unwrap();
}

fn main() -> std::io::Result<()> {
    env_logger::init();

    let std_listener = StdTcpListener::bind("127.0.0.1:7878")?;
    std_listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(std_listener);
    let listener_fd = listener.as_raw_fd();

    let poll_registrar = Rc::new(PollRegistrar::new()?);
    let registrar: Rc<dyn Registrar> = poll_registrar.clone();
    registrar.register(listener_fd, Interest::READ).unwrap();

    let mut connections: HashMap<RawFd, Connection> = HashMap::new();
    let mut events = Events::with_capacity(128);

    info!("echo server listening on 127.0.0.1:7878");

    loop {
        poll_registrar.poll(&mut events, None, |fd, interest| {
            if fd == listener_fd {
                accept_all(&listener, &registrar, &mut connections);
                return;
            }
            if let Some(conn) = connections.get_mut(&fd) {
                conn.notify_ready(interest);
                if conn.state().is_terminal() {
                    connections.remove(&fd);
                }
            }
        })?;

        // Lets TLS connections with buffered plaintext but no further
        // readable event coming still hand it to their read handler.
        drain_pending(connections.values_mut());
    }
}

fn accept_all(listener: &TcpListener, registrar: &Rc<dyn Registrar>, connections: &mut HashMap<RawFd, Connection>) {
    loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("accepted connection from {}", addr);
                let mut conn = Connection::from_accepted_tcp(registrar.clone(), stream);
                conn.accept(Box::new(install_echo_handlers)).unwrap();
                if let Some(fd) = conn.fd() {
                    connections.insert(fd, conn);
                }
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(err) => {
                warn!("accept failed: {}", err);
                break;
            }
        }
    }
}
