//! Blocking I/O facade.
//!
//! A [Connection][crate::Connection] is non-blocking by default, driven
//! through [`notify_ready`][crate::Connection::notify_ready]. Some
//! callers -- a one-shot handshake script, a startup probe -- would
//! rather block with a deadline than wire up a handler. These functions
//! do that directly against the connection's socket, using OS-level
//! receive/send timeouts rather than spinning.
//!
//! They assume single-threaded, one-call-at-a-time use: nothing here is
//! safe to call concurrently with event-driven `read`/`write` on the same
//! connection.

use std::io;
use std::time::{Duration, Instant};

use crate::connection::Connection;
use crate::error::{Error, Result};

/// Blocks until at least one byte is available, the deadline passes, or
/// the connection is closed by the peer (`Ok(0)`).
pub fn sync_read(conn: &mut Connection, buf: &mut [u8], timeout: Duration) -> Result<usize> {
    conn.sync_read(buf, timeout)
}

/// Blocks until the entire buffer has been written or the deadline
/// passes.
pub fn sync_write_all(conn: &mut Connection, buf: &[u8], timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut written = 0;
    while written < buf.len() {
        let remaining = remaining_or_timeout(deadline)?;
        let n = conn.sync_write(&buf[written..], remaining)?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(io::ErrorKind::WriteZero, "write returned zero bytes")));
        }
        written += n;
    }
    Ok(())
}

/// Blocks until a `\n`-terminated line has been read, EOF is reached, or
/// the deadline passes. Neither the `\n` nor a trailing `\r` is included.
/// The deadline applies to the whole line, not each underlying read.
pub fn sync_readline(conn: &mut Connection, timeout: Duration) -> Result<String> {
    let deadline = Instant::now() + timeout;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let remaining = remaining_or_timeout(deadline)?;
        let n = conn.sync_read(&mut byte, remaining)?;
        if n == 0 {
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|err| Error::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
}

fn remaining_or_timeout(deadline: Instant) -> Result<Duration> {
    deadline.checked_duration_since(Instant::now()).ok_or(Error::Timeout)
}
