//! The readiness registrar.
//!
//! Everything in this module describes the *external* side of the crate:
//! the thing that watches file descriptors and tells a connection when it
//! can make progress. The registrar itself, and the loop that drives it,
//! are not part of this crate -- see the [crate introduction](../intro/index.html)
//! for why. [PollRegistrar] is a reference implementation built on `mio`,
//! useful both for a host application that doesn't already have a
//! readiness loop and for this crate's own integration tests.

use std::collections::HashMap;
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::os::unix::io::RawFd;
use std::sync::Mutex;

use mio::unix::SourceFd;
use mio::{Events, Poll, Token};

use crate::error::Result;

//------------ Interest ------------------------------------------------------

/// A direction (or pair of directions) of readiness.
///
/// This is a small hand-rolled bitset rather than a re-export of `mio`'s
/// own `Interest` type, so that callers implementing their own
/// [Registrar] never need to depend on `mio` at all.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Interest(u8);

impl Interest {
    /// No interest in either direction.
    pub const NONE: Interest = Interest(0);

    /// Interested in read readiness.
    pub const READ: Interest = Interest(0b01);

    /// Interested in write readiness.
    pub const WRITE: Interest = Interest(0b10);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn is_readable(self) -> bool {
        self.0 & Self::READ.0 != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }

    fn to_mio(self) -> Option<mio::Interest> {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => Some(mio::Interest::READABLE | mio::Interest::WRITABLE),
            (true, false) => Some(mio::Interest::READABLE),
            (false, true) => Some(mio::Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl Default for Interest {
    fn default() -> Self {
        Interest::NONE
    }
}

//------------ Registrar -----------------------------------------------------

/// The contract a host application's I/O readiness loop must satisfy.
///
/// A connection never calls into the loop directly; it only ever talks to
/// whatever `Registrar` it was handed at creation. All three operations
/// must be idempotent: registering a direction that is already registered,
/// or deregistering one that never was, is not an error.
///
/// The loop itself -- turning a readiness notification for `fd` back into
/// a call to the right connection's [`notify_ready`][crate::Connection::notify_ready]
/// -- is deliberately outside this trait and outside this crate. This
/// crate only needs to be told "go register this fd"; it does not need to
/// know how the loop gets from a raw `epoll`/`kqueue` wakeup back to a
/// `Connection`.
pub trait Registrar {
    /// Registers interest in `interest` for `fd`.
    fn register(&self, fd: RawFd, interest: Interest) -> Result<()>;

    /// Changes the registered interest for an `fd` that is already known
    /// to the registrar.
    fn reregister(&self, fd: RawFd, interest: Interest) -> Result<()>;

    /// Deregisters all interest for `fd`.
    fn deregister(&self, fd: RawFd) -> Result<()>;

    /// Returns the interest currently registered for `fd`, if any.
    fn query(&self, fd: RawFd) -> Interest;
}

//------------ PollRegistrar --------------------------------------------------

/// A [Registrar] backed by `mio::Poll`.
///
/// This is the crate's reference implementation: good enough to run the
/// integration tests and small demos against, and a reasonable template
/// for a host loop that doesn't already have one of its own. It is not
/// required reading for using the rest of the crate.
pub struct PollRegistrar {
    poll: Mutex<Poll>,
    registered: Mutex<HashMap<RawFd, Interest>>,
}

impl PollRegistrar {
    pub fn new() -> io::Result<Self> {
        Ok(PollRegistrar {
            poll: Mutex::new(Poll::new()?),
            registered: Mutex::new(HashMap::new()),
        })
    }

    /// Blocks until at least one registered fd is ready, or `timeout`
    /// elapses, then calls `f` once per `(fd, interest)` pair observed.
    pub fn poll(
        &self,
        events: &mut Events,
        timeout: Option<std::time::Duration>,
        mut f: impl FnMut(RawFd, Interest),
    ) -> io::Result<()> {
        self.poll.lock().unwrap().poll(events, timeout)?;
        for event in events.iter() {
            let fd = event.token().0 as RawFd;
            let mut interest = Interest::NONE;
            if event.is_readable() {
                interest |= Interest::READ;
            }
            if event.is_writable() {
                interest |= Interest::WRITE;
            }
            f(fd, interest);
        }
        Ok(())
    }
}

impl Registrar for PollRegistrar {
    fn register(&self, fd: RawFd, interest: Interest) -> Result<()> {
        let mut registered = self.registered.lock().unwrap();
        if registered.get(&fd).copied().unwrap_or(Interest::NONE) == interest {
            return Ok(());
        }
        let already_known = registered.contains_key(&fd);
        let mio_interest = interest.to_mio();
        let poll = self.poll.lock().unwrap();
        let mut source = SourceFd(&fd);
        match mio_interest {
            Some(mio_interest) if already_known => {
                poll.registry()
                    .reregister(&mut source, Token(fd as usize), mio_interest)?;
            }
            Some(mio_interest) => {
                poll.registry()
                    .register(&mut source, Token(fd as usize), mio_interest)?;
            }
            None if already_known => {
                poll.registry().deregister(&mut source)?;
            }
            None => {}
        }
        registered.insert(fd, interest);
        Ok(())
    }

    fn reregister(&self, fd: RawFd, interest: Interest) -> Result<()> {
        self.register(fd, interest)
    }

    fn deregister(&self, fd: RawFd) -> Result<()> {
        let mut registered = self.registered.lock().unwrap();
        if registered.remove(&fd).is_some() {
            let poll = self.poll.lock().unwrap();
            let mut source = SourceFd(&fd);
            let _ = poll.registry().deregister(&mut source);
        }
        Ok(())
    }

    fn query(&self, fd: RawFd) -> Interest {
        self.registered
            .lock()
            .unwrap()
            .get(&fd)
            .copied()
            .unwrap_or(Interest::NONE)
    }
}

//------------ NullRegistrar --------------------------------------------------

/// A [Registrar] that records calls but never talks to a real loop.
///
/// Used by the crate's own unit tests, and a reasonable starting point for
/// a host application's tests of code built atop [Connection][crate::Connection].
#[derive(Default)]
pub struct NullRegistrar {
    state: Mutex<HashMap<RawFd, Interest>>,
}

impl NullRegistrar {
    pub fn new() -> Self {
        NullRegistrar::default()
    }
}

impl Registrar for NullRegistrar {
    fn register(&self, fd: RawFd, interest: Interest) -> Result<()> {
        self.state.lock().unwrap().insert(fd, interest);
        Ok(())
    }

    fn reregister(&self, fd: RawFd, interest: Interest) -> Result<()> {
        self.register(fd, interest)
    }

    fn deregister(&self, fd: RawFd) -> Result<()> {
        self.state.lock().unwrap().remove(&fd);
        Ok(())
    }

    fn query(&self, fd: RawFd) -> Interest {
        self.state
            .lock()
            .unwrap()
            .get(&fd)
            .copied()
            .unwrap_or(Interest::NONE)
    }
}

/// A [Registrar] that counts `register` calls instead of just recording
/// the latest interest, so a test can assert a transport's `reconcile`
/// skipped a redundant call rather than merely tolerated it.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CountingRegistrar {
    pub(crate) register_calls: Mutex<u32>,
    state: Mutex<HashMap<RawFd, Interest>>,
}

#[cfg(test)]
impl CountingRegistrar {
    pub(crate) fn new() -> Self {
        CountingRegistrar::default()
    }

    pub(crate) fn register_call_count(&self) -> u32 {
        *self.register_calls.lock().unwrap()
    }
}

#[cfg(test)]
impl Registrar for CountingRegistrar {
    fn register(&self, fd: RawFd, interest: Interest) -> Result<()> {
        *self.register_calls.lock().unwrap() += 1;
        self.state.lock().unwrap().insert(fd, interest);
        Ok(())
    }

    fn reregister(&self, fd: RawFd, interest: Interest) -> Result<()> {
        self.register(fd, interest)
    }

    fn deregister(&self, fd: RawFd) -> Result<()> {
        self.state.lock().unwrap().remove(&fd);
        Ok(())
    }

    fn query(&self, fd: RawFd) -> Interest {
        self.state.lock().unwrap().get(&fd).copied().unwrap_or(Interest::NONE)
    }
}
