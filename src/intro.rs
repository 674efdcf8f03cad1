//! An introduction to this crate.
//!
//! <i>This module does not contain any code, only a lot of text.</i>
//!
//! This crate builds on `mio` without hiding that fact, so this
//! introduction starts with `mio`'s own vocabulary before moving on to
//! how [Connection][crate::Connection], [Registrar][crate::Registrar],
//! and the internal transport split fit together.
//!
//!
//! # Contents
//!
//! * [MIO](#mio)
//! * [Why the registrar is not part of this crate](#why-the-registrar-is-not-part-of-this-crate)
//! * [Connection, handlers, and re-entrancy](#connection-handlers-and-re-entrancy)
//!
//!
//! # MIO
//!
//! [mio](https://github.com/tokio-rs/mio) is a thin, mostly unified
//! layer over whatever the operating system provides for asynchronous
//! I/O. Because it is thin, its usage is a little arcane, which is why
//! it is usually wrapped by something more specialized rather than used
//! directly -- which is exactly what this crate does.
//!
//! mio monitors readiness on things implementing its `Source` trait;
//! network sockets are the common case. Readiness is reported through
//! `mio::Poll`: you register a source along with a `Token` you choose
//! yourself, and `Poll::poll` hands back events carrying that token and
//! whether the source became readable, writable, or both. mio does not
//! own the sources it watches, and it does not know what a `Token`
//! means beyond an opaque number you get to interpret however you like.
//!
//!
//! # Why the registrar is not part of this crate
//!
//! Turning a `mio::Poll` wakeup for a given fd back into a call to the
//! right `Connection`'s `notify_ready` is the job of an application's
//! main loop, not this crate. That loop typically already exists --
//! it might be driving timers, other protocols, or work queues besides
//! connections -- and forcing it to adopt this crate's own event loop
//! would be the wrong trade. Instead, this crate only asks for a
//! [Registrar][crate::Registrar]: register this fd for this direction,
//! deregister it, tell me what's currently registered. Everything else
//! about how readiness turns into a dispatched call is up to the
//! caller.
//!
//! [PollRegistrar][crate::PollRegistrar] is a batteries-included
//! `mio`-backed implementation, useful for small programs, demos, and
//! this crate's own integration tests, but using it is entirely
//! optional.
//!
//!
//! # Connection, handlers, and re-entrancy
//!
//! A [Connection][crate::Connection] is a single concrete type whether
//! it is backed by plain TCP or TLS; which one it is gets fixed the
//! moment it is created and never changes. Handlers are plain closures
//! kept in slots on the connection rather than implementations of a
//! trait: `connect`/`accept` handlers are single-shot and consumed the
//! instant they fire, while `read`/`write` handlers persist across
//! events until the caller replaces or clears them.
//!
//! Because a handler routinely wants to call back into the very
//! connection that invoked it -- read more, change the write handler,
//! close the connection -- every dispatch clears a handler slot before
//! calling it and only restores it afterwards if the callback didn't
//! touch that slot itself and the connection wasn't closed in the
//! meantime. This is what makes it safe for a read handler to replace
//! itself, clear itself, or close the connection without the dispatcher
//! fighting it over what belongs in the slot next.
