//! The narrow I/O port the engine consumes (`spec.md` §4.I): connect,
//! disconnect, send, and a receive callback, modeled as discrete messages
//! rather than direct trait calls so the engine itself never blocks or
//! holds a lock (§5).
//!
//! Grounded on the callback-to-`sync()` indirection in
//! `t51core/src/net/endpoint.rs` (`Endpoint::push`/`pull`), generalized
//! down from that type's multi-connection `Channel` pool to this crate's
//! single-connection scope.

/// Something that happened on the transport or DNS resolver, to be
/// delivered to `Engine::on_event`.
#[derive(Debug)]
pub enum Event {
    /// DNS resolution succeeded; the engine may now request a connect.
    Resolved,
    /// DNS resolution failed against the current server. `retry_server`
    /// carries the next hostname to try when the host's `DnsRotation`
    /// helper (`spec.md` §9 "DNS rotation") has one left, or `None` once
    /// every configured server has been tried.
    ResolveFailed { retry_server: Option<String> },
    /// The TCP (or TLS) connection is established.
    Connected,
    /// The transport could not connect.
    ConnectFailed,
    /// Bytes arrived on the wire.
    Received(Vec<u8>),
    /// A previously submitted send was handed to the kernel
    /// ("copied to kernel", decrements `send_active`).
    Sent,
    /// A previously submitted send was placed on the wire
    /// ("written" acknowledgement, decrements `written_active`).
    Written,
    /// The transport reported a fatal error.
    TransportError(std::io::ErrorKind),
    /// The connection closed unexpectedly (not as a result of the engine's
    /// own `Action::Disconnect`).
    Disconnected,
}

/// Something the engine wants the host to do, returned from
/// `Engine::on_event`. The host translates these into calls against its
/// own transport/DNS/notification plumbing.
#[derive(Debug)]
pub enum Action {
    /// Resolve `hostname`; call back with `Event::Resolved`/`ResolveFailed`.
    Resolve(String),
    /// Open a connection to the most recently resolved address.
    Connect,
    /// Transmit `data`. A `WouldBlock`-equivalent failure is reported back
    /// as... nothing — the host simply doesn't emit `Sent` yet and retries
    /// the same buffer; the engine does not resubmit.
    Send(Vec<u8>),
    /// Tear down the connection.
    Disconnect,
    /// Forward an out-of-band notification to the application.
    Notify(u32, Vec<String>),
    /// Report upload progress: samples committed so far this session.
    Progress(u32),
    /// The session has ended; deliver the terminal error (if any) and the
    /// final committed count, then drop the engine.
    Done(Option<crate::error::S4ppError>, u32),
}
