//! The protocol state machine (`spec.md` §4.H): banner negotiation,
//! challenge/response auth, sequence buffering, SIG/HIDE closing, and
//! OK/NOK/REJ/NTFY dispatch.
//!
//! Grounded on `handle_auth`/`on_recv`/`progress_work` in
//! `examples/original_source/app/modules/s4pp.c`, expressed as a
//! synchronous `on_event(Event) -> Vec<Action>` state machine in the style
//! of `t51core/src/net/endpoint.rs::Endpoint::sync` rather than that file's
//! direct callback dispatch, per `SPEC_FULL.md` §5's "no locks, no
//! suspension points" requirement.

use crate::config::{DataFormat, HideMode, SessionConfig};
use crate::crypto::cipher;
use crate::crypto::hex;
use crate::crypto::{hmac_sha256, HmacAccumulator, OsRandom, RandomSource};
use crate::dictionary::{Dictionary, DictionaryOverflow, Lookup};
use crate::error::{Result, S4ppError};
use crate::framer::LineFramer;
use crate::hide::Hide;
use crate::io::{Action, Event};
use crate::logging::{debug, info, warn, Logger};
use crate::sample::{try_pair_complex, Sample, Tag, DURATION_INSTANT};
use crate::source::SampleSource;
use crate::util::format_value;

/// Maximum number of sends the engine will have outstanding (submitted but
/// not yet both `Sent` and `Written`) at once.
pub const MAX_IN_FLIGHT: u32 = 5;

/// Soft cap on the assembled sequence buffer before it is closed and sent.
pub const PAYLOAD_LIMIT: usize = 1400;

/// `NTFY:` code carrying the three timing measurements (`spec.md` §4.H,
/// §9 "NTFY_TIME").
const NTFY_TIME: u32 = 0;

/// Fixed wire length of a `SIG:<64 lowercase hex>\n` line.
const SIG_LINE_LEN: usize = 4 + 64 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Hello,
    Authed,
    Buffering,
    Committing,
    Done,
    Errored,
}

/// Drives one S4PP session against one server connection. Owns no socket;
/// the host feeds it `Event`s and carries out the returned `Action`s
/// (`spec.md` §4.I).
pub struct Engine<S: SampleSource, R: RandomSource = OsRandom> {
    config: SessionConfig,
    logger: Logger,
    source: S,
    rng: R,

    phase: Phase,
    hide_supported: bool,

    n_max: u16,
    n_used: u32,
    n_committed: u32,
    last_time: u32,
    sequence: u32,

    dictionary: Dictionary,
    hmac: Option<HmacAccumulator>,
    hide: Option<Hide>,
    token: Option<String>,
    content: Vec<u8>,
    end_of_data: bool,
    pending_real: Option<Sample>,

    framer: LineFramer,
    send_active: u32,
    written_active: u32,

    t_resolved: Option<u64>,
    t_connected: Option<u64>,
    t_banner: Option<u64>,
}

impl<S: SampleSource, R: RandomSource> Engine<S, R> {
    pub fn new(config: SessionConfig, source: S, rng: R, logger: Logger) -> Result<Engine<S, R>> {
        config.validate()?;
        Ok(Engine {
            config,
            logger,
            source,
            rng,
            phase: Phase::Init,
            hide_supported: false,
            n_max: u16::MAX,
            n_used: 0,
            n_committed: 0,
            last_time: 0,
            sequence: 0,
            dictionary: Dictionary::new(),
            hmac: None,
            hide: None,
            token: None,
            content: Vec::new(),
            end_of_data: false,
            pending_real: None,
            framer: LineFramer::new(),
            send_active: 0,
            written_active: 0,
            t_resolved: None,
            t_connected: None,
            t_banner: None,
        })
    }

    /// Number of samples the server has acknowledged so far this session.
    pub fn n_committed(&self) -> u32 {
        self.n_committed
    }

    /// Overrides the server-advertised `n_max` (`spec.md` §2 supplement
    /// `batchsize()`). Takes effect immediately and for every subsequent
    /// sequence.
    pub fn set_max_batch_size(&mut self, n: u16) {
        self.config.max_batch_size = Some(n);
        self.n_max = self.n_max.min(n);
    }

    /// Kicks off the session: resolve the configured server.
    pub fn start(&mut self) -> Vec<Action> {
        info!(self.logger, "starting session"; "server" => &self.config.server, "port" => self.config.port);
        vec![Action::Resolve(self.config.server.clone())]
    }

    /// Host-initiated cancellation (`spec.md` §5 "explicit session close").
    pub fn close(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.is_terminal() {
            self.phase = Phase::Done;
            actions.push(Action::Disconnect);
            actions.push(Action::Done(None, self.n_committed));
        }
        actions
    }

    fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Errored)
    }

    /// The single re-entry point: deliver one transport/DNS event, get back
    /// zero or more actions to carry out. `now_micros` is an
    /// arbitrary monotonic microsecond clock the host maintains; the
    /// engine uses it only for the NTFY_TIME measurements (§9).
    pub fn on_event(&mut self, event: Event, now_micros: u64) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.is_terminal() {
            return actions;
        }

        match event {
            Event::Resolved => {
                self.t_resolved = Some(now_micros);
                actions.push(Action::Connect);
            }
            Event::ResolveFailed { retry_server } => match retry_server {
                Some(server) => {
                    debug!(self.logger, "dns resolution failed, retrying"; "server" => &server);
                    actions.push(Action::Resolve(server));
                }
                None => self.fail(&mut actions, S4ppError::Network(std::io::ErrorKind::NotFound)),
            },
            Event::Connected => {
                self.t_connected = Some(now_micros);
            }
            Event::ConnectFailed => {
                self.fail(&mut actions, S4ppError::Network(std::io::ErrorKind::ConnectionRefused));
            }
            Event::Received(bytes) => {
                self.on_received(&bytes, now_micros, &mut actions);
            }
            Event::Sent => {
                self.send_active = self.send_active.saturating_sub(1);
            }
            Event::Written => {
                self.written_active = self.written_active.saturating_sub(1);
                self.try_begin_next_sequence(&mut actions);
            }
            Event::TransportError(kind) => {
                self.fail(&mut actions, S4ppError::Network(kind));
            }
            Event::Disconnected => {
                self.fail(&mut actions, S4ppError::Network(std::io::ErrorKind::ConnectionAborted));
            }
        }

        actions
    }

    fn on_received(&mut self, bytes: &[u8], now_micros: u64, actions: &mut Vec<Action>) {
        // The framer needs `&mut self.framer` while line handlers need
        // `&mut self` as a whole; collect complete lines first so the two
        // borrows never overlap.
        let mut framer = std::mem::take(&mut self.framer);
        let mut lines: Vec<Vec<u8>> = Vec::new();
        framer.feed(bytes, |line| lines.push(line.to_vec()));
        self.framer = framer;

        for line in lines {
            if self.is_terminal() {
                break;
            }
            self.on_line(&line, now_micros, actions);
        }
    }

    fn on_line(&mut self, line: &[u8], now_micros: u64, actions: &mut Vec<Action>) {
        let line = match std::str::from_utf8(line) {
            Ok(s) => s,
            Err(_) => {
                self.fail(actions, S4ppError::Protocol("non-utf8 line".into()));
                return;
            }
        };

        if let Some(rest) = line.strip_prefix("NTFY:") {
            self.handle_ntfy(rest, now_micros, actions);
            return;
        }

        match self.phase {
            Phase::Init => self.handle_banner(line, now_micros, actions),
            Phase::Hello => self.handle_tok(line, actions),
            Phase::Committing => self.handle_committing_line(line, actions),
            _ => self.fail(actions, S4ppError::Protocol(format!("unexpected line: {}", line))),
        }
    }

    fn handle_banner(&mut self, line: &str, now_micros: u64, actions: &mut Vec<Action>) {
        let parts: Vec<&str> = line.split(' ').filter(|s| !s.is_empty()).collect();
        if parts.len() < 3 || !parts[0].starts_with("S4PP/") {
            self.fail(actions, S4ppError::Protocol(format!("malformed banner: {}", line)));
            return;
        }

        let version = &parts[0]["S4PP/".len()..];
        let mut version_parts = version.splitn(2, '.');
        let minor: u32 = match version_parts
            .next()
            .and(version_parts.next())
            .and_then(|s| s.parse().ok())
        {
            Some(v) => v,
            None => {
                self.fail(actions, S4ppError::Protocol(format!("malformed banner version: {}", line)));
                return;
            }
        };

        let hash_algos = parts[1];
        if !hash_algos.split(',').any(|a| a == "SHA256") {
            self.fail(actions, S4ppError::Protocol("server does not offer SHA256".into()));
            return;
        }

        let n_max: u16 = match parts[2].parse() {
            Ok(v) => v,
            Err(_) => {
                self.fail(actions, S4ppError::Protocol(format!("malformed n_max: {}", line)));
                return;
            }
        };
        self.n_max = match self.config.max_batch_size {
            Some(cap) => n_max.min(cap),
            None => n_max,
        };

        let hide_offered = parts
            .get(3)
            .map(|algos| algos.split(',').any(|a| a == "AES-128-CBC"))
            .unwrap_or(false);
        self.hide_supported = minor >= 2 && hide_offered;

        if self.config.hide == HideMode::Mandatory && !self.hide_supported {
            self.fail(actions, S4ppError::Protocol("server does not support mandatory HIDE".into()));
            return;
        }

        self.t_banner = Some(now_micros);
        self.phase = Phase::Hello;
    }

    fn handle_tok(&mut self, line: &str, actions: &mut Vec<Action>) {
        let token = match line.strip_prefix("TOK:") {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                self.fail(actions, S4ppError::Protocol(format!("expected TOK: line, got {}", line)));
                return;
            }
        };

        let mac = hmac_sha256(
            self.config.key.as_bytes(),
            format!("{}{}", self.config.user, token).as_bytes(),
        );

        let want_hide = self.hide_supported && self.config.hide != HideMode::Disabled;

        let mut frame = format!("AUTH:SHA256,{},{}\n", self.config.user, hex::encode(&mac));
        if want_hide {
            frame.push_str("HIDE:AES-128-CBC\n");
        }

        if want_hide {
            match cipher::shared_aes_key(self.config.key.as_bytes(), self.config.johny_bug) {
                Some(shared_key) => self.hide = Some(Hide::new(&shared_key, &token)),
                None if self.config.hide == HideMode::Mandatory => {
                    self.fail(actions, S4ppError::Protocol("shared key unusable for mandatory HIDE".into()));
                    return;
                }
                None => {
                    debug!(self.logger, "hide negotiated but session key derivation failed; continuing without encryption");
                }
            }
        }

        self.token = Some(token);
        self.phase = Phase::Authed;
        self.queue_send(frame.into_bytes(), actions);
        self.try_begin_next_sequence(actions);
    }

    /// Starts buffering the next sequence, but only once the previous
    /// sequence's send has fully drained from the in-flight window
    /// (`spec.md` §4.H "new sequence work proceeds only when..."). Safe to
    /// call whenever the window might have just opened up.
    fn try_begin_next_sequence(&mut self, actions: &mut Vec<Action>) {
        if self.phase == Phase::Authed && self.written_active == 0 && self.send_active < MAX_IN_FLIGHT {
            self.begin_sequence(actions);
        }
    }

    fn begin_sequence(&mut self, actions: &mut Vec<Action>) {
        self.n_used = 0;
        self.last_time = 0;
        self.dictionary.reset();
        self.content.clear();
        self.pending_real = None;
        self.end_of_data = false;

        let mut hmac = HmacAccumulator::new(self.config.key.as_bytes());
        if let Some(token) = &self.token {
            hmac.update(token.as_bytes());
        }
        self.hmac = Some(hmac);

        if let Some(hide) = &self.hide {
            let salt = hide.generate_salt(&mut self.rng);
            self.content.extend_from_slice(&salt);
        }

        self.phase = Phase::Buffering;
        let seq_line = format!("SEQ:{},0,1,{}\n", self.sequence, self.config.format.0 as u8);
        self.push_content(seq_line.as_bytes());

        self.pump(actions);
    }

    /// Appends bytes to the sequence buffer and feeds them into the running
    /// HMAC. Never call this with salt bytes (`spec.md` §4.F: "salt is
    /// excluded from the HMAC").
    fn push_content(&mut self, bytes: &[u8]) {
        self.content.extend_from_slice(bytes);
        if let Some(hmac) = &mut self.hmac {
            hmac.update(bytes);
        }
    }

    fn pump(&mut self, actions: &mut Vec<Action>) {
        if self.phase != Phase::Buffering {
            return;
        }
        match self.pump_inner() {
            Ok(done) => self.close_sequence(actions, done),
            Err(err) => self.fail(actions, err),
        }
    }

    /// Buffers samples until the sequence threshold is hit (`Ok(false)`) or
    /// the source runs dry (`Ok(true)`, end of data).
    fn pump_inner(&mut self) -> Result<bool> {
        loop {
            if self.content.len() >= PAYLOAD_LIMIT || self.n_used >= self.n_max as u32 {
                return Ok(false);
            }

            let sample = match self.pending_real.take().or_else(|| self.source.next()) {
                Some(s) => s,
                None => return Ok(true),
            };

            if self.config.format.0 == DataFormat::Extended {
                if sample.tag.is_imag_suffixed() {
                    // Unmatched imaginary part with no preceding real; drop it (§4.B).
                    continue;
                }
                if sample.tag.is_real_suffixed() {
                    match self.source.next() {
                        Some(next) => {
                            if let Some((real, imag, tag)) = try_pair_complex(&sample, &next) {
                                self.emit_paired(real, imag, tag)?;
                            } else {
                                self.emit_single(&sample)?;
                                if !next.tag.is_imag_suffixed() {
                                    self.pending_real = Some(next);
                                }
                            }
                            continue;
                        }
                        None => {
                            self.emit_single(&sample)?;
                            return Ok(true);
                        }
                    }
                }
            }

            self.emit_single(&sample)?;
        }
    }

    fn declare(&mut self, source_id: Option<&str>, tag: &Tag, display_name: &str) -> Result<u16> {
        match self.dictionary.lookup(source_id, tag, display_name) {
            Ok(Lookup::Known(idx)) => Ok(idx),
            Ok(Lookup::New(decl)) => {
                let line = format!("DICT:{},,1,{}\n", decl.index, decl.name);
                self.push_content(line.as_bytes());
                Ok(decl.index)
            }
            Err(DictionaryOverflow) => Err(S4ppError::Resource("dictionary overflowed".into())),
        }
    }

    fn emit_single(&mut self, sample: &Sample) -> Result<()> {
        let name = sample.source_id.clone().unwrap_or_else(|| sample.tag.to_string());
        let idx = self.declare(sample.source_id.as_deref(), &sample.tag, &name)?;
        let span = if sample.duration == DURATION_INSTANT { 0 } else { sample.duration + 1 };
        let value_str = format_value(sample.value.0, sample.decimals);

        let row = match self.config.format.0 {
            DataFormat::Simple => {
                let end_time = sample.timestamp.wrapping_add(span);
                let dt = end_time as i64 - self.last_time as i64;
                self.last_time = end_time;
                format!("{},{},{}\n", idx, dt, value_str)
            }
            DataFormat::Extended => {
                let dt = sample.timestamp as i64 - self.last_time as i64;
                self.last_time = sample.timestamp;
                format!("{},{},{},{}\n", idx, dt, span, value_str)
            }
        };

        self.push_content(row.as_bytes());
        self.n_used += 1;
        Ok(())
    }

    fn emit_paired(&mut self, real: &Sample, imag: &Sample, tag: Tag) -> Result<()> {
        let name = real.source_id.clone().unwrap_or_else(|| tag.to_string());
        let idx = self.declare(real.source_id.as_deref(), &tag, &name)?;
        let span = if real.duration == DURATION_INSTANT { 0 } else { real.duration + 1 };

        let dt = real.timestamp as i64 - self.last_time as i64;
        self.last_time = real.timestamp;

        let real_str = format_value(real.value.0, real.decimals);
        let imag_str = format_value(imag.value.0, imag.decimals);
        let row = format!("{},{},{},{},{}\n", idx, dt, span, real_str, imag_str);

        self.push_content(row.as_bytes());
        self.n_used += 1;
        Ok(())
    }

    fn close_sequence(&mut self, actions: &mut Vec<Action>, end_of_data: bool) {
        self.end_of_data = end_of_data;

        if let Some(hide) = &self.hide {
            let pad = hide.pad_len_for(self.content.len() + SIG_LINE_LEN);
            let pad_bytes = vec![b'\n'; pad];
            self.push_content(&pad_bytes);
        }

        let digest = self.hmac.take().expect("hmac initialized at sequence start").finalize();
        let sig_line = format!("SIG:{}\n", hex::encode(&digest));
        debug_assert_eq!(sig_line.len(), SIG_LINE_LEN);
        self.content.extend_from_slice(sig_line.as_bytes());

        let mut buffer = std::mem::take(&mut self.content);
        if let Some(hide) = &mut self.hide {
            hide.encrypt_no_pad(&mut buffer);
        }

        self.phase = Phase::Committing;
        self.queue_send(buffer, actions);
    }

    fn handle_committing_line(&mut self, line: &str, actions: &mut Vec<Action>) {
        if line.starts_with("OK:") {
            self.handle_ok(actions);
        } else if line.starts_with("NOK:") {
            self.fail(actions, S4ppError::ServerReject(None));
        } else if let Some(msg) = line.strip_prefix("REJ:") {
            self.fail(actions, S4ppError::ServerReject(Some(msg.to_string())));
        } else {
            self.fail(actions, S4ppError::Protocol(format!("unexpected line while committing: {}", line)));
        }
    }

    fn handle_ok(&mut self, actions: &mut Vec<Action>) {
        self.n_committed += self.n_used;
        self.source.commit(self.n_used);
        actions.push(Action::Progress(self.n_committed));

        if self.end_of_data {
            self.phase = Phase::Done;
            actions.push(Action::Disconnect);
            actions.push(Action::Done(None, self.n_committed));
            return;
        }

        self.sequence += 1;
        self.phase = Phase::Authed;
        self.try_begin_next_sequence(actions);
    }

    fn handle_ntfy(&mut self, rest: &str, now_micros: u64, actions: &mut Vec<Action>) {
        let mut parts = rest.split(',');
        let code: u32 = match parts.next().and_then(|s| s.parse().ok()) {
            Some(c) => c,
            None => {
                self.fail(actions, S4ppError::Protocol(format!("malformed NTFY: {}", rest)));
                return;
            }
        };
        let mut args: Vec<String> = parts.map(str::to_string).collect();

        if code == NTFY_TIME {
            if let (Some(resolved), Some(connected), Some(banner)) = (self.t_resolved, self.t_connected, self.t_banner) {
                args.push(connected.saturating_sub(resolved).to_string());
                args.push(banner.saturating_sub(connected).to_string());
                args.push(now_micros.saturating_sub(banner).to_string());
            }
        }

        actions.push(Action::Notify(code, args));
    }

    fn queue_send(&mut self, data: Vec<u8>, actions: &mut Vec<Action>) {
        self.send_active += 1;
        self.written_active += 1;
        actions.push(Action::Send(data));
    }

    fn fail(&mut self, actions: &mut Vec<Action>, err: S4ppError) {
        if self.is_terminal() {
            return;
        }
        warn!(self.logger, "session failed"; "error" => %err);
        self.phase = Phase::Errored;
        actions.push(Action::Disconnect);
        actions.push(Action::Done(Some(err), self.n_committed));
    }
}
