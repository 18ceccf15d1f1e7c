//! End-to-end coverage of the scenarios and invariants in `spec.md` §8,
//! driven entirely through the public API: feed wire bytes in via
//! `Event::Received`, inspect the `Action`s that come back.

use std::collections::VecDeque;

use s4pp_core::config::{DataFormat, DataFormatConfig, HideMode, SessionConfig};
use s4pp_core::crypto::{hex, hmac_sha256};
use s4pp_core::engine::Engine;
use s4pp_core::error::S4ppError;
use s4pp_core::fifo::flash::MemoryFlash;
use s4pp_core::fifo::{layout, Fifo};
use s4pp_core::io::{Action, Event};
use s4pp_core::sample::{Sample, DURATION_INSTANT};
use s4pp_core::source::{FifoSource, SampleSource};

struct VecSource {
    samples: VecDeque<Sample>,
    committed: u32,
}

impl VecSource {
    fn new(samples: Vec<Sample>) -> VecSource {
        VecSource { samples: samples.into(), committed: 0 }
    }
}

impl SampleSource for VecSource {
    fn next(&mut self) -> Option<Sample> {
        self.samples.pop_front()
    }
    fn commit(&mut self, n: u32) {
        self.committed += n;
    }
}

struct NullRandom;
impl s4pp_core::crypto::RandomSource for NullRandom {
    fn fill(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = 0;
        }
    }
}

fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

fn base_config() -> SessionConfig {
    SessionConfig {
        server: "collect.example.com".to_string(),
        port: 22226,
        user: "u".to_string(),
        key: "k".to_string(),
        secure: false,
        hide: HideMode::Preferred,
        format: DataFormatConfig(DataFormat::Simple),
        flashbase: None,
        johny_bug: false,
        max_batch_size: None,
    }
}

fn recv(engine: &mut Engine<VecSource, NullRandom>, line: &str) -> Vec<Action> {
    let mut bytes = line.as_bytes().to_vec();
    bytes.push(b'\n');
    engine.on_event(Event::Received(bytes), 0)
}

fn sent_bytes(actions: &[Action]) -> Vec<u8> {
    for a in actions {
        if let Action::Send(data) = a {
            return data.clone();
        }
    }
    panic!("no Action::Send among {:?}", actions);
}

fn find_done(actions: &[Action]) -> Option<(&Option<S4ppError>, u32)> {
    actions.iter().find_map(|a| match a {
        Action::Done(err, n) => Some((err, *n)),
        _ => None,
    })
}

/// S1: banner + TOK negotiates HIDE and authenticates with the expected
/// `AUTH:`/`HIDE:` frame, even though the 1-byte shared key is too short to
/// ever derive a usable AES-128 session key.
#[test]
fn s1_banner_and_auth_negotiate_hide_despite_unusable_key() {
    let mut config = base_config();
    config.key = "k".to_string();
    let mut engine = Engine::new(config, VecSource::new(vec![]), NullRandom, test_logger()).unwrap();

    let start = engine.start();
    assert!(matches!(start.as_slice(), [Action::Resolve(server)] if server == "collect.example.com"));

    engine.on_event(Event::Resolved, 0);
    engine.on_event(Event::Connected, 0);

    let banner_actions = recv(&mut engine, "S4PP/1.2 SHA256 200 AES-128-CBC");
    assert!(banner_actions.is_empty(), "banner alone should not yet produce a Send");

    let auth_actions = recv(&mut engine, "TOK:0123456789abcdef");
    let sent = sent_bytes(&auth_actions);

    let expected_mac = hmac_sha256(b"k", b"u0123456789abcdef");
    let expected = format!("AUTH:SHA256,u,{}\nHIDE:AES-128-CBC\n", hex::encode(&expected_mac));
    assert_eq!(sent, expected.into_bytes());
}

/// S2: a banner that doesn't advertise SHA256 fails the session immediately
/// with a protocol error and zero committed samples.
#[test]
fn s2_banner_without_sha256_fails_the_session() {
    let mut engine = Engine::new(base_config(), VecSource::new(vec![]), NullRandom, test_logger()).unwrap();
    engine.on_event(Event::Resolved, 0);
    engine.on_event(Event::Connected, 0);

    let actions = recv(&mut engine, "S4PP/1.0 MD5 10");
    match find_done(&actions) {
        Some((Some(S4ppError::Protocol(_)), 0)) => {}
        other => panic!("expected Done(Protocol, 0), got {:?}", other),
    }
    assert!(actions.iter().any(|a| matches!(a, Action::Disconnect)));
}

/// S3: the flash FIFO drops exactly one whole sector's worth of the oldest
/// entries when a write would overflow it, rather than partially dropping
/// or refusing the write outright.
#[test]
fn s3_fifo_overflow_drops_exactly_one_sector() {
    let sector_count = 3;
    let flash = MemoryFlash::new(layout::FIRST_DATA_SECTOR + sector_count);
    let mut fifo = Fifo::open(flash).unwrap();
    fifo.prepare().unwrap();

    let per_sector = layout::DATA_ENTRIES_PER_SECTOR as u32;
    let total_to_write = sector_count as u32 * per_sector + 1;
    for i in 0..total_to_write {
        fifo.store(&Sample::new(i, i as i32, 0, DURATION_INSTANT, b"A", None), "dev").unwrap();
    }

    // Overflowing by one entry past full capacity must drop the entire
    // oldest sector, not just the single oldest entry.
    assert_eq!(fifo.count().unwrap(), (sector_count as u32 - 1) * per_sector + 1);
    let oldest = fifo.peek(0).unwrap().unwrap();
    assert_eq!(oldest.timestamp, per_sector);
}

/// S4: a two-tag Simple-format sequence, byte for byte, including the exact
/// `SEQ:`/`DICT:`/data/`SIG:` ordering and the running HMAC signature.
#[test]
fn s4_sequence_build_matches_exact_wire_bytes() {
    let mut config = base_config();
    config.hide = HideMode::Disabled;
    let samples = vec![
        Sample::new(100, 10, 0, DURATION_INSTANT, b"A", None),
        Sample::new(105, 12, 0, DURATION_INSTANT, b"A", None),
        Sample::new(105, 99, 0, DURATION_INSTANT, b"B", None),
    ];
    let mut engine = Engine::new(config, VecSource::new(samples), NullRandom, test_logger()).unwrap();

    engine.on_event(Event::Resolved, 0);
    engine.on_event(Event::Connected, 0);
    recv(&mut engine, "S4PP/1.0 SHA256 10");
    let mut actions = recv(&mut engine, "TOK:0123456789abcdef");
    actions.extend(engine.on_event(Event::Sent, 0));
    actions.extend(engine.on_event(Event::Written, 0));

    let sent = sent_bytes(&actions);
    let text = String::from_utf8(sent).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("SEQ:0,0,1,0"));
    assert_eq!(lines.next(), Some("DICT:0,,1,A"));
    assert_eq!(lines.next(), Some("0,100,10"));
    assert_eq!(lines.next(), Some("0,5,12"));
    assert_eq!(lines.next(), Some("DICT:1,,1,B"));
    assert_eq!(lines.next(), Some("1,0,99"));
    let sig_line = lines.next().expect("SIG line");
    assert!(sig_line.starts_with("SIG:"));
    assert_eq!(sig_line.len(), 4 + 64);
    assert!(lines.next().is_none());

    // The signature covers every preceding line fed through the same
    // incremental HMAC the engine uses, keyed by the shared key and seeded
    // with the server token.
    let mut expected_hmac = s4pp_core::crypto::HmacAccumulator::new(b"k");
    expected_hmac.update(b"0123456789abcdef");
    for line in &text.lines().take_while(|l| !l.starts_with("SIG:")).collect::<Vec<_>>() {
        expected_hmac.update(line.as_bytes());
        expected_hmac.update(b"\n");
    }
    let expected_digest = expected_hmac.finalize();
    assert_eq!(sig_line, format!("SIG:{}", hex::encode(&expected_digest)));
}

/// S5: matching real/imaginary samples fold into one Extended-format row;
/// the values are formatted per the original `putValue` algorithm (`0.03`/
/// `0.04`), not the literal text in `spec.md`'s S5 prose (see `DESIGN.md`).
#[test]
fn s5_complex_pair_merges_into_one_row() {
    let mut config = base_config();
    config.hide = HideMode::Disabled;
    config.format = DataFormatConfig(DataFormat::Extended);
    config.flashbase = Some(String::new());
    let samples = vec![
        Sample::new(10, 3, 2, DURATION_INSTANT, b"fooR", None),
        Sample::new(10, 4, 2, DURATION_INSTANT, b"fooI", None),
    ];
    let mut engine = Engine::new(config, VecSource::new(samples), NullRandom, test_logger()).unwrap();

    engine.on_event(Event::Resolved, 0);
    engine.on_event(Event::Connected, 0);
    recv(&mut engine, "S4PP/1.0 SHA256 10");
    let mut actions = recv(&mut engine, "TOK:0123456789abcdef");
    actions.extend(engine.on_event(Event::Sent, 0));
    actions.extend(engine.on_event(Event::Written, 0));

    let sent = sent_bytes(&actions);
    let text = String::from_utf8(sent).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("SEQ:0,0,1,1"));
    assert_eq!(lines.next(), Some("DICT:0,,1,foo"));
    assert_eq!(lines.next(), Some("0,10,0,0.03,0.04"));
}

/// S6: an `OK:` ack reports cumulative progress, and once the sample source
/// is exhausted, ends the session cleanly with the final committed count.
#[test]
fn s6_ok_ack_reports_progress_and_closes_session() {
    let mut config = base_config();
    config.hide = HideMode::Disabled;
    let samples = vec![Sample::new(1, 1, 0, DURATION_INSTANT, b"A", None)];
    let mut engine = Engine::new(config, VecSource::new(samples), NullRandom, test_logger()).unwrap();

    engine.on_event(Event::Resolved, 0);
    engine.on_event(Event::Connected, 0);
    recv(&mut engine, "S4PP/1.0 SHA256 10");
    recv(&mut engine, "TOK:0123456789abcdef");
    engine.on_event(Event::Sent, 0);
    engine.on_event(Event::Written, 0);
    engine.on_event(Event::Sent, 0);
    engine.on_event(Event::Written, 0);

    let actions = recv(&mut engine, "OK:0");
    assert!(actions.iter().any(|a| matches!(a, Action::Progress(1))));
    match find_done(&actions) {
        Some((None, 1)) => {}
        other => panic!("expected Done(None, 1), got {:?}", other),
    }
    assert!(actions.iter().any(|a| matches!(a, Action::Disconnect)));
}

/// Invariant: a `REJ:<message>` while committing surfaces the server's
/// message via `S4ppError::ServerReject`.
#[test]
fn rej_surfaces_the_server_message() {
    let mut config = base_config();
    config.hide = HideMode::Disabled;
    let samples = vec![Sample::new(1, 1, 0, DURATION_INSTANT, b"A", None)];
    let mut engine = Engine::new(config, VecSource::new(samples), NullRandom, test_logger()).unwrap();

    engine.on_event(Event::Resolved, 0);
    engine.on_event(Event::Connected, 0);
    recv(&mut engine, "S4PP/1.0 SHA256 10");
    recv(&mut engine, "TOK:0123456789abcdef");
    engine.on_event(Event::Sent, 0);
    engine.on_event(Event::Written, 0);
    engine.on_event(Event::Sent, 0);
    engine.on_event(Event::Written, 0);

    let actions = recv(&mut engine, "REJ:bad signature");
    match find_done(&actions) {
        Some((Some(S4ppError::ServerReject(Some(msg))), 0)) => assert_eq!(msg, "bad signature"),
        other => panic!("expected Done(ServerReject, 0), got {:?}", other),
    }
}

/// Invariant: `HideMode::Mandatory` against a server whose banner never
/// offers `AES-128-CBC` fails immediately, before any `TOK:` round-trip.
#[test]
fn mandatory_hide_without_server_support_fails_at_the_banner() {
    let mut config = base_config();
    config.hide = HideMode::Mandatory;
    let mut engine = Engine::new(config, VecSource::new(vec![]), NullRandom, test_logger()).unwrap();
    engine.on_event(Event::Resolved, 0);
    engine.on_event(Event::Connected, 0);

    let actions = recv(&mut engine, "S4PP/1.0 SHA256 10");
    assert!(actions.iter().any(|a| matches!(a, Action::Done(Some(S4ppError::Protocol(_)), _))));
}

/// Invariant: once a session reaches a terminal state, further events are
/// ignored rather than re-triggering disconnect/done actions.
#[test]
fn terminal_session_ignores_further_events() {
    let mut engine = Engine::new(base_config(), VecSource::new(vec![]), NullRandom, test_logger()).unwrap();
    engine.on_event(Event::Resolved, 0);
    engine.on_event(Event::Connected, 0);
    let actions = recv(&mut engine, "S4PP/1.0 MD5 10");
    assert!(find_done(&actions).is_some());

    let followup = engine.on_event(Event::Disconnected, 0);
    assert!(followup.is_empty());
}

/// Supplement: `FifoSource` composed with the engine end-to-end — stored
/// flash samples flow through as Extended-format rows with the configured
/// `source_id` prefix, and get dropped from flash only once the server
/// acknowledges the sequence.
#[test]
fn fifo_backed_session_commits_only_after_server_ack() {
    let flash = MemoryFlash::new(layout::FIRST_DATA_SECTOR + 4);
    let mut fifo = Fifo::open(flash).unwrap();
    fifo.prepare().unwrap();
    fifo.store(&Sample::new(1, 5, 1, DURATION_INSTANT, b"T", None), "dev1").unwrap();
    let source = FifoSource::new(fifo, "flash:".to_string());

    let mut config = base_config();
    config.hide = HideMode::Disabled;
    config.format = DataFormatConfig(DataFormat::Extended);
    config.flashbase = Some("flash:".to_string());
    let mut engine = Engine::new(config, source, NullRandom, test_logger()).unwrap();

    engine.on_event(Event::Resolved, 0);
    engine.on_event(Event::Connected, 0);
    recv(&mut engine, "S4PP/1.0 SHA256 10");
    recv(&mut engine, "TOK:0123456789abcdef");
    engine.on_event(Event::Sent, 0);
    engine.on_event(Event::Written, 0);
    engine.on_event(Event::Sent, 0);
    engine.on_event(Event::Written, 0);

    let actions = recv(&mut engine, "OK:0");
    assert!(actions.iter().any(|a| matches!(a, Action::Progress(1))));
}
