//! S4PP client core: a transport-agnostic implementation of the S4PP
//! upload protocol (`spec.md`), driven as a synchronous event/action state
//! machine so a host can embed it behind any I/O model it likes (blocking
//! sockets, an async reactor, or a firmware event loop).
//!
//! `engine::Engine` is the entry point. Everything else in this crate is a
//! narrow, independently testable piece it's built from: the wire-format
//! primitives (`sample`, `dictionary`, `framer`, `util`), the optional
//! confidentiality layer (`hide`, `crypto`), the flash-backed persistent
//! queue (`fifo`) and its in-memory pull-mode alternative (`source`), and
//! the host-facing contract types (`io`, `config`, `error`).

pub mod config;
pub mod crypto;
pub mod dictionary;
pub mod engine;
pub mod error;
pub mod fifo;
pub mod framer;
pub mod hide;
pub mod io;
pub mod logging;
pub mod sample;
pub mod source;
pub mod util;

pub use config::{DataFormat, DataFormatConfig, HideMode, SessionConfig};
pub use engine::Engine;
pub use error::{Result, S4ppError};
pub use io::{Action, Event};
pub use sample::{Sample, Tag, Value};
pub use source::{FifoSource, PullSource, SampleSource};
