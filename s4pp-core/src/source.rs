//! The sample source adapter (`spec.md` §4.J): supplies the engine with
//! samples either from an application-provided lazy pull function or from
//! the flash FIFO (`fifo::Fifo`).
//!
//! Grounded on the channel-pool iteration idiom in
//! `t51core/src/net/endpoint.rs::Endpoint::pull`, simplified to this
//! crate's single-producer case.

use crate::fifo::flash::Flash;
use crate::fifo::Fifo;
use crate::sample::Sample;

/// Number of calls between watchdog heartbeat calls in pull mode
/// (`spec.md` §4.J, §9 glossary "watchdog heartbeat").
pub const WATCHDOG_INTERVAL: u32 = 512;

/// What the engine pulls samples from and reports commits back to.
///
/// `next` is called once per sample the engine wants to buffer; `commit`
/// is called once per acknowledged sequence with the number of samples the
/// server confirmed, so FIFO-backed sources can advance their head marker.
pub trait SampleSource {
    fn next(&mut self) -> Option<Sample>;
    fn commit(&mut self, n: u32);
}

/// Pull-mode adapter (`spec.md` §4.J): wraps an application-supplied
/// function returning the next sample, or `None` to signal end of data.
/// Ordinary calls pass `None`; every `WATCHDOG_INTERVAL`th call instead
/// passes `Some(n_committed)`, the session's running commit count, as a
/// watchdog heartbeat — returning `None` on that particular call means
/// "stop soon" (exactly as an ordinary `None` does), letting the host
/// check an external deadline only once every `WATCHDOG_INTERVAL` samples
/// rather than on every call.
pub struct PullSource<F> {
    pull: F,
    n_committed: u32,
    calls_since_heartbeat: u32,
}

impl<F> PullSource<F>
where
    F: FnMut(Option<u32>) -> Option<Sample>,
{
    pub fn new(pull: F) -> PullSource<F> {
        PullSource { pull, n_committed: 0, calls_since_heartbeat: 0 }
    }
}

impl<F> SampleSource for PullSource<F>
where
    F: FnMut(Option<u32>) -> Option<Sample>,
{
    fn next(&mut self) -> Option<Sample> {
        self.calls_since_heartbeat += 1;
        let heartbeat = self.calls_since_heartbeat == WATCHDOG_INTERVAL;
        if heartbeat {
            self.calls_since_heartbeat = 0;
        }

        let arg = if heartbeat { Some(self.n_committed) } else { None };
        (self.pull)(arg)
    }

    fn commit(&mut self, n: u32) {
        self.n_committed += n;
    }
}

/// FIFO-mode adapter (`spec.md` §4.J): reads sequentially from a flash
/// FIFO starting at the current head, advancing a read cursor that is only
/// turned into a real `drop_n` once the server acknowledges the sequence
/// that consumed those samples. Always paired with `DataFormat::Extended`
/// (format 1), since `duration` is only meaningful there.
pub struct FifoSource<F: Flash> {
    fifo: Fifo<F>,
    flashbase: String,
    cursor: u32,
}

impl<F: Flash> FifoSource<F> {
    pub fn new(fifo: Fifo<F>, flashbase: String) -> FifoSource<F> {
        FifoSource { fifo, flashbase, cursor: 0 }
    }

    pub fn fifo(&self) -> &Fifo<F> {
        &self.fifo
    }
}

impl<F: Flash> SampleSource for FifoSource<F> {
    fn next(&mut self) -> Option<Sample> {
        let mut sample = self.fifo.peek(self.cursor).ok().flatten()?;
        self.cursor += 1;
        sample.source_id = Some(match sample.source_id.take() {
            Some(id) => format!("{}{}", self.flashbase, id),
            None => self.flashbase.clone(),
        });
        Some(sample)
    }

    fn commit(&mut self, n: u32) {
        let _ = self.fifo.drop_n(n);
        self.cursor = self.cursor.saturating_sub(n);
    }
}
