//! Per-session tag dictionary (`spec.md` §4.E): maps a sensor tag (or, in
//! FIFO-backed sessions, a `(source_id, tag)` pair) to a small integer
//! emitted once via `DICT:` before first use.

use hashbrown::HashMap;

use crate::sample::Tag;

/// Per-session dictionary capacity, independent of (and generally tighter
/// than) the server-advertised `n_max` and the flash dictionary's 256-slot
/// sector capacity.
pub const MAX_ENTRIES: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    source_id: Option<String>,
    tag: Tag,
}

pub struct Dictionary {
    entries: HashMap<Key, u16>,
    next_index: u16,
}

/// Declaration to be emitted as `DICT:<idx>,<unit>,<unitdiv>,<name>`.
pub struct Declaration {
    pub index: u16,
    pub name: String,
}

pub enum Lookup {
    /// Tag already known; no `DICT:` line needed.
    Known(u16),
    /// Tag newly assigned; emit the given declaration before the data row.
    New(Declaration),
}

#[derive(Debug, PartialEq, Eq)]
pub struct DictionaryOverflow;

impl Dictionary {
    pub fn new() -> Dictionary {
        Dictionary { entries: HashMap::new(), next_index: 0 }
    }

    /// Looks up `tag` (optionally qualified by `source_id` in FIFO mode),
    /// assigning a fresh index and preparing a declaration when unseen.
    pub fn lookup(&mut self, source_id: Option<&str>, tag: &Tag, display_name: &str) -> Result<Lookup, DictionaryOverflow> {
        let key = Key { source_id: source_id.map(str::to_owned), tag: *tag };
        if let Some(&idx) = self.entries.get(&key) {
            return Ok(Lookup::Known(idx));
        }

        if self.entries.len() >= MAX_ENTRIES {
            return Err(DictionaryOverflow);
        }

        let idx = self.next_index;
        self.next_index += 1;
        self.entries.insert(key, idx);

        Ok(Lookup::New(Declaration { index: idx, name: display_name.to_owned() }))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.next_index = 0;
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}
