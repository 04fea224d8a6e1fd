//! Display surface for tallies: one slot per registered candidate.

use std::{collections::BTreeMap, io::Write};

use crate::ledger::VoteCount;
use crate::registry::DisplaySlot;

/// What a slot shows after a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotContent {
    Count(VoteCount),
    /// The query for this slot failed; the slot shows this instead of a count.
    Error(String),
}

impl SlotContent {
    pub fn text(&self) -> String {
        match self {
            SlotContent::Count(n) => n.to_string(),
            SlotContent::Error(reason) => format!("error: {reason}"),
        }
    }
}

pub trait Board {
    fn render(&mut self, slot: &DisplaySlot, content: &SlotContent);
}

/// Keeps the latest text of every slot; backs `--json` output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryBoard {
    slots: BTreeMap<DisplaySlot, String>,
}

impl MemoryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|(s, _)| s.as_str() == slot)
            .map(|(_, text)| text.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .slots
            .iter()
            .map(|(slot, text)| (slot.to_string(), serde_json::Value::String(text.clone())))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl Board for MemoryBoard {
    fn render(&mut self, slot: &DisplaySlot, content: &SlotContent) {
        self.slots.insert(slot.clone(), content.text());
    }
}

/// Writes one `slot<TAB>text` line per update.
pub struct TextBoard<W: Write> {
    out: W,
}

impl<W: Write> TextBoard<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Board for TextBoard<W> {
    fn render(&mut self, slot: &DisplaySlot, content: &SlotContent) {
        // a closed stdout is not worth aborting a vote over
        let _ = writeln!(self.out, "{slot}\t{}", content.text());
    }
}
