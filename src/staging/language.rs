// src/staging/language.rs
//! Language chunk metadata

use crate::config::LanguageEntry;
use std::collections::BTreeSet;

/// Label marking a placeholder language chunk
pub const EMPTY_LABEL: &str = "EMPTY";

/// Language entries for a package
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    entries: Vec<LanguageEntry>,
}

impl LanguageTable {
    pub fn new(entries: Vec<LanguageEntry>) -> Self {
        Self { entries }
    }

    fn live_entries(&self) -> impl Iterator<Item = &LanguageEntry> {
        self.entries.iter().filter(|e| e.label != EMPTY_LABEL)
    }

    /// Culture ids in declaration order, without duplicates or placeholders
    pub fn supported_languages(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.live_entries()
            .filter(|e| seen.insert(e.culture.as_str()))
            .map(|e| e.culture.as_str())
            .collect()
    }

    /// Culture flagged as default, falling back to the first live entry
    pub fn default_language(&self) -> Option<&str> {
        self.live_entries()
            .find(|e| e.default)
            .or_else(|| self.live_entries().next())
            .map(|e| e.culture.as_str())
    }

    /// Cultures stored in `chunk`
    pub fn languages_for_chunk(&self, chunk: u32) -> Vec<&str> {
        self.live_entries()
            .filter(|e| e.chunk == chunk)
            .map(|e| e.culture.as_str())
            .collect()
    }

    /// Label of the first live entry stored in `chunk`
    pub fn label_for_chunk(&self, chunk: u32) -> Option<&str> {
        self.live_entries()
            .find(|e| e.chunk == chunk)
            .map(|e| e.label.as_str())
    }

    /// Whether `chunk` is reserved by an `EMPTY` placeholder entry
    pub fn is_placeholder_chunk(&self, chunk: u32) -> bool {
        self.entries
            .iter()
            .any(|e| e.chunk == chunk && e.label == EMPTY_LABEL)
    }

    /// Chunks installed before the title can start; chunk 0 always is
    pub fn initial_chunks(&self) -> BTreeSet<u32> {
        let mut initial: BTreeSet<u32> = self
            .live_entries()
            .filter(|e| e.initial)
            .map(|e| e.chunk)
            .collect();
        initial.insert(0);
        initial
    }

    /// Chunk ids referenced by any entry
    pub fn chunks(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|e| e.chunk)
    }
}

/// Scenario ordering: initial chunks first, then the rest, each ascending
pub fn scenario_order(chunk_count: u32, initial: &BTreeSet<u32>) -> Vec<u32> {
    let (mut first, rest): (Vec<u32>, Vec<u32>) =
        (0..chunk_count).partition(|c| initial.contains(c));
    first.extend(rest);
    first
}
