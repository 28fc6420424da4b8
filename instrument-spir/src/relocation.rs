//! Per-section relocation stream (§4.3 "keeps a map from section → byte
//! span ... mutations happen through a relocation stream that reserves
//! fixed spans and appends variable-size new spans per section").
//!
//! Modeled directly on `Module::edits: RefCell<Vec<Edit>>`
//! + `into_vec_and_apply_edits` (`edit.rs`), generalized from one flat
//! edit list sorted by byte offset to one append-only word buffer per
//! section — §4.3 stitches whole sections in a fixed order rather than
//! splicing edits back into arbitrary offsets of a single stream.

use fxhash::FxHashMap;

use crate::sections::{SectionId, SECTION_ORDER};

#[derive(Debug, Default)]
pub struct RelocationStream {
    sections: FxHashMap<SectionId, Vec<u32>>,
}

impl RelocationStream {
    pub fn new() -> Self {
        let mut sections = FxHashMap::default();
        for &id in &SECTION_ORDER {
            sections.insert(id, Vec::new());
        }
        RelocationStream { sections }
    }

    /// Copy an already-encoded span of words verbatim into a section —
    /// the "reserves fixed spans" half: an unmodified instruction's
    /// original words, copied through unchanged.
    pub fn copy_words(&mut self, id: SectionId, words: &[u32]) {
        self.sections.get_mut(&id).expect("section id always present").extend_from_slice(words);
    }

    /// Append newly synthesized words to a section — the "appends
    /// variable-size new spans" half.
    pub fn append(&mut self, id: SectionId, words: impl IntoIterator<Item = u32>) {
        self.sections.get_mut(&id).expect("section id always present").extend(words);
    }

    /// Insert newly synthesized words at the head of a section, used by
    /// `prelude::reserve_export_globals` to put the counter/streams
    /// globals ahead of whatever the shader itself declared.
    pub fn prepend(&mut self, id: SectionId, words: impl IntoIterator<Item = u32>) {
        let buf = self.sections.get_mut(&id).expect("section id always present");
        let mut new_buf: Vec<u32> = words.into_iter().collect();
        new_buf.append(buf);
        *buf = new_buf;
    }

    pub fn section(&self, id: SectionId) -> &[u32] {
        &self.sections[&id]
    }

    /// Concatenate every section's words in the fixed `SECTION_ORDER`.
    pub fn into_words(self) -> Vec<u32> {
        let mut out = Vec::new();
        for &id in &SECTION_ORDER {
            out.extend(self.sections[&id].iter().copied());
        }
        out
    }
}
