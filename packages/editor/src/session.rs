use crate::id_generator::IdGenerator;
use crate::mapper::{Mapping, SyncDiagnostics};
use duplex_common::{Language, TextRange};
use duplex_meta::VisualMeta;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Processing,
}

/// State of one open file, passed by reference into every engine call
///
/// The text is the authoritative copy; records, mapping and diagnostics are
/// derived from it on each call and replaced wholesale.
#[derive(Debug, Clone)]
pub struct SyncSession {
    name: String,
    pub(crate) language: Language,
    pub(crate) text: String,
    pub(crate) metas: Vec<VisualMeta>,
    pub(crate) mapping: Mapping,
    pub(crate) diagnostics: SyncDiagnostics,
    /// Ids deleted from the visual side; never minted again
    pub(crate) retired: BTreeSet<String>,
    pub(crate) ids: IdGenerator,
    pub(crate) state: SyncState,
}

impl SyncSession {
    pub fn new(name: impl Into<String>, language: Language) -> Self {
        let name = name.into();
        Self {
            ids: IdGenerator::new(&name),
            name,
            language,
            text: String::new(),
            metas: Vec::new(),
            mapping: Mapping::default(),
            diagnostics: SyncDiagnostics::default(),
            retired: BTreeSet::new(),
            state: SyncState::Idle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Stored records in source order
    pub fn metas(&self) -> &[VisualMeta] {
        &self.metas
    }

    pub fn meta(&self, id: &str) -> Option<&VisualMeta> {
        self.metas.iter().find(|m| m.id == id)
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn diagnostics(&self) -> &SyncDiagnostics {
        &self.diagnostics
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_retired(&self, id: &str) -> bool {
        self.retired.contains(id)
    }

    pub fn id_at(&self, offset: usize) -> Option<&str> {
        self.mapping.id_at(offset)
    }

    pub fn id_at_position(&self, line: usize, column: usize) -> Option<&str> {
        self.mapping.id_at_position(&self.text, line, column)
    }

    pub fn range_of(&self, id: &str) -> Option<TextRange> {
        self.mapping.range_of(id)
    }

    pub fn orphaned_blocks(&self) -> &BTreeSet<String> {
        &self.diagnostics.orphaned_blocks
    }

    pub fn unmapped_code(&self) -> &[TextRange] {
        &self.diagnostics.unmapped_code
    }

    /// Live and retired ids
    pub(crate) fn taken_ids(&self) -> BTreeSet<String> {
        self.metas
            .iter()
            .map(|m| m.id.clone())
            .chain(self.retired.iter().cloned())
            .collect()
    }
}
