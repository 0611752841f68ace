//! The sync engine: one synchronous pass per message.
//!
//! ```text
//! TextChanged ──► parse ──► scan ──► map ──────────────────────────┐
//!                                                                  ▼
//! VisualChanged ──► resolve ──► upsert ──► parse ──► scan ──► map ──► SyncOutput
//! ```

use crate::config::SyncConfig;
use crate::conflict::{ConflictRecord, ConflictResolver, ConflictType};
use crate::errors::EditorError;
use crate::generator::{GenerateInput, Generator};
use crate::mapper::{ElementMapper, SyncDiagnostics};
use crate::session::{SyncSession, SyncState};
use chrono::Utc;
use duplex_common::{Language, TextRange};
use duplex_meta::{MetaCodec, VisualMeta, DEFAULT_VERSION};
use duplex_parser::{parse, FormattingStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Vertical spacing of nodes created for unmapped code
const ADOPT_SPACING: f64 = 80.0;

/// Input from either editing surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    TextChanged { text: String, language: Language },
    VisualChanged { meta: VisualMeta },
    VisualRemoved { id: String },
}

/// What the caller feeds back to both views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutput {
    pub text: String,
    pub metas: Vec<VisualMeta>,
    pub diagnostics: SyncDiagnostics,
    /// Set when a visual edit met a stored record
    pub conflict: Option<ConflictRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Process one message to completion
    pub fn handle(&self, session: &mut SyncSession, message: SyncMessage) -> Result<SyncOutput, EditorError> {
        session.state = SyncState::Processing;
        let result = match message {
            SyncMessage::TextChanged { text, language } => {
                debug!(session = %session.name(), language = %language, "Text changed");
                session.language = language;
                Ok(self.refresh(session, text))
            }
            SyncMessage::VisualChanged { meta } => self.visual_changed(session, meta),
            SyncMessage::VisualRemoved { id } => self.visual_removed(session, &id),
        };
        session.state = SyncState::Idle;
        result
    }

    /// Create records for every unmapped block, one per source line
    pub fn adopt_unmapped(&self, session: &mut SyncSession) -> Result<SyncOutput, EditorError> {
        session.state = SyncState::Processing;
        let result = self.adopt(session);
        session.state = SyncState::Idle;
        result
    }

    /// Rebuild the whole buffer from the stored records, formatted with the
    /// configured style
    pub fn regenerate(&self, session: &mut SyncSession) -> Result<SyncOutput, EditorError> {
        self.regenerate_with(session, self.config.formatting)
    }

    /// [`SyncEngine::regenerate`] with an explicit formatting style
    pub fn regenerate_with(&self, session: &mut SyncSession, style: FormattingStyle) -> Result<SyncOutput, EditorError> {
        session.state = SyncState::Processing;
        let generated = Generator::new(session.language)
            .with_style(style)
            .preserve_formatting(self.config.preserve_meta_formatting)
            .generate(&GenerateInput {
                source: &session.text,
                metas: &session.metas,
                blocks: session.mapping.blocks(),
            });
        let result = generated
            .map(|text| self.refresh(session, text))
            .map_err(EditorError::from);
        session.state = SyncState::Idle;
        result
    }

    fn codec(&self, session: &SyncSession) -> MetaCodec {
        MetaCodec::new(session.language).preserve_formatting(self.config.preserve_meta_formatting)
    }

    fn visual_changed(&self, session: &mut SyncSession, mut meta: VisualMeta) -> Result<SyncOutput, EditorError> {
        if meta.version == 0 {
            meta.version = DEFAULT_VERSION;
        }

        let (record, conflict) = match session.meta(&meta.id) {
            Some(old) => {
                let (resolved, conflict) = ConflictResolver::new(self.config.conflict_resolution).resolve(old, &meta);
                if conflict.conflict_type == ConflictType::Structural {
                    warn!(
                        id = %conflict.id,
                        resolution = ?conflict.resolution,
                        "Structural conflict between text and visual edits"
                    );
                } else {
                    debug!(
                        id = %conflict.id,
                        conflict_type = ?conflict.conflict_type,
                        resolution = ?conflict.resolution,
                        "Resolved visual edit"
                    );
                }
                (resolved, Some(conflict))
            }
            None if session.is_retired(&meta.id) => return Err(EditorError::RetiredId(meta.id)),
            None => {
                debug!(id = %meta.id, "New visual node");
                (meta, None)
            }
        };

        let text = self.codec(session).upsert(&session.text, &record, None)?;
        let mut output = self.refresh(session, text);
        output.conflict = conflict;
        Ok(output)
    }

    fn visual_removed(&self, session: &mut SyncSession, id: &str) -> Result<SyncOutput, EditorError> {
        if session.meta(id).is_none() {
            return Err(EditorError::UnknownId(id.to_string()));
        }

        let text = self.codec(session).remove(&session.text, id);
        session.retired.insert(id.to_string());
        debug!(id = %id, "Visual node removed");
        Ok(self.refresh(session, text))
    }

    fn adopt(&self, session: &mut SyncSession) -> Result<SyncOutput, EditorError> {
        let source = session.text.clone();
        let line_of = |offset: usize| source[..offset].matches('\n').count();

        let mut claimed_lines: BTreeSet<usize> = session
            .mapping
            .blocks()
            .iter()
            .filter(|b| b.is_mapped())
            .map(|b| line_of(b.range.start))
            .collect();

        let targets: Vec<TextRange> = session
            .mapping
            .unmapped()
            .map(|b| b.range)
            .filter(|r| claimed_lines.insert(line_of(r.start)))
            .collect();

        if targets.is_empty() {
            return Ok(self.output(session));
        }

        let base = session.metas.len();
        let now = Utc::now();
        let mut taken = session.taken_ids();
        let mut adopted: Vec<(VisualMeta, TextRange)> = Vec::with_capacity(targets.len());
        for (i, range) in targets.into_iter().enumerate() {
            let id = session.ids.next_id(|id| taken.contains(id));
            taken.insert(id.clone());
            let meta = VisualMeta::new(id, 0.0, ADOPT_SPACING * (base + i) as f64).with_updated_at(now);
            adopted.push((meta, range));
        }

        let codec = self.codec(session);
        let mut text = session.text.clone();
        for (meta, range) in adopted.iter().rev() {
            text = codec.upsert(&text, meta, Some(*range))?;
        }

        debug!(session = %session.name(), adopted = adopted.len(), "Adopted unmapped blocks");
        Ok(self.refresh(session, text))
    }

    /// Re-derive everything from `text` and store it in the session
    fn refresh(&self, session: &mut SyncSession, text: String) -> SyncOutput {
        let tree = parse(&text, session.language);
        let scan = self.codec(session).scan(&text);
        let (mapping, diagnostics) = ElementMapper::new(self.config.mapper_options()).map(&text, &tree, &scan);

        session.metas = scan.metas();
        session.mapping = mapping;
        session.diagnostics = diagnostics;
        session.text = text;

        self.output(session)
    }

    fn output(&self, session: &SyncSession) -> SyncOutput {
        SyncOutput {
            text: session.text.clone(),
            metas: session.metas.clone(),
            diagnostics: session.diagnostics.clone(),
            conflict: None,
        }
    }
}
