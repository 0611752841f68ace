//! # Duplex Editor
//!
//! Keeps a source file and its visual node graph in step.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ parser: source text → SyntaxTree of blocks  │
//! │ meta:   @META comments → VisualMeta records │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: SyncEngine                          │
//! │  - Map records to blocks (ElementMapper)    │
//! │  - Reconcile visual edits (ConflictResolver)│
//! │  - Patch comments in place (MetaCodec)      │
//! │  - Rebuild whole files (Generator)          │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ caller: text view + canvas                  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Text is source of truth**: records live only inside comments
//! 2. **Identity through ids**: blocks are re-created on every parse
//! 3. **Nothing is dropped silently**: problems come back as diagnostics
//! 4. **Explicit sessions**: no global state, one `SyncSession` per file
//!
//! ## Usage
//!
//! ```rust,ignore
//! use duplex_editor::{SyncConfig, SyncEngine, SyncMessage, SyncSession};
//!
//! let engine = SyncEngine::new(SyncConfig::load(".")?);
//! let mut session = SyncSession::new("main.rs", Language::Rust);
//!
//! // Text view edited
//! let out = engine.handle(&mut session, SyncMessage::TextChanged {
//!     text: std::fs::read_to_string("main.rs")?,
//!     language: Language::Rust,
//! })?;
//!
//! // Node dragged on the canvas
//! let mut meta = out.metas[0].clone();
//! meta.x += 40.0;
//! let out = engine.handle(&mut session, SyncMessage::VisualChanged { meta })?;
//! ```

pub mod config;
pub mod conflict;
pub mod engine;
pub mod errors;
pub mod generator;
pub mod id_generator;
pub mod mapper;
pub mod session;

pub use config::{SyncConfig, DEFAULT_CONFIG_NAME};
pub use conflict::{
    classify, resolve_at, ConflictRecord, ConflictResolver, ConflictType, ResolutionOption, ResolutionPolicy,
};
pub use engine::{SyncEngine, SyncMessage, SyncOutput};
pub use errors::EditorError;
pub use generator::{generate, GenerateError, GenerateInput, GenerateResult, Generator};
pub use id_generator::{session_seed, IdGenerator};
pub use mapper::{ElementMapper, MapperOptions, Mapping, SyncDiagnostics, DEFAULT_WINDOW};
pub use session::{SyncSession, SyncState};
