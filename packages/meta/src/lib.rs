//! Visual metadata embedded in source comments.
//!
//! The source buffer is the only place records live at rest: each node's
//! [`VisualMeta`] is one JSON object inside a `@META` comment. This crate
//! finds those comments, decodes them, and patches them in place.

pub mod codec;
pub mod error;
pub mod layout;
pub mod model;
pub mod relaxed;

pub use codec::{decode, read_all, remove, removal_span, scan, upsert, MetaCodec, MetaEntry, MetaScan, LEGACY_MARKER, MARKER};
pub use error::{CodecError, CodecResult, DecodeError};
pub use layout::JsonLayout;
pub use model::{AiNote, VisualMeta, DEFAULT_VERSION};
