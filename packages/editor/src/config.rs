use crate::conflict::ResolutionPolicy;
use crate::errors::EditorError;
use crate::mapper::{MapperOptions, DEFAULT_WINDOW};
use duplex_parser::FormattingStyle;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "duplex.config.json";

/// Sync engine configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Tie-break for structural conflicts
    #[serde(default)]
    pub conflict_resolution: ResolutionPolicy,

    /// Keep key order and whitespace of existing metadata payloads
    #[serde(default = "default_true")]
    pub preserve_meta_formatting: bool,

    /// Bytes between a metadata comment and the block it describes
    #[serde(default = "default_window")]
    pub mapper_window: usize,

    /// Style used when regenerating source
    #[serde(default)]
    pub formatting: FormattingStyle,
}

fn default_true() -> bool {
    true
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

impl SyncConfig {
    /// Load config from a directory, falling back to defaults when there is none
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, EditorError> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: SyncConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(SyncConfig::default())
        }
    }

    pub fn mapper_options(&self) -> MapperOptions {
        MapperOptions {
            window: self.mapper_window,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_resolution: ResolutionPolicy::default(),
            preserve_meta_formatting: true,
            mapper_window: DEFAULT_WINDOW,
            formatting: FormattingStyle::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_parser::Indent;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "conflictResolution": "preferVisual",
            "preserveMetaFormatting": false,
            "mapperWindow": 128,
            "formatting": { "indent": "tabs" }
        }"#;

        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.conflict_resolution, ResolutionPolicy::PreferVisual);
        assert!(!config.preserve_meta_formatting);
        assert_eq!(config.mapper_window, 128);
        assert_eq!(config.formatting.indent, Indent::Tabs);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"formatting": {"indent": {"spaces": 2}}}"#).unwrap();
        assert_eq!(config.conflict_resolution, ResolutionPolicy::PreferText);
        assert!(config.preserve_meta_formatting);
        assert_eq!(config.mapper_window, DEFAULT_WINDOW);
        assert_eq!(config.formatting, FormattingStyle::spaces(2));
    }

    #[test]
    fn test_load_without_file_returns_default() {
        let dir = std::env::temp_dir().join("duplex-config-missing");
        let config = SyncConfig::load(&dir).unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = std::env::temp_dir().join(format!("duplex-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(DEFAULT_CONFIG_NAME), r#"{"mapperWindow": 8}"#).unwrap();

        let config = SyncConfig::load(&dir).unwrap();
        assert_eq!(config.mapper_window, 8);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = std::env::temp_dir().join(format!("duplex-config-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(DEFAULT_CONFIG_NAME), "{ not json").unwrap();

        let result = SyncConfig::load(&dir);
        assert!(matches!(result, Err(EditorError::Config(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
