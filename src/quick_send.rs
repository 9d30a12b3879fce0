// src/quick_send.rs
//
// Persisted list of named quick-send snippets. Loaded at startup and
// saved on change; the format is opaque to the engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::TermError;
use crate::transmit::PayloadMode;

/// One named snippet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuickSendItem {
    pub label: String,
    pub payload: String,
    #[serde(default)]
    pub mode: PayloadMode,
}

/// Load/save of the ordered quick-send list
pub trait PersistedList: Send + Sync {
    fn load(&self) -> Result<Vec<QuickSendItem>, TermError>;
    fn save(&self, items: &[QuickSendItem]) -> Result<(), TermError>;
}

/// JSON file store under the platform config directory
pub struct JsonQuickSendStore {
    path: PathBuf,
}

impl JsonQuickSendStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonQuickSendStore { path: path.into() }
    }

    /// `<config dir>/serimon/quick_send.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("serimon")
            .join("quick_send.json")
    }
}

impl Default for JsonQuickSendStore {
    fn default() -> Self {
        JsonQuickSendStore::new(Self::default_path())
    }
}

impl PersistedList for JsonQuickSendStore {
    fn load(&self) -> Result<Vec<QuickSendItem>, TermError> {
        if !self.path.exists() {
            // First run: nothing saved yet
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| TermError::Persist(format!("Failed to read quick-send list: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| TermError::Persist(format!("Failed to parse quick-send list: {}", e)))
    }

    fn save(&self, items: &[QuickSendItem]) -> Result<(), TermError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TermError::Persist(format!("Failed to create config dir: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(items)
            .map_err(|e| TermError::Persist(format!("Failed to serialize quick-send list: {}", e)))?;
        std::fs::write(&self.path, content)
            .map_err(|e| TermError::Persist(format!("Failed to write quick-send list: {}", e)))?;
        tlog!("[quick-send] Saved {} item(s)", items.len());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> JsonQuickSendStore {
        let path = std::env::temp_dir().join(format!(
            "serimon-quick-send-{}.json",
            uuid::Uuid::new_v4()
        ));
        JsonQuickSendStore::new(path)
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = temp_store();
        assert_eq!(store.load().unwrap(), Vec::new());
    }

    #[test]
    fn test_save_load_roundtrip_preserves_order() {
        let store = temp_store();
        let items = vec![
            QuickSendItem {
                label: "reset".to_string(),
                payload: "AT+RST".to_string(),
                mode: PayloadMode::Text,
            },
            QuickSendItem {
                label: "probe".to_string(),
                payload: "DE AD".to_string(),
                mode: PayloadMode::Hex,
            },
        ];
        store.save(&items).unwrap();
        assert_eq!(store.load().unwrap(), items);
    }

    #[test]
    fn test_missing_mode_defaults_to_text() {
        let store = temp_store();
        // Written by an older build without the mode field
        std::fs::write(&store.path, r#"[{"label":"ping","payload":"ping"}]"#).unwrap();
        let items = store.load().unwrap();
        assert_eq!(items[0].mode, PayloadMode::Text);
    }
}
