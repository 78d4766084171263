use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// Snapshots kept on the undo stack unless configured otherwise (20 steps)
pub const DEFAULT_MAXIMUM_HISTORY_SIZE: usize = 40;

/// Engine settings. Persisted as JSON; missing fields fall back to defaults
/// so settings saved by older builds keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on undo stack entries; one visible step takes two
    pub maximum_history_size: usize,
    /// Draw a checkerboard behind transparent pixels
    pub show_transparency_background: bool,
    /// Checkerboard cell edge in pixels
    pub checker_size: u32,
    pub checker_light: [u8; 4],
    pub checker_dark: [u8; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            maximum_history_size: DEFAULT_MAXIMUM_HISTORY_SIZE,
            show_transparency_background: true,
            checker_size: 8,
            checker_light: [255, 255, 255, 255],
            checker_dark: [204, 204, 204, 255],
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = EngineConfig::from_json(r#"{ "maximum_history_size": 6 }"#).unwrap();
        assert_eq!(config.maximum_history_size, 6);
        assert!(config.show_transparency_background);
        assert_eq!(config.checker_size, 8);
    }

    #[test]
    fn test_json_round_trip() {
        let config = EngineConfig {
            show_transparency_background: false,
            ..EngineConfig::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(EngineConfig::from_json("{ not json").is_err());
    }
}
