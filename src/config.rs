//! Engine configuration.
//!
//! Safety bounds and defaults consulted by the binder, the layout engine and
//! the paginator. Loadable from JSON so hosts can tune them without a rebuild.

use serde::{Deserialize, Serialize};

use crate::error::{Result, XfaError};

/// Knobs for one layout run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    /// How many times a child of an lr-tb/rl-tb container is retried on a
    /// fresh line before the container fails.
    pub max_lrtb_attempts: usize,
    /// Consecutive empty pages tolerated before pagination stops.
    pub max_empty_pages: usize,
    /// Typeface used when a node carries no `<font typeface>`.
    pub default_typeface: String,
    /// Font size in points used when a node carries no `<font size>`.
    pub default_font_size: f64,
    /// Page size in points (width, height) for a page area without a medium.
    pub default_medium: (f64, f64),
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            max_lrtb_attempts: 2,
            max_empty_pages: 3,
            default_typeface: "Myriad Pro".to_string(),
            default_font_size: 10.0,
            default_medium: (612.0, 792.0),
        }
    }
}

impl LayoutConfig {
    /// Parse a configuration from JSON. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| XfaError::Malformed(format!("config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LayoutConfig::default();
        assert_eq!(config.max_lrtb_attempts, 2);
        assert_eq!(config.max_empty_pages, 3);
        assert_eq!(config.default_medium, (612.0, 792.0));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = LayoutConfig::from_json(r#"{"maxEmptyPages": 5}"#).unwrap();
        assert_eq!(config.max_empty_pages, 5);
        assert_eq!(config.max_lrtb_attempts, 2);
        assert_eq!(config.default_typeface, "Myriad Pro");
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(LayoutConfig::from_json("{maxEmptyPages").is_err());
    }
}
