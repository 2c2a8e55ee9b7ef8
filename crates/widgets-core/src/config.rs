use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound of per-client creation indices, inclusive.
pub const MAX_IDX: u32 = 1000;

/// Placeholder title of a todo list created without one.
pub const DEFAULT_TASK_LIST_TITLE: &str = "Task list";

/// Widget types that were retired; seeing one is expected and not logged.
pub const RETIRED_WIDGET_TYPES: &[&str] = &["tictactoe"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetConfig {
    #[serde(default = "default_max_idx")]
    pub max_idx: u32,
    #[serde(default = "default_task_list_title")]
    pub default_task_list_title: String,
    #[serde(default = "default_retired_widget_types")]
    pub retired_widget_types: Vec<String>,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            max_idx: default_max_idx(),
            default_task_list_title: default_task_list_title(),
            retired_widget_types: default_retired_widget_types(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl WidgetConfig {
    #[must_use]
    pub fn is_retired(&self, widget_type: &str) -> bool {
        self.retired_widget_types.iter().any(|t| t == widget_type)
    }
}

const fn default_max_idx() -> u32 {
    MAX_IDX
}

fn default_task_list_title() -> String {
    DEFAULT_TASK_LIST_TITLE.to_string()
}

fn default_retired_widget_types() -> Vec<String> {
    RETIRED_WIDGET_TYPES
        .iter()
        .map(ToString::to_string)
        .collect()
}

const fn default_max_payload_bytes() -> usize {
    64 * 1024
}

/// Load widget settings from a TOML file. A missing file means defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<WidgetConfig> {
    if !path.exists() {
        return Ok(WidgetConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<WidgetConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}
