pub mod store;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use store::{MemoryBackend, SettingsBackend, SettingsReadError, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    #[default]
    Multimodal,
    TextOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdDisplayMode {
    #[default]
    Highlight,
    Hide,
    Partial,
    LabelOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaDisplayMode {
    #[default]
    Blur,
    Hide,
    Border,
    None,
}

/// Immutable configuration snapshot. Replaced wholesale on every change and
/// compared by full structural equality; consumers never mutate it in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub excluded_contexts: Vec<String>,
    pub ad_enabled: bool,
    pub analysis_mode: AnalysisMode,
    pub ad_display_mode: AdDisplayMode,
    pub ad_threshold: f64,
    pub media_enabled: bool,
    pub media_display_mode: MediaDisplayMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            excluded_contexts: Vec::new(),
            ad_enabled: true,
            analysis_mode: AnalysisMode::Multimodal,
            ad_display_mode: AdDisplayMode::Highlight,
            ad_threshold: 0.5,
            media_enabled: true,
            media_display_mode: MediaDisplayMode::Blur,
        }
    }
}

impl Settings {
    /// Builds a snapshot from the loose key/value payload of the persistence
    /// collaborator. Every key has an explicit default and malformed values
    /// fall back per key, so a fresh load behaves like an explicit reset.
    pub fn from_values(values: &Map<String, Value>) -> Self {
        let defaults = Settings::default();
        let mut excluded_contexts: Vec<String> = values
            .get("excludedContexts")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|name| name.trim().to_lowercase())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        excluded_contexts.sort();
        excluded_contexts.dedup();

        Self {
            excluded_contexts,
            ad_enabled: bool_key(values, "adClassificationEnabled", defaults.ad_enabled),
            analysis_mode: enum_key(values, "analysisMode", defaults.analysis_mode),
            ad_display_mode: enum_key(values, "adDisplayMode", defaults.ad_display_mode),
            ad_threshold: threshold_key(values, "adThreshold", defaults.ad_threshold),
            media_enabled: bool_key(values, "mediaClassificationEnabled", defaults.media_enabled),
            media_display_mode: enum_key(values, "mediaDisplayMode", defaults.media_display_mode),
        }
    }

    pub fn context_excluded(&self, context: &str) -> bool {
        let context = context.to_lowercase();
        self.excluded_contexts.iter().any(|name| *name == context)
    }
}

fn bool_key(values: &Map<String, Value>, key: &str, default: bool) -> bool {
    values.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn enum_key<T>(values: &Map<String, Value>, key: &str, default: T) -> T
where
    T: serde::de::DeserializeOwned,
{
    values
        .get(key)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or(default)
}

fn threshold_key(values: &Map<String, Value>, key: &str, default: f64) -> f64 {
    values
        .get(key)
        .and_then(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        })
        .filter(|value| !value.is_nan())
        .map(|value| value.clamp(0.0, 1.0))
        .unwrap_or(default)
}
