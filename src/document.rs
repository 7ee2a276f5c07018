//! Server configuration and open-document records
//!
//! This module provides the runtime configuration of the language server and
//! the per-document data held while a file is open in the editor.

use std::path::PathBuf;

use serde_json::Value;
use slimlsp::cache::DEFAULT_CAPACITY;
use slimlsp::tracking::DEFAULT_CONSTANT_LOOKAHEAD;
use slimlsp::Mode;
use tower_lsp::lsp_types::Url;

/// Configuration for the language server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Lines scanned after `defineConstant(` for a value split over lines.
    pub constant_lookahead_lines: usize,
    pub cache_capacity: usize,
    pub debounce_ms: u64,
    pub docs_path: Option<PathBuf>,
    pub disabled_rules: Vec<String>,
    pub enabled: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            constant_lookahead_lines: DEFAULT_CONSTANT_LOOKAHEAD,
            cache_capacity: DEFAULT_CAPACITY,
            debounce_ms: 250,
            docs_path: None,
            disabled_rules: Vec::new(),
            enabled: true,
        }
    }
}

/// What an update touched, so the server only rebuilds what it must.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    /// Lookahead or disabled rules changed; cached analyses are stale.
    pub analysis: bool,
    pub docs: bool,
    pub cache_capacity: bool,
}

impl ConfigChanges {
    pub fn any(&self) -> bool {
        self.analysis || self.docs || self.cache_capacity
    }
}

impl Configuration {
    /// Apply settings from `initializationOptions` or a
    /// `workspace/didChangeConfiguration` payload. Keys that are missing or
    /// of the wrong type keep their current value. A payload nested under a
    /// `slim` key is accepted too.
    pub fn update(&mut self, value: &Value) -> ConfigChanges {
        let value = value.get("slim").unwrap_or(value);
        let before = self.clone();

        self.constant_lookahead_lines = value
            .get("constantLookaheadLines")
            .and_then(Value::as_u64)
            .map(|x| x as usize)
            .unwrap_or(self.constant_lookahead_lines);

        self.cache_capacity = value
            .get("cacheCapacity")
            .and_then(Value::as_u64)
            .map(|x| (x as usize).max(1))
            .unwrap_or(self.cache_capacity);

        self.debounce_ms = value
            .get("debounceMs")
            .and_then(Value::as_u64)
            .unwrap_or(self.debounce_ms);

        if let Some(path) = value.get("docsPath") {
            self.docs_path = path
                .as_str()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from);
        }

        if let Some(rules) = value.get("disabledRules").and_then(Value::as_array) {
            let mut rules: Vec<String> = rules
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            rules.sort();
            rules.dedup();
            self.disabled_rules = rules;
        }

        self.enabled = value
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(self.enabled);

        ConfigChanges {
            analysis: before.constant_lookahead_lines != self.constant_lookahead_lines
                || before.disabled_rules != self.disabled_rules,
            docs: before.docs_path != self.docs_path,
            cache_capacity: before.cache_capacity != self.cache_capacity,
        }
    }
}

/// An open document as last sent by the client.
#[derive(Debug, Clone)]
pub struct DocumentData {
    pub text: String,
    pub version: i32,
    pub mode: Mode,
}

impl DocumentData {
    pub fn new(uri: &Url, text: String, version: i32) -> Self {
        DocumentData {
            text,
            version,
            mode: Mode::from_path(uri.path()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn defaults() {
        let config = Configuration::default();
        assert_eq!(config.constant_lookahead_lines, 5);
        assert_eq!(config.cache_capacity, 64);
        assert_eq!(config.debounce_ms, 250);
        assert!(config.enabled);
    }

    #[test]
    fn update_reports_what_changed() {
        let mut config = Configuration::default();
        let changes = config.update(&json!({
            "constantLookaheadLines": 8,
            "disabledRules": ["semicolons", "functions", "semicolons"],
            "debounceMs": 100,
        }));
        assert_eq!(
            changes,
            ConfigChanges {
                analysis: true,
                docs: false,
                cache_capacity: false,
            }
        );
        assert_eq!(config.disabled_rules, vec!["functions", "semicolons"]);
        assert_eq!(config.debounce_ms, 100);

        let again = config.update(&json!({ "slim": { "constantLookaheadLines": 8 } }));
        assert!(!again.any());
    }

    #[test]
    fn wrong_types_keep_current_values() {
        let mut config = Configuration::default();
        config.update(&json!({ "cacheCapacity": "big", "enabled": 0, "docsPath": "/opt/slim" }));
        assert_eq!(config.cache_capacity, 64);
        assert!(config.enabled);
        assert_eq!(config.docs_path, Some(PathBuf::from("/opt/slim")));

        config.update(&json!({ "docsPath": null }));
        assert_eq!(config.docs_path, None);
    }

    #[test]
    fn mode_follows_extension() {
        let eidos = Url::parse("file:///work/helpers.eidos").unwrap();
        let slim = Url::parse("file:///work/model.slim").unwrap();
        assert_eq!(DocumentData::new(&eidos, String::new(), 1).mode, Mode::Eidos);
        assert_eq!(DocumentData::new(&slim, String::new(), 1).mode, Mode::Slim);
    }
}
