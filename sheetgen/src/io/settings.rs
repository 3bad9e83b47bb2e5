//! Tiered settings backed by TOML files, plus an in-memory store.
//!
//! One TOML file per tier (`user`, `document`, `installation`). A missing
//! file is an empty tier; a malformed file is an error naming the path.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::resolve::{SettingsStore, Tier};

/// Optional file location for each tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPaths {
    pub user: Option<PathBuf>,
    pub document: Option<PathBuf>,
    pub installation: Option<PathBuf>,
}

impl SettingsPaths {
    fn tiers(&self) -> [(Tier, Option<&Path>); 3] {
        [
            (Tier::User, self.user.as_deref()),
            (Tier::Document, self.document.as_deref()),
            (Tier::Installation, self.installation.as_deref()),
        ]
    }
}

/// Settings held in memory, keyed by tier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    tiers: BTreeMap<Tier, Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemoryStore::set`].
    pub fn with(mut self, tier: Tier, key: &str, value: Value) -> Self {
        self.set(tier, key, value);
        self
    }

    pub fn set(&mut self, tier: Tier, key: &str, value: Value) {
        self.tiers
            .entry(tier)
            .or_default()
            .insert(key.to_string(), value);
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, tier: Tier, key: &str) -> Option<Value> {
        self.tiers.get(&tier)?.get(key).cloned()
    }
}

/// Load every configured tier into a [`MemoryStore`].
pub fn load_settings(paths: &SettingsPaths) -> Result<MemoryStore> {
    let mut store = MemoryStore::new();
    for (tier, path) in paths.tiers() {
        let Some(path) = path else {
            continue;
        };
        for (key, value) in load_tier(path)? {
            store.set(tier, &key, value);
        }
    }
    Ok(store)
}

/// Load one tier file. If the file is missing, returns an empty tier.
pub fn load_tier(path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        debug!(path = %path.display(), "settings file missing; tier is empty");
        return Ok(Map::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let table: toml::Table =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    let values = serde_json::to_value(table)
        .with_context(|| format!("convert {} to settings values", path.display()))?;
    match values {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_store_is_tier_scoped() {
        let store = MemoryStore::new()
            .with(Tier::Document, "model", json!("doc"))
            .with(Tier::Installation, "model", json!("install"));
        assert_eq!(store.get(Tier::Document, "model"), Some(json!("doc")));
        assert_eq!(store.get(Tier::Installation, "model"), Some(json!("install")));
        assert_eq!(store.get(Tier::User, "model"), None);
    }

    #[test]
    fn load_missing_tier_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let map = load_tier(&temp.path().join("missing.toml")).expect("load");
        assert!(map.is_empty());
    }

    #[test]
    fn load_settings_reads_each_tier() {
        let temp = tempfile::tempdir().expect("tempdir");
        let document = temp.path().join("document.toml");
        let installation = temp.path().join("installation.toml");
        fs::write(
            &document,
            "model = \"gpt-doc\"\nstrict = true\n\n[default_tool]\nname = \"web_search\"\nmax_results = 3\n",
        )
        .expect("write document");
        fs::write(&installation, "temperature = 0.7\nhard_count_cap = 50\n").expect("write install");

        let store = load_settings(&SettingsPaths {
            user: Some(temp.path().join("absent.toml")),
            document: Some(document),
            installation: Some(installation),
        })
        .expect("load");

        assert_eq!(store.get(Tier::Document, "model"), Some(json!("gpt-doc")));
        assert_eq!(store.get(Tier::Document, "strict"), Some(json!(true)));
        assert_eq!(
            store.get(Tier::Document, "default_tool"),
            Some(json!({"name": "web_search", "max_results": 3}))
        );
        assert_eq!(store.get(Tier::Installation, "temperature"), Some(json!(0.7)));
        assert_eq!(store.get(Tier::Installation, "hard_count_cap"), Some(json!(50)));
        assert_eq!(store.get(Tier::User, "api_key"), None);
    }

    #[test]
    fn malformed_file_names_the_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("broken.toml");
        fs::write(&path, "model = \n").expect("write");
        let err = load_tier(&path).expect_err("malformed");
        assert!(format!("{err:#}").contains("broken.toml"));
    }
}
