//! Tool registry and router.
//!
//! Merges the catalogs of every connected provider into one namespace,
//! applies the enablement policy and resolves tool names to the provider
//! that owns them. Every mutation invalidates the cached views before it
//! returns; reads rebuild them lazily.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::types::{ToolCatalogEntry, ToolSpec};

/// Enablement mode.
///
/// Only the disabled set decides whether a tool is enabled; the mode is
/// recorded for callers that present a default expectation to users.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnablementMode {
    #[default]
    All,
    Selective,
}

/// A tool name advertised by more than one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCollision {
    pub name: String,
    pub owner: String,
    pub rejected: String,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: Vec<ToolCatalogEntry>,
    providers: Vec<String>,
    disabled: HashSet<String>,
    mode: EnablementMode,
    collisions: Vec<ToolCollision>,
    routes: HashMap<String, String>,
    merged: Option<Arc<Vec<ToolSpec>>>,
}

impl RegistryState {
    fn invalidate(&mut self) {
        self.routes.clear();
        self.merged = None;
    }

    fn knows(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }
}

/// Thread-safe merged tool catalog.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    state: Mutex<RegistryState>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Merge a provider's catalog. Returns the number of tools it now owns.
    ///
    /// Re-registering a provider replaces its previous entries. A name already
    /// owned by another provider stays with that provider and the collision is
    /// recorded.
    pub fn register_provider_catalog(&self, provider_id: &str, entries: Vec<ToolCatalogEntry>) -> usize {
        let mut state = self.lock();
        state.entries.retain(|e| e.provider_id != provider_id);
        state.collisions.retain(|c| c.rejected != provider_id);
        if !state.providers.iter().any(|p| p == provider_id) {
            state.providers.push(provider_id.to_string());
        }

        let mut owned = 0;
        for mut entry in entries {
            if let Some(existing) = state.entries.iter().find(|e| e.name == entry.name) {
                tracing::warn!(
                    tool = %entry.name,
                    owner = %existing.provider_id,
                    rejected = %provider_id,
                    "tool advertised by multiple providers, keeping first owner"
                );
                let collision = ToolCollision {
                    name: entry.name.clone(),
                    owner: existing.provider_id.clone(),
                    rejected: provider_id.to_string(),
                };
                state.collisions.push(collision);
                continue;
            }
            entry.provider_id = provider_id.to_string();
            state.entries.push(entry);
            owned += 1;
        }
        state.invalidate();
        tracing::debug!(provider = %provider_id, tools = owned, "registered provider catalog");
        owned
    }

    /// Provider that owns `name`, if any. Enablement is not considered.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let mut state = self.lock();
        if let Some(provider) = state.routes.get(name) {
            return Some(provider.clone());
        }
        let provider = state
            .entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.provider_id.clone())?;
        state.routes.insert(name.to_string(), provider.clone());
        Some(provider)
    }

    /// Enabled tools as offered to the model, in registration order.
    pub fn merged_tool_specs(&self) -> Arc<Vec<ToolSpec>> {
        let mut state = self.lock();
        if let Some(merged) = &state.merged {
            return Arc::clone(merged);
        }
        let merged: Arc<Vec<ToolSpec>> = Arc::new(
            state
                .entries
                .iter()
                .filter(|e| !state.disabled.contains(&e.name))
                .map(ToolSpec::from)
                .collect(),
        );
        state.merged = Some(Arc::clone(&merged));
        merged
    }

    /// Disable or re-enable a tool. Returns false if no provider owns `name`.
    pub fn set_disabled(&self, name: &str, disabled: bool) -> bool {
        let mut state = self.lock();
        if !state.knows(name) {
            return false;
        }
        if disabled {
            state.disabled.insert(name.to_string());
        } else {
            state.disabled.remove(name);
        }
        state.invalidate();
        true
    }

    pub fn set_mode(&self, mode: EnablementMode) {
        let mut state = self.lock();
        state.mode = mode;
        state.invalidate();
    }

    pub fn mode(&self) -> EnablementMode {
        self.lock().mode
    }

    pub fn enable_all(&self) {
        let mut state = self.lock();
        state.disabled.clear();
        state.invalidate();
    }

    pub fn disable_all(&self) {
        let mut state = self.lock();
        let names: HashSet<String> = state.entries.iter().map(|e| e.name.clone()).collect();
        state.disabled = names;
        state.invalidate();
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        let state = self.lock();
        state.knows(name) && !state.disabled.contains(name)
    }

    /// Every registered tool, enabled or not, in registration order.
    pub fn catalog(&self) -> Vec<ToolCatalogEntry> {
        self.lock().entries.clone()
    }

    /// Tools owned by one provider.
    pub fn provider_catalog(&self, provider_id: &str) -> Vec<ToolCatalogEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.provider_id == provider_id)
            .cloned()
            .collect()
    }

    pub fn providers(&self) -> Vec<String> {
        self.lock().providers.clone()
    }

    pub fn collisions(&self) -> Vec<ToolCollision> {
        self.lock().collisions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entry(name: &str, description: &str) -> ToolCatalogEntry {
        ToolCatalogEntry::new("", name, description, json!({"type": "object"}))
    }

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register_provider_catalog("fs", vec![entry("read", "Read a file"), entry("write", "Write a file")]);
        registry.register_provider_catalog("web", vec![entry("fetch", "Fetch a URL"), entry("read", "Read a page")]);
        registry
    }

    fn names(specs: &[ToolSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn first_registration_wins_collision() {
        let registry = registry();
        assert_eq!(registry.resolve("read").as_deref(), Some("fs"));
        assert_eq!(registry.resolve("fetch").as_deref(), Some("web"));
        assert_eq!(
            registry.collisions(),
            vec![ToolCollision {
                name: "read".into(),
                owner: "fs".into(),
                rejected: "web".into(),
            }]
        );
        assert_eq!(registry.provider_catalog("web").len(), 1);
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        assert_eq!(registry().resolve("nonexistent"), None);
    }

    #[test]
    fn merged_specs_are_namespaced() {
        let specs = registry().merged_tool_specs();
        assert_eq!(names(&specs), vec!["read", "write", "fetch"]);
        assert_eq!(specs[0].description, "[fs] Read a file");
        assert_eq!(specs[2].description, "[web] Fetch a URL");
    }

    #[test]
    fn disabling_hides_and_reenabling_restores() {
        let registry = registry();
        let before = registry.merged_tool_specs();

        assert!(registry.set_disabled("write", true));
        assert_eq!(names(&registry.merged_tool_specs()), vec!["read", "fetch"]);
        assert!(!registry.is_enabled("write"));

        assert!(registry.set_disabled("write", false));
        let after = registry.merged_tool_specs();
        assert_eq!(after, before);
        assert_eq!(after[1].description, "[fs] Write a file");
    }

    #[test]
    fn disabling_unknown_tool_fails() {
        let registry = registry();
        assert!(!registry.set_disabled("missing", true));
        assert_eq!(registry.merged_tool_specs().len(), 3);
    }

    #[test]
    fn mode_does_not_change_enablement() {
        let registry = registry();
        registry.set_mode(EnablementMode::Selective);
        assert_eq!(registry.mode(), EnablementMode::Selective);
        assert_eq!(registry.merged_tool_specs().len(), 3);
        assert!(registry.is_enabled("fetch"));
    }

    #[test]
    fn bulk_mutators_rebuild_cache() {
        let registry = registry();
        registry.disable_all();
        assert!(registry.merged_tool_specs().is_empty());
        registry.enable_all();
        assert_eq!(registry.merged_tool_specs().len(), 3);
    }

    #[test]
    fn reregistering_provider_replaces_its_tools() {
        let registry = registry();
        registry.register_provider_catalog("web", vec![entry("search", "Search")]);
        assert_eq!(registry.resolve("fetch"), None);
        assert_eq!(registry.resolve("search").as_deref(), Some("web"));
        assert!(registry.collisions().is_empty());
        assert_eq!(registry.providers(), vec!["fs", "web"]);
    }

    #[test]
    fn mode_round_trips_through_strings() {
        assert_eq!("selective".parse::<EnablementMode>().unwrap(), EnablementMode::Selective);
        assert_eq!(EnablementMode::All.to_string(), "all");
    }
}
