//! External tool name → backend routing table

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use mcpadapter_core::BackendDefinition;

use crate::error::ProxyError;

/// One routable tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolEntry {
    /// `{backend_id}_{native_name}`
    pub external_name: String,
    pub backend_id: String,
    pub backend_url: String,
    pub native_name: String,
    pub description: String,
}

impl ToolEntry {
    pub fn for_backend(backend: &BackendDefinition, native_name: &str) -> Self {
        Self {
            external_name: backend.external_tool_name(native_name),
            backend_id: backend.id.clone(),
            backend_url: backend.url.clone(),
            native_name: native_name.to_string(),
            description: format!("{} from {} server", native_name, backend.id),
        }
    }
}

/// Concurrent routing table; readers never observe a half-applied discovery
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, ToolEntry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a single entry
    pub fn register(&self, entry: ToolEntry) {
        self.entries
            .write()
            .insert(entry.external_name.clone(), entry);
    }

    /// Swap in a complete discovery result in one step
    pub fn replace_all(&self, entries: impl IntoIterator<Item = ToolEntry>) {
        let table: HashMap<String, ToolEntry> = entries
            .into_iter()
            .map(|e| (e.external_name.clone(), e))
            .collect();
        *self.entries.write() = table;
    }

    pub fn get(&self, external_name: &str) -> Option<ToolEntry> {
        self.entries.read().get(external_name).cloned()
    }

    /// Routing entry for a name, or `ToolNotFound` listing what is known
    pub fn resolve(&self, external_name: &str) -> Result<ToolEntry, ProxyError> {
        let entries = self.entries.read();
        match entries.get(external_name) {
            Some(entry) => Ok(entry.clone()),
            None => {
                let mut available: Vec<String> = entries.keys().cloned().collect();
                available.sort();
                Err(ProxyError::ToolNotFound {
                    name: external_name.to_string(),
                    available,
                })
            }
        }
    }

    /// All entries ordered by external name
    pub fn list(&self) -> Vec<ToolEntry> {
        let mut tools: Vec<ToolEntry> = self.entries.read().values().cloned().collect();
        tools.sort_by(|a, b| a.external_name.cmp(&b.external_name));
        tools
    }

    pub fn names(&self) -> Vec<String> {
        self.list().into_iter().map(|t| t.external_name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
