//! Frozen, ordered view of the tools available for one model turn.

use super::entities::ToolDescriptor;
use crate::core::error::DomainError;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable snapshot of registered tools.
///
/// Cloning is cheap (descriptors are shared). A turn keeps the catalog it
/// was started with even if plugins are merged or removed while its calls
/// are in flight.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<Arc<ToolDescriptor>>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor. Names are unique within a catalog.
    pub fn push(&mut self, descriptor: Arc<ToolDescriptor>) -> Result<(), DomainError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(DomainError::duplicate_tool(descriptor.name.clone()));
        }
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<ToolDescriptor>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> Arc<ToolDescriptor> {
        Arc::new(ToolDescriptor::builtin(name, format!("{} tool", name)))
    }

    #[test]
    fn test_preserves_insertion_order() {
        let mut catalog = ToolCatalog::new();
        for name in ["read_file", "glob_search", "run_command"] {
            catalog.push(tool(name)).unwrap();
        }
        assert_eq!(catalog.names(), vec!["read_file", "glob_search", "run_command"]);
        assert_eq!(catalog.lookup("glob_search").map(|t| t.name.as_str()), Some("glob_search"));
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = ToolCatalog::new();
        catalog.push(tool("a")).unwrap();
        let err = catalog.push(tool("a")).unwrap_err();
        assert!(err.is_duplicate_name());
        assert_eq!(catalog.len(), 1);
    }
}
