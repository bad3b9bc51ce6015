//! Catalog of configured tools.
//!
//! Descriptors are kept in declaration order and looked up by name or alias.

use std::sync::Arc;

use crate::descriptor::ToolDescriptor;
use crate::{Error, Result};

/// Ordered collection of tool descriptors.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<Arc<ToolDescriptor>>,
}

impl ToolCatalog {
    /// Create a new empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor. Later duplicates are shadowed by earlier entries.
    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.tools.push(Arc::new(descriptor));
    }

    /// First descriptor whose name or alias equals `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Arc<ToolDescriptor>> {
        self.tools.iter().find(|d| d.answers_to(name))
    }

    /// Like [`find`](Self::find), but a miss is a [`Error::ToolNotFound`].
    pub fn require(&self, name: &str) -> Result<Arc<ToolDescriptor>> {
        self.find(name)
            .cloned()
            .ok_or_else(|| Error::ToolNotFound {
                name: name.to_string(),
            })
    }

    /// Reject descriptors that cannot be addressed.
    pub fn validate(&self) -> Result<()> {
        if let Some(position) = self.tools.iter().position(|d| d.name.trim().is_empty()) {
            return Err(Error::invalid_config(
                None,
                format!("utility #{} has an empty name", position + 1),
            ));
        }
        Ok(())
    }

    /// Iterate over all descriptors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.tools.iter()
    }

    /// Get the number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Primary names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|d| d.name.as_str()).collect()
    }
}

impl FromIterator<ToolDescriptor> for ToolCatalog {
    fn from_iter<I: IntoIterator<Item = ToolDescriptor>>(iter: I) -> Self {
        Self {
            tools: iter.into_iter().map(Arc::new).collect(),
        }
    }
}
