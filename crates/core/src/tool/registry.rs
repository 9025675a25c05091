use std::collections::HashSet;
use std::sync::Arc;

use toolbridge_model::ModelTool;

use super::object::{BoxedError, ToolServerObject};
use super::{ToolDescriptor, ToolServer};

/// Failed to fetch the tool catalog from the server.
#[derive(Debug, thiserror::Error)]
#[error("failed to list tools: {0}")]
pub struct RegistryError(#[source] BoxedError);

/// A snapshot of the tool server's catalog.
///
/// The catalog is fetched once and stays fixed afterwards. Clones share
/// the same snapshot.
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: Arc<[ToolDescriptor]>,
}

impl ToolRegistry {
    /// Fetches the catalog from `server`.
    pub async fn load<S: ToolServer>(server: &S) -> Result<Self, RegistryError> {
        let descriptors = server
            .list_tools()
            .await
            .map_err(|err| RegistryError(Box::new(err)))?;
        Ok(Self::from_descriptors(descriptors))
    }

    pub(crate) async fn load_from(
        server: &dyn ToolServerObject,
    ) -> Result<Self, RegistryError> {
        let descriptors = server.list_tools().await.map_err(RegistryError)?;
        Ok(Self::from_descriptors(descriptors))
    }

    /// Builds a registry out of known descriptors.
    ///
    /// Names are unique within a registry, later duplicates are dropped.
    pub fn from_descriptors<I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = ToolDescriptor>,
    {
        let mut seen = HashSet::new();
        let tools: Vec<_> = descriptors
            .into_iter()
            .filter(|descriptor| {
                let fresh = seen.insert(descriptor.name.clone());
                if !fresh {
                    warn!("duplicated tool `{}` is ignored", descriptor.name);
                }
                fresh
            })
            .collect();
        debug!("tool registry loaded with {} tools", tools.len());
        Self {
            tools: tools.into(),
        }
    }

    /// Returns all descriptors, in the order the server listed them.
    #[inline]
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|descriptor| descriptor.name == name)
    }

    /// Returns the number of tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if the server offers no tools.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Renders all tools as model tool declarations.
    pub fn model_tools(&self) -> Vec<ModelTool> {
        self.tools.iter().map(ToolDescriptor::to_model_tool).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_owned(),
            description: description.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicates_keep_first() {
        let registry = ToolRegistry::from_descriptors([
            descriptor("roll_die", "first"),
            descriptor("get_time", "clock"),
            descriptor("roll_die", "second"),
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("roll_die").unwrap().description, "first");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_list_is_stable() {
        let registry = ToolRegistry::from_descriptors([
            descriptor("b", ""),
            descriptor("a", ""),
        ]);
        let cloned = registry.clone();
        assert_eq!(registry.list(), cloned.list());
        let names: Vec<_> =
            registry.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(registry.model_tools().len(), 2);
    }
}
