use super::manifest::{ManifestIssue, PluginManifest};
use super::matcher::{ReaderMatcher, WriterMatcher};
use super::{error::PluginError, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// A registered plugin with its matchers compiled
#[derive(Debug)]
pub struct LoadedPlugin {
    pub id: Uuid,
    pub manifest: PluginManifest,
    pub manifest_path: Option<PathBuf>,
    pub loaded_at: DateTime<Utc>,
    readers: Vec<ReaderMatcher>,
    writers: Vec<WriterMatcher>,
}

impl LoadedPlugin {
    /// Compile the reader and writer matchers of a validated manifest
    pub fn new(manifest: PluginManifest, manifest_path: Option<PathBuf>) -> Result<Self> {
        let readers = manifest
            .contributions
            .readers
            .iter()
            .map(|reader| {
                ReaderMatcher::new(manifest.qualify(&reader.command), reader).map_err(|e| {
                    PluginError::InvalidManifest(vec![ManifestIssue::InvalidFilenamePattern {
                        command: reader.command.clone(),
                        pattern: e.glob().unwrap_or_default().to_string(),
                        reason: e.kind().to_string(),
                    }])
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let writers = manifest
            .contributions
            .writers
            .iter()
            .map(|writer| {
                WriterMatcher::new(manifest.qualify(&writer.command), writer).map_err(|e| {
                    PluginError::InvalidManifest(vec![ManifestIssue::InvalidLayerType {
                        command: writer.command.clone(),
                        pattern: writer.layer_types.join(", "),
                        reason: e.to_string(),
                    }])
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: Uuid::new_v4(),
            manifest,
            manifest_path,
            loaded_at: Utc::now(),
            readers,
            writers,
        })
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Reader matchers in declaration order
    pub fn readers(&self) -> &[ReaderMatcher] {
        &self.readers
    }

    /// Writer matchers in declaration order
    pub fn writers(&self) -> &[WriterMatcher] {
        &self.writers
    }
}

/// Registry of loaded plugins, in registration order
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: Arc<RwLock<Vec<Arc<LoadedPlugin>>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin; names must be unique
    pub fn register(
        &self,
        manifest: PluginManifest,
        manifest_path: Option<PathBuf>,
    ) -> Result<Arc<LoadedPlugin>> {
        manifest.ensure_valid()?;

        let mut plugins = self
            .plugins
            .write()
            .map_err(|_| PluginError::LockError("Failed to acquire write lock".into()))?;

        if plugins.iter().any(|p| p.name() == manifest.name) {
            return Err(PluginError::AlreadyRegistered(manifest.name));
        }

        let plugin = Arc::new(LoadedPlugin::new(manifest, manifest_path)?);
        debug!(plugin_name = plugin.name(), plugin_id = %plugin.id, "Registered plugin");
        plugins.push(Arc::clone(&plugin));
        Ok(plugin)
    }

    /// Get a plugin by name
    pub fn get(&self, name: &str) -> Result<Arc<LoadedPlugin>> {
        self.read()?
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// List all registered plugins
    pub fn list(&self) -> Vec<Arc<LoadedPlugin>> {
        self.read().map(|plugins| plugins.clone()).unwrap_or_default()
    }

    /// Remove a plugin from the registry
    pub fn remove(&self, name: &str) -> Result<Arc<LoadedPlugin>> {
        let mut plugins = self
            .plugins
            .write()
            .map_err(|_| PluginError::LockError("Failed to acquire write lock".into()))?;

        let index = plugins
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        Ok(plugins.remove(index))
    }

    pub fn len(&self) -> usize {
        self.read().map(|plugins| plugins.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Arc<LoadedPlugin>>>> {
        self.plugins
            .read()
            .map_err(|_| PluginError::LockError("Failed to acquire read lock".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_manager::{CommandContribution, ReaderContribution};
    use std::path::Path;

    fn manifest(name: &str) -> PluginManifest {
        let mut manifest = PluginManifest::new(name, "Test plugin");
        manifest.contributions.commands.push(CommandContribution {
            id: "open".to_string(),
            python_name: "test_plugin:open".to_string(),
            title: "Open".to_string(),
        });
        manifest.contributions.readers.push(ReaderContribution {
            command: "open".to_string(),
            filename_patterns: vec!["*.npy".to_string()],
            accepts_directories: false,
        });
        manifest
    }

    #[test]
    fn test_plugin_registry() {
        let registry = PluginRegistry::new();

        let plugin = registry
            .register(manifest("test-plugin"), Some(PathBuf::from("napari.yaml")))
            .unwrap();
        assert_eq!(plugin.readers()[0].command(), "test-plugin.open");
        assert!(plugin.readers()[0].matches(Path::new("a.npy"), false));

        // Get plugin
        let fetched = registry.get("test-plugin").unwrap();
        assert_eq!(fetched.id, plugin.id);

        // List plugins
        assert_eq!(registry.list().len(), 1);

        // Duplicate names are rejected
        assert!(matches!(
            registry.register(manifest("test-plugin"), None),
            Err(PluginError::AlreadyRegistered(_))
        ));

        // Remove plugin
        registry.remove("test-plugin").unwrap();
        assert!(matches!(
            registry.get("test-plugin"),
            Err(PluginError::NotFound(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_rejects_invalid_manifest() {
        let registry = PluginRegistry::new();
        let mut invalid = manifest("broken");
        invalid.contributions.commands.clear();

        assert!(matches!(
            registry.register(invalid, None),
            Err(PluginError::InvalidManifest(_))
        ));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = PluginRegistry::new();
        let clone = registry.clone();
        registry.register(manifest("shared"), None).unwrap();
        assert!(clone.get("shared").is_ok());
    }
}
