//! The bundled Particle Tracking plugin: its manifest and the callables its
//! commands name.

mod handlers;

pub use handlers::{MultipleWriter, NpyReader, SingleImageWriter, TrackingWidget};

use crate::config::HostConfig;
use crate::plugin_manager::{
    EntryPoints, ManifestFormat, ManifestLoader, PluginManager, PluginManifest, Result,
};
use std::sync::Arc;
use tracing::info;

pub const PLUGIN_NAME: &str = "napari-particle-tracking";
pub const WIDGET_NAME: &str = "Particle Tracking";
pub const MANIFEST: &str = include_str!("napari.yaml");

pub const READER: &str = "napari_particle_tracking._reader:napari_get_reader";
pub const MULTIPLE_WRITER: &str = "napari_particle_tracking._writer:write_multiple";
pub const SINGLE_IMAGE_WRITER: &str = "napari_particle_tracking._writer:write_single_image";
pub const WIDGET: &str = "napari_particle_tracking:ParticleTrackingWidget";

/// Parse and validate the bundled manifest
pub fn manifest() -> Result<PluginManifest> {
    ManifestLoader::new().parse_str(MANIFEST, ManifestFormat::Yaml)
}

/// Callables of the bundled plugin; the widget takes its defaults from `config`
pub fn entry_points(config: &HostConfig) -> Result<EntryPoints> {
    let mut entry_points = EntryPoints::new();
    entry_points.bind(READER, Arc::new(NpyReader))?;
    entry_points.bind(MULTIPLE_WRITER, Arc::new(MultipleWriter))?;
    entry_points.bind(SINGLE_IMAGE_WRITER, Arc::new(SingleImageWriter))?;
    entry_points.bind(
        WIDGET,
        Arc::new(TrackingWidget::new(config.tracking, config.analysis.clone())),
    )?;
    Ok(entry_points)
}

/// Build a manager holding the bundled plugin (unless disabled) and every
/// manifest listed in the configuration
pub async fn manager(config: &HostConfig) -> Result<PluginManager> {
    let manager = PluginManager::new(entry_points(config)?, config.plugins.strict_entry_points);

    if config.plugins.builtin {
        manager.load_manifest(manifest()?, None)?;
    }
    for path in &config.plugins.manifests {
        manager.load_plugin_from_file(path).await?;
    }

    info!(plugins = manager.list_plugins().len(), "Plugin host ready");
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_manager::PluginError;
    use crate::LayerType;
    use std::path::Path;

    #[test]
    fn test_bundled_manifest_is_valid() {
        let manifest = manifest().unwrap();
        assert_eq!(manifest.name, PLUGIN_NAME);
        assert_eq!(manifest.label(), "Particle Tracking");
        assert_eq!(manifest.commands().len(), 4);
        assert_eq!(manifest.contributions.readers[0].filename_patterns, vec!["*.npy"]);
        assert_eq!(manifest.contributions.widgets[0].display_name, WIDGET_NAME);
        assert!(manifest.validate().is_empty());
    }

    #[test]
    fn test_every_command_is_bound() {
        let entry_points = entry_points(&HostConfig::default()).unwrap();
        let manifest = manifest().unwrap();
        for command in manifest.commands() {
            assert!(entry_points.contains(&command.python_name), "{}", command.id);
        }
        assert_eq!(entry_points.len(), 4);
    }

    #[tokio::test]
    async fn test_manager_matches_contributions() {
        let manager = manager(&HostConfig::default()).await.unwrap();

        let reader = manager.reader_for(Path::new("particles.npy"), false).unwrap();
        assert_eq!(reader.command.id, "napari-particle-tracking.get_reader");
        assert!(manager.reader_for(Path::new("particles.csv"), false).is_none());

        let writers = manager.writers_for(&[LayerType::Image], Path::new("out.npy"));
        assert_eq!(
            writers[0].command.id,
            "napari-particle-tracking.write_single_image"
        );
        assert!(manager
            .writers_for(&[LayerType::Image], Path::new("out.tif"))
            .iter()
            .all(|w| w.command.id != "napari-particle-tracking.write_single_image"));
    }

    #[tokio::test]
    async fn test_builtin_can_be_disabled() {
        let mut config = HostConfig::default();
        config.plugins.builtin = false;
        let manager = manager(&config).await.unwrap();
        assert!(manager.list_plugins().is_empty());
        assert!(matches!(
            manager.get_plugin(PLUGIN_NAME),
            Err(PluginError::NotFound(_))
        ));
    }
}
