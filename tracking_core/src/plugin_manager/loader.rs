use super::{error::PluginError, manifest::PluginManifest, Result};
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Serialization formats a manifest may be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Toml,
    Json,
}

impl ManifestFormat {
    /// Pick the format from the file extension, defaulting to YAML
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => ManifestFormat::Toml,
            Some("json") => ManifestFormat::Json,
            _ => ManifestFormat::Yaml,
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ManifestFormat::Yaml => "YAML",
            ManifestFormat::Toml => "TOML",
            ManifestFormat::Json => "JSON",
        })
    }
}

/// Reads manifests from disk or memory
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestLoader;

impl ManifestLoader {
    pub fn new() -> Self {
        Self
    }

    /// Deserialize a manifest without validating it
    pub fn deserialize(&self, content: &str, format: ManifestFormat) -> Result<PluginManifest> {
        let parsed = match format {
            ManifestFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            ManifestFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ManifestFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };

        parsed.map_err(|message| PluginError::ParseError { format, message })
    }

    /// Deserialize and validate a manifest
    pub fn parse_str(&self, content: &str, format: ManifestFormat) -> Result<PluginManifest> {
        let manifest = self.deserialize(content, format)?;
        manifest.ensure_valid()?;
        Ok(manifest)
    }

    /// Read a manifest file without validating it
    pub async fn read_from_file<P: AsRef<Path>>(&self, manifest_path: P) -> Result<PluginManifest> {
        let manifest_path = manifest_path.as_ref();
        debug!("Reading manifest: {:?}", manifest_path);

        let content = fs::read_to_string(manifest_path).await?;
        self.deserialize(&content, ManifestFormat::from_path(manifest_path))
    }

    /// Read and validate a manifest file
    pub async fn load_from_file<P: AsRef<Path>>(&self, manifest_path: P) -> Result<PluginManifest> {
        let manifest = self.read_from_file(manifest_path).await?;
        manifest.ensure_valid()?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_manager::ManifestIssue;
    use tempfile::tempdir;

    const YAML: &str = r#"
name: particle-tracking
display_name: Particle Tracking
categories: ["Segmentation"]
contributions:
  commands:
    - id: particle-tracking.get_reader
      python_name: particle_tracking._reader:get_reader
      title: Open data
  readers:
    - command: particle-tracking.get_reader
      filename_patterns: ["*.npy"]
"#;

    #[test]
    fn test_format_detection() {
        assert_eq!(ManifestFormat::from_path(Path::new("napari.yaml")), ManifestFormat::Yaml);
        assert_eq!(ManifestFormat::from_path(Path::new("napari.yml")), ManifestFormat::Yaml);
        assert_eq!(ManifestFormat::from_path(Path::new("plugin.TOML")), ManifestFormat::Toml);
        assert_eq!(ManifestFormat::from_path(Path::new("plugin.json")), ManifestFormat::Json);
        assert_eq!(ManifestFormat::from_path(Path::new("manifest")), ManifestFormat::Yaml);
    }

    #[test]
    fn test_parse_yaml() {
        let manifest = ManifestLoader::new().parse_str(YAML, ManifestFormat::Yaml).unwrap();
        assert_eq!(manifest.name, "particle-tracking");
        assert_eq!(manifest.categories, vec!["Segmentation".to_string()]);
        assert!(!manifest.contributions.readers[0].accepts_directories);
    }

    #[test]
    fn test_parse_json_and_toml() {
        let loader = ManifestLoader::new();
        let json = r#"{"name": "demo", "contributions": {"commands": [
            {"id": "demo.open", "python_name": "demo:open", "title": "Open"}
        ]}}"#;
        assert_eq!(loader.parse_str(json, ManifestFormat::Json).unwrap().name, "demo");

        let toml = r#"
name = "demo"
visibility = "hidden"

[[contributions.commands]]
id = "open"
python_name = "demo:open"
title = "Open"
"#;
        let manifest = loader.parse_str(toml, ManifestFormat::Toml).unwrap();
        assert!(manifest.command("demo.open").is_some());
    }

    #[test]
    fn test_parse_and_validation_errors_are_distinct() {
        let loader = ManifestLoader::new();

        let broken = "name: [unterminated";
        assert!(matches!(
            loader.parse_str(broken, ManifestFormat::Yaml),
            Err(PluginError::ParseError { format: ManifestFormat::Yaml, .. })
        ));

        let typo = "name: demo\ncontributions:\n  widgets:\n    - command: demo.w\n      display: W\n";
        assert!(matches!(
            loader.parse_str(typo, ManifestFormat::Yaml),
            Err(PluginError::ParseError { .. })
        ));

        let dangling = "name: demo\ncontributions:\n  widgets:\n    - command: demo.w\n      display_name: W\n";
        let err = loader.parse_str(dangling, ManifestFormat::Yaml).unwrap_err();
        assert!(matches!(
            err.issues(),
            [ManifestIssue::UnknownCommand { .. }]
        ));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("napari.yaml");
        std::fs::write(&path, YAML).unwrap();

        let manifest = ManifestLoader::new().load_from_file(&path).await.unwrap();
        assert_eq!(manifest.label(), "Particle Tracking");

        let missing = ManifestLoader::new()
            .load_from_file(temp_dir.path().join("absent.yaml"))
            .await;
        assert!(matches!(missing, Err(PluginError::IoError(_))));
    }
}
