//! Plugin manifest model and schema validation.

use super::matcher::{compile_glob, LayerTypeConstraint};
use super::{PluginError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// The name of the plugin, also the prefix of its command ids
    #[serde(default)]
    pub name: String,

    /// Human readable name shown by the host
    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub visibility: Visibility,

    /// Free form category tags
    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub contributions: Contributions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Hidden,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contributions {
    #[serde(default)]
    pub commands: Vec<CommandContribution>,

    #[serde(default)]
    pub readers: Vec<ReaderContribution>,

    #[serde(default)]
    pub writers: Vec<WriterContribution>,

    #[serde(default)]
    pub widgets: Vec<WidgetContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandContribution {
    #[serde(default)]
    pub id: String,

    /// Callable reference in `package.module:symbol` form
    #[serde(default)]
    pub python_name: String,

    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReaderContribution {
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub filename_patterns: Vec<String>,

    #[serde(default)]
    pub accepts_directories: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriterContribution {
    #[serde(default)]
    pub command: String,

    /// Layer type patterns such as `image`, `labels*` or `points{1,3}`
    #[serde(default)]
    pub layer_types: Vec<String>,

    /// Accepted extensions; empty accepts any
    #[serde(default)]
    pub filename_extensions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WidgetContribution {
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub display_name: String,
}

/// A parsed `module.path:symbol` callable reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PythonName {
    module: String,
    symbol: String,
}

impl PythonName {
    pub fn parse(value: &str) -> Option<Self> {
        let (module, symbol) = value.trim().split_once(':')?;
        if !is_dotted_identifier(module) || !is_dotted_identifier(symbol) {
            return None;
        }
        Some(Self {
            module: module.to_string(),
            symbol: symbol.to_string(),
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl fmt::Display for PythonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.symbol)
    }
}

impl FromStr for PythonName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PythonName::parse(s).ok_or_else(|| format!("invalid callable reference '{}'", s))
    }
}

fn is_dotted_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContributionKind {
    Reader,
    Writer,
    Widget,
}

impl fmt::Display for ContributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContributionKind::Reader => "reader",
            ContributionKind::Writer => "writer",
            ContributionKind::Widget => "widget",
        })
    }
}

/// A single schema violation found in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestIssue {
    #[error("missing required field `{field}`")]
    MissingField { field: String },

    #[error("command id `{id}` is declared more than once")]
    DuplicateCommand { id: String },

    #[error("{kind} references undeclared command `{id}`")]
    UnknownCommand { kind: ContributionKind, id: String },

    #[error("reader `{command}` rejects directories but declares no filename patterns")]
    EmptyFilenamePatterns { command: String },

    #[error("command `{id}` has invalid python_name `{value}`")]
    InvalidPythonName { id: String, value: String },

    #[error("reader `{command}` has invalid filename pattern `{pattern}`: {reason}")]
    InvalidFilenamePattern {
        command: String,
        pattern: String,
        reason: String,
    },

    #[error("writer `{command}` has invalid layer type `{pattern}`: {reason}")]
    InvalidLayerType {
        command: String,
        pattern: String,
        reason: String,
    },

    #[error("widget display name `{display_name}` is used more than once")]
    DuplicateWidget { display_name: String },
}

/// Expand a short command id (`get_reader`) into `<plugin>.<id>`
pub fn qualified_id(plugin_name: &str, id: &str) -> String {
    let id = id.trim();
    if plugin_name.is_empty() || id.starts_with(&format!("{}.", plugin_name)) {
        id.to_string()
    } else {
        format!("{}.{}", plugin_name, id)
    }
}

impl PluginManifest {
    /// Create a new manifest with no contributions
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            visibility: Visibility::default(),
            categories: Vec::new(),
            contributions: Contributions::default(),
        }
    }

    /// Display name, falling back to the plugin name
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    pub fn qualify(&self, id: &str) -> String {
        qualified_id(&self.name, id)
    }

    /// Commands in declaration order
    pub fn commands(&self) -> &[CommandContribution] {
        &self.contributions.commands
    }

    /// Look up a command by short or qualified id
    pub fn command(&self, id: &str) -> Option<&CommandContribution> {
        let wanted = self.qualify(id);
        self.contributions
            .commands
            .iter()
            .find(|command| self.qualify(&command.id) == wanted)
    }

    /// Collect every schema violation, in declaration order
    pub fn validate(&self) -> Vec<ManifestIssue> {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push(missing("name"));
        }

        let mut declared = HashSet::new();
        for (index, command) in self.contributions.commands.iter().enumerate() {
            if command.id.trim().is_empty() {
                issues.push(missing(format!("contributions.commands[{}].id", index)));
            } else if !declared.insert(self.qualify(&command.id)) {
                issues.push(ManifestIssue::DuplicateCommand {
                    id: command.id.clone(),
                });
            }

            if command.python_name.trim().is_empty() {
                issues.push(missing(format!(
                    "contributions.commands[{}].python_name",
                    index
                )));
            } else if PythonName::parse(&command.python_name).is_none() {
                issues.push(ManifestIssue::InvalidPythonName {
                    id: command.id.clone(),
                    value: command.python_name.clone(),
                });
            }

            if command.title.trim().is_empty() {
                issues.push(missing(format!("contributions.commands[{}].title", index)));
            }
        }

        for (index, reader) in self.contributions.readers.iter().enumerate() {
            self.check_reference(
                &declared,
                ContributionKind::Reader,
                &reader.command,
                format!("contributions.readers[{}].command", index),
                &mut issues,
            );

            if !reader.accepts_directories && reader.filename_patterns.is_empty() {
                issues.push(ManifestIssue::EmptyFilenamePatterns {
                    command: reader.command.clone(),
                });
            }

            for pattern in &reader.filename_patterns {
                if let Err(e) = compile_glob(pattern) {
                    issues.push(ManifestIssue::InvalidFilenamePattern {
                        command: reader.command.clone(),
                        pattern: pattern.clone(),
                        reason: e.kind().to_string(),
                    });
                }
            }
        }

        for (index, writer) in self.contributions.writers.iter().enumerate() {
            self.check_reference(
                &declared,
                ContributionKind::Writer,
                &writer.command,
                format!("contributions.writers[{}].command", index),
                &mut issues,
            );

            if writer.layer_types.is_empty() {
                issues.push(missing(format!(
                    "contributions.writers[{}].layer_types",
                    index
                )));
            }

            for pattern in &writer.layer_types {
                if let Err(e) = LayerTypeConstraint::parse(pattern) {
                    issues.push(ManifestIssue::InvalidLayerType {
                        command: writer.command.clone(),
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut widget_names = HashSet::new();
        for (index, widget) in self.contributions.widgets.iter().enumerate() {
            self.check_reference(
                &declared,
                ContributionKind::Widget,
                &widget.command,
                format!("contributions.widgets[{}].command", index),
                &mut issues,
            );

            if widget.display_name.trim().is_empty() {
                issues.push(missing(format!(
                    "contributions.widgets[{}].display_name",
                    index
                )));
            } else if !widget_names.insert(widget.display_name.as_str()) {
                issues.push(ManifestIssue::DuplicateWidget {
                    display_name: widget.display_name.clone(),
                });
            }
        }

        issues
    }

    /// Validate the manifest, failing with every issue found
    pub fn ensure_valid(&self) -> Result<()> {
        let issues = self.validate();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(PluginError::InvalidManifest(issues))
        }
    }

    fn check_reference(
        &self,
        declared: &HashSet<String>,
        kind: ContributionKind,
        command: &str,
        field: String,
        issues: &mut Vec<ManifestIssue>,
    ) {
        if command.trim().is_empty() {
            issues.push(missing(field));
        } else if !declared.contains(&self.qualify(command)) {
            issues.push(ManifestIssue::UnknownCommand {
                kind,
                id: command.to_string(),
            });
        }
    }
}

fn missing(field: impl Into<String>) -> ManifestIssue {
    ManifestIssue::MissingField {
        field: field.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(id: &str) -> CommandContribution {
        CommandContribution {
            id: id.to_string(),
            python_name: format!("particle_tracking._io:{}", id),
            title: format!("Run {}", id),
        }
    }

    fn reader(command: &str, patterns: &[&str], accepts_directories: bool) -> ReaderContribution {
        ReaderContribution {
            command: command.to_string(),
            filename_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            accepts_directories,
        }
    }

    fn valid_manifest() -> PluginManifest {
        let mut manifest = PluginManifest::new("particle-tracking", "Particle Tracking");
        manifest.contributions.commands = vec![command("get_reader"), command("write_image")];
        manifest.contributions.readers = vec![reader("get_reader", &["*.npy"], false)];
        manifest.contributions.writers = vec![WriterContribution {
            command: "particle-tracking.write_image".to_string(),
            layer_types: vec!["image".to_string()],
            filename_extensions: vec![".npy".to_string()],
            display_name: None,
        }];
        manifest
    }

    #[test]
    fn test_manifest_validation() {
        assert!(valid_manifest().validate().is_empty());
        assert!(valid_manifest().ensure_valid().is_ok());

        let invalid = PluginManifest::new("", "");
        assert_eq!(invalid.validate(), vec![missing("name")]);
    }

    #[test]
    fn test_duplicate_command_ids() {
        let mut manifest = valid_manifest();
        manifest.contributions.commands.push(CommandContribution {
            id: "particle-tracking.get_reader".to_string(),
            python_name: "particle_tracking._io:get_reader_v2".to_string(),
            title: "Open again".to_string(),
        });

        let issues = manifest.validate();
        assert_eq!(
            issues,
            vec![ManifestIssue::DuplicateCommand {
                id: "particle-tracking.get_reader".to_string()
            }]
        );
    }

    #[test]
    fn test_undeclared_command_reference() {
        let mut manifest = valid_manifest();
        manifest.contributions.widgets.push(WidgetContribution {
            command: "make_widget".to_string(),
            display_name: "Tracking".to_string(),
        });

        let issues = manifest.validate();
        assert_eq!(
            issues,
            vec![ManifestIssue::UnknownCommand {
                kind: ContributionKind::Widget,
                id: "make_widget".to_string()
            }]
        );
    }

    #[test]
    fn test_reader_patterns_required_without_directories() {
        let mut manifest = valid_manifest();
        manifest.contributions.readers = vec![reader("get_reader", &[], false)];
        assert!(matches!(
            manifest.validate().as_slice(),
            [ManifestIssue::EmptyFilenamePatterns { .. }]
        ));

        manifest.contributions.readers = vec![reader("get_reader", &[], true)];
        assert!(manifest.validate().is_empty());
    }

    #[test]
    fn test_invalid_filename_pattern() {
        let mut manifest = valid_manifest();
        manifest.contributions.readers = vec![reader("get_reader", &["*.npy", "[*.npy"], false)];

        match manifest.validate().as_slice() {
            [ManifestIssue::InvalidFilenamePattern {
                command,
                pattern,
                reason,
            }] => {
                assert_eq!(command, "get_reader");
                assert_eq!(pattern, "[*.npy");
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected issues {:?}", other),
        }
        assert!(manifest.ensure_valid().is_err());
    }

    #[test]
    fn test_duplicate_widget_names() {
        let mut manifest = valid_manifest();
        manifest.contributions.commands.push(command("make_widget"));
        let widget = WidgetContribution {
            command: "make_widget".to_string(),
            display_name: "Particle Tracking".to_string(),
        };
        manifest.contributions.widgets = vec![widget.clone(), widget];

        assert_eq!(
            manifest.validate(),
            vec![ManifestIssue::DuplicateWidget {
                display_name: "Particle Tracking".to_string()
            }]
        );
    }

    #[test]
    fn test_every_issue_is_reported() {
        let mut manifest = valid_manifest();
        manifest.contributions.commands[0].title.clear();
        manifest.contributions.commands[1].python_name = "not a callable".to_string();
        manifest.contributions.writers[0].layer_types = vec!["volume".to_string()];

        let issues = manifest.validate();
        assert_eq!(issues.len(), 3);
        assert!(matches!(issues[0], ManifestIssue::MissingField { .. }));
        assert!(matches!(issues[1], ManifestIssue::InvalidPythonName { .. }));
        assert!(matches!(issues[2], ManifestIssue::InvalidLayerType { .. }));

        let err = manifest.ensure_valid().unwrap_err();
        assert_eq!(err.issues().len(), 3);
    }

    #[test]
    fn test_python_name_parsing() {
        let name = PythonName::parse("napari_particle_tracking._reader:napari_get_reader").unwrap();
        assert_eq!(name.module(), "napari_particle_tracking._reader");
        assert_eq!(name.symbol(), "napari_get_reader");
        assert_eq!(
            name.to_string(),
            "napari_particle_tracking._reader:napari_get_reader"
        );

        assert!(PythonName::parse("napari_particle_tracking").is_none());
        assert!(PythonName::parse("pkg.1mod:fn").is_none());
        assert!(PythonName::parse(":fn").is_none());
    }

    #[test]
    fn test_command_lookup_by_short_and_qualified_id() {
        let manifest = valid_manifest();
        assert!(manifest.command("get_reader").is_some());
        assert!(manifest.command("particle-tracking.get_reader").is_some());
        assert!(manifest.command("missing").is_none());
        assert_eq!(manifest.label(), "Particle Tracking");
    }
}
