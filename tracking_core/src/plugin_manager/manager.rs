use super::layer::{Layer, LayerType};
use super::loader::{ManifestFormat, ManifestLoader};
use super::manifest::{CommandContribution, PluginManifest, PythonName, WidgetContribution};
use super::registry::{LoadedPlugin, PluginRegistry};
use super::{error::PluginError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the host asks a bound callable to do
#[derive(Debug, Clone)]
pub enum CommandRequest {
    /// Open a path matched by a reader contribution
    Read { path: PathBuf },
    /// Save layers to a path matched by a writer contribution
    Write { path: PathBuf, layers: Vec<Layer> },
    /// Build a widget contribution and run it on the given input
    Widget { input: Value },
    /// Plain command invocation
    Invoke { args: Value },
}

impl CommandRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandRequest::Read { .. } => "read",
            CommandRequest::Write { .. } => "write",
            CommandRequest::Widget { .. } => "widget",
            CommandRequest::Invoke { .. } => "invoke",
        }
    }
}

/// Implementation of a callable named by a manifest's `python_name`
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn invoke(&self, request: CommandRequest) -> Result<Value>;
}

/// Table resolving callable references to handlers
#[derive(Clone, Default)]
pub struct EntryPoints {
    handlers: HashMap<PythonName, Arc<dyn CommandHandler>>,
}

impl EntryPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to a `module:symbol` reference
    pub fn bind(&mut self, python_name: &str, handler: Arc<dyn CommandHandler>) -> Result<()> {
        let name = python_name
            .parse::<PythonName>()
            .map_err(PluginError::UnknownCommand)?;
        if self.handlers.insert(name, handler).is_some() {
            warn!(python_name, "Replacing bound callable");
        }
        Ok(())
    }

    pub fn resolve(&self, python_name: &PythonName) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(python_name).cloned()
    }

    pub fn contains(&self, python_name: &str) -> bool {
        PythonName::parse(python_name)
            .map(|name| self.handlers.contains_key(&name))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.handlers.keys().map(ToString::to_string).collect();
        names.sort();
        f.debug_struct("EntryPoints").field("bound", &names).finish()
    }
}

/// A command picked for a request, with the plugin that declared it
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMatch {
    pub plugin: String,
    pub command: CommandContribution,
}

/// Host side of the plugin system: loads manifests, matches files and
/// layers against their contributions and dispatches to bound callables
#[derive(Debug, Clone)]
pub struct PluginManager {
    registry: PluginRegistry,
    entry_points: Arc<EntryPoints>,
    strict_entry_points: bool,
    loader: ManifestLoader,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(EntryPoints::new(), false)
    }
}

impl PluginManager {
    /// Create a manager; with `strict_entry_points` every command of a loaded
    /// manifest must have a bound callable
    pub fn new(entry_points: EntryPoints, strict_entry_points: bool) -> Self {
        Self {
            registry: PluginRegistry::new(),
            entry_points: Arc::new(entry_points),
            strict_entry_points,
            loader: ManifestLoader::new(),
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry_points
    }

    /// Load a plugin from a manifest file
    pub async fn load_plugin_from_file<P: AsRef<Path>>(&self, manifest_path: P) -> Result<Arc<LoadedPlugin>> {
        let manifest_path = manifest_path.as_ref();
        let manifest = self.loader.load_from_file(manifest_path).await?;
        self.load_manifest(manifest, Some(manifest_path.to_path_buf()))
    }

    /// Load a plugin from manifest text
    pub fn load_plugin_from_str(&self, content: &str, format: ManifestFormat) -> Result<Arc<LoadedPlugin>> {
        let manifest = self.loader.parse_str(content, format)?;
        self.load_manifest(manifest, None)
    }

    /// Validate, resolve callables and register a manifest
    pub fn load_manifest(
        &self,
        manifest: PluginManifest,
        manifest_path: Option<PathBuf>,
    ) -> Result<Arc<LoadedPlugin>> {
        debug!("Loading plugin: {}", manifest.name);
        manifest.ensure_valid()?;

        if self.strict_entry_points {
            for command in manifest.commands() {
                if !self.entry_points.contains(&command.python_name) {
                    return Err(PluginError::UnresolvedCallable {
                        command: manifest.qualify(&command.id),
                        python_name: command.python_name.clone(),
                    });
                }
            }
        }

        let plugin = self.registry.register(manifest, manifest_path)?;
        info!(
            plugin_name = plugin.name(),
            plugin_id = %plugin.id,
            commands = plugin.manifest.commands().len(),
            "Loaded plugin"
        );
        Ok(plugin)
    }

    pub fn unload_plugin(&self, name: &str) -> Result<()> {
        let plugin = self.registry.remove(name)?;
        info!(plugin_name = plugin.name(), plugin_id = %plugin.id, "Unloaded plugin");
        Ok(())
    }

    pub fn get_plugin(&self, name: &str) -> Result<Arc<LoadedPlugin>> {
        self.registry.get(name)
    }

    pub fn list_plugins(&self) -> Vec<Arc<LoadedPlugin>> {
        self.registry.list()
    }

    /// Every command of every plugin, ids qualified
    pub fn commands(&self) -> Vec<CommandMatch> {
        self.registry
            .list()
            .iter()
            .flat_map(|plugin| {
                plugin.manifest.commands().iter().map(move |command| CommandMatch {
                    plugin: plugin.name().to_string(),
                    command: CommandContribution {
                        id: plugin.manifest.qualify(&command.id),
                        ..command.clone()
                    },
                })
            })
            .collect()
    }

    /// First reader, by registration then declaration order, accepting the path
    pub fn reader_for(&self, path: &Path, is_dir: bool) -> Option<CommandMatch> {
        self.registry.list().iter().find_map(|plugin| {
            plugin
                .readers()
                .iter()
                .find(|reader| reader.matches(path, is_dir))
                .and_then(|reader| command_match(plugin, reader.command()))
        })
    }

    /// Every writer accepting the layers at the path, in priority order
    pub fn writers_for(&self, layers: &[LayerType], path: &Path) -> Vec<CommandMatch> {
        self.ranked_writers(layers, path)
            .into_iter()
            .map(|(selected, _)| selected)
            .collect()
    }

    /// Writers naming the path's extension come first, then catch-all
    /// writers; registration and declaration order break ties
    fn ranked_writers(&self, layers: &[LayerType], path: &Path) -> Vec<(CommandMatch, PathBuf)> {
        let mut ranked: Vec<(bool, CommandMatch, PathBuf)> = self
            .registry
            .list()
            .iter()
            .flat_map(|plugin| {
                plugin
                    .writers()
                    .iter()
                    .filter(|writer| writer.accepts(layers, path))
                    .filter_map(|writer| {
                        command_match(plugin, writer.command()).map(|selected| {
                            (!writer.names_extension(path), selected, writer.output_path(path))
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        ranked.sort_by_key(|(catch_all, _, _)| *catch_all);
        ranked
            .into_iter()
            .map(|(_, selected, output_path)| (selected, output_path))
            .collect()
    }

    /// Widget contributions of every plugin
    pub fn widgets(&self) -> Vec<(String, WidgetContribution)> {
        self.registry
            .list()
            .iter()
            .flat_map(|plugin| {
                plugin
                    .manifest
                    .contributions
                    .widgets
                    .iter()
                    .map(move |widget| (plugin.name().to_string(), widget.clone()))
            })
            .collect()
    }

    /// Open a path with the first reader that accepts it
    pub async fn read<P: AsRef<Path>>(&self, path: P) -> Result<Value> {
        let path = path.as_ref();
        let is_dir = tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);

        let selected = self
            .reader_for(path, is_dir)
            .ok_or_else(|| PluginError::NoReader(path.to_path_buf()))?;

        self.dispatch(
            &selected,
            CommandRequest::Read {
                path: path.to_path_buf(),
            },
        )
        .await
    }

    /// Save layers with the first writer that accepts them
    pub async fn write<P: AsRef<Path>>(&self, path: P, layers: Vec<Layer>) -> Result<Value> {
        let path = path.as_ref();
        let layer_types: Vec<LayerType> = layers.iter().map(|layer| layer.layer_type).collect();

        let (selected, output_path) = self
            .ranked_writers(&layer_types, path)
            .into_iter()
            .next()
            .ok_or_else(|| PluginError::NoWriter {
                path: path.to_path_buf(),
                layers: layer_types
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        self.dispatch(
            &selected,
            CommandRequest::Write {
                path: output_path,
                layers,
            },
        )
        .await
    }

    /// Instantiate a widget by display name and run it on `input`
    pub async fn instantiate_widget(&self, plugin: &str, display_name: &str, input: Value) -> Result<Value> {
        let loaded = self.registry.get(plugin)?;
        let widget = loaded
            .manifest
            .contributions
            .widgets
            .iter()
            .find(|widget| widget.display_name == display_name)
            .ok_or_else(|| PluginError::NoWidget {
                plugin: plugin.to_string(),
                display_name: display_name.to_string(),
            })?;

        let selected = command_match(&loaded, &widget.command)
            .ok_or_else(|| PluginError::UnknownCommand(widget.command.clone()))?;

        self.dispatch(&selected, CommandRequest::Widget { input }).await
    }

    /// Invoke a command by short or qualified id; the first plugin, in
    /// registration order, declaring it wins
    pub async fn invoke_command(&self, id: &str, args: Value) -> Result<Value> {
        let selected = self
            .registry
            .list()
            .iter()
            .find_map(|plugin| command_match(plugin, id))
            .ok_or_else(|| PluginError::UnknownCommand(id.to_string()))?;

        self.dispatch(&selected, CommandRequest::Invoke { args }).await
    }

    async fn dispatch(&self, selected: &CommandMatch, request: CommandRequest) -> Result<Value> {
        let command = &selected.command;
        let unresolved = || PluginError::UnresolvedCallable {
            command: command.id.clone(),
            python_name: command.python_name.clone(),
        };

        let python_name = PythonName::parse(&command.python_name).ok_or_else(unresolved)?;
        let handler = self.entry_points.resolve(&python_name).ok_or_else(unresolved)?;

        info!(
            plugin_name = %selected.plugin,
            command = %command.id,
            request = request.kind(),
            "Invoking command"
        );
        handler.invoke(request).await
    }
}

fn command_match(plugin: &LoadedPlugin, id: &str) -> Option<CommandMatch> {
    plugin.manifest.command(id).map(|command| CommandMatch {
        plugin: plugin.name().to_string(),
        command: CommandContribution {
            id: plugin.manifest.qualify(&command.id),
            ..command.clone()
        },
    })
}
