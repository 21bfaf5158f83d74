mod error;
mod layer;
mod loader;
mod manager;
mod manifest;
mod matcher;
mod registry;

pub use error::PluginError;
pub use layer::{Layer, LayerType};
pub use loader::{ManifestFormat, ManifestLoader};
pub use manager::{CommandHandler, CommandMatch, CommandRequest, EntryPoints, PluginManager};
pub use manifest::{
    qualified_id, CommandContribution, ContributionKind, Contributions, ManifestIssue,
    PluginManifest, PythonName, ReaderContribution, Visibility, WidgetContribution,
    WriterContribution,
};
pub use matcher::{LayerTypeConstraint, LayerTypeError, ReaderMatcher, WriterMatcher};
pub use registry::{LoadedPlugin, PluginRegistry};

// Re-export common types that consumers will need
pub type Result<T> = std::result::Result<T, PluginError>;

// Constants
pub const DEFAULT_MANIFEST_NAME: &str = "napari.yaml";
