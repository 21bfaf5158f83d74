pub mod builtin;
pub mod config;
pub mod npy;
pub mod plugin_manager;
pub mod tracking;

pub use config::HostConfig;
pub use plugin_manager::{
    CommandHandler, CommandRequest, EntryPoints, Layer, LayerType, ManifestLoader, PluginError,
    PluginManager, PluginManifest,
};
pub use tracking::{Point, TrackingPanel};
