use super::loader::ManifestFormat;
use super::manifest::ManifestIssue;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse {format} manifest: {message}")]
    ParseError {
        format: ManifestFormat,
        message: String,
    },

    #[error("Invalid manifest: {}", join_issues(.0))]
    InvalidManifest(Vec<ManifestIssue>),

    #[error("Plugin already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Command {command} points at {python_name}, which is not bound")]
    UnresolvedCallable {
        command: String,
        python_name: String,
    },

    #[error("No reader accepts {}", .0.display())]
    NoReader(PathBuf),

    #[error("No writer accepts [{layers}] at {}", .path.display())]
    NoWriter { path: PathBuf, layers: String },

    #[error("Plugin {plugin} has no widget named {display_name}")]
    NoWidget {
        plugin: String,
        display_name: String,
    },

    #[error("Failed to invoke {command}: {message}")]
    InvokeError { command: String, message: String },

    #[error("Lock error: {0}")]
    LockError(String),
}

impl PluginError {
    /// Issues carried by an invalid manifest error, empty for every other kind
    pub fn issues(&self) -> &[ManifestIssue] {
        match self {
            PluginError::InvalidManifest(issues) => issues,
            _ => &[],
        }
    }

    pub(crate) fn invoke(command: impl Into<String>, message: impl ToString) -> Self {
        PluginError::InvokeError {
            command: command.into(),
            message: message.to_string(),
        }
    }
}

fn join_issues(issues: &[ManifestIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
