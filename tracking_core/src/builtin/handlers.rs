//! Callables behind the bundled plugin's commands.

use crate::npy::{self, NpyArray};
use crate::plugin_manager::{CommandHandler, CommandRequest, Layer, LayerType, PluginError, Result};
use crate::tracking::{AnalysisOptions, LinkOptions, PanelInput, TrackingPanel};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn unexpected(command: &str, request: &CommandRequest) -> PluginError {
    PluginError::invoke(command, format!("unsupported {} request", request.kind()))
}

fn layer_array(command: &str, layer: &Layer) -> Result<NpyArray> {
    NpyArray::new(layer.shape.clone(), layer.data.clone())
        .map_err(|e| PluginError::invoke(command, format!("layer '{}': {}", layer.name, e)))
}

async fn save(command: &str, path: &Path, layer: &Layer) -> Result<PathBuf> {
    let array = layer_array(command, layer)?;
    npy::write(path, &array)
        .await
        .map_err(|e| PluginError::invoke(command, e.to_string()))?;
    debug!(layer = %layer.name, path = %path.display(), "Saved layer");
    Ok(path.to_path_buf())
}

/// Opens a `.npy` file as a single image layer named after the file
pub struct NpyReader;

#[async_trait]
impl CommandHandler for NpyReader {
    async fn invoke(&self, request: CommandRequest) -> Result<Value> {
        const COMMAND: &str = "get_reader";
        let path = match request {
            CommandRequest::Read { path } => path,
            other => return Err(unexpected(COMMAND, &other)),
        };

        let array = npy::read(&path)
            .await
            .map_err(|e| PluginError::invoke(COMMAND, format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string());

        info!(path = %path.display(), shape = ?array.shape, "Read layer data");
        let layer = Layer::new(name, LayerType::Image, array.shape, array.data);
        serde_json::to_value(vec![layer]).map_err(|e| PluginError::invoke(COMMAND, e.to_string()))
    }
}

/// Saves exactly one image layer to the requested `.npy` path
pub struct SingleImageWriter;

#[async_trait]
impl CommandHandler for SingleImageWriter {
    async fn invoke(&self, request: CommandRequest) -> Result<Value> {
        const COMMAND: &str = "write_single_image";
        let (path, layers) = match request {
            CommandRequest::Write { path, layers } => (path, layers),
            other => return Err(unexpected(COMMAND, &other)),
        };

        let layer = match layers.as_slice() {
            [layer] if layer.layer_type == LayerType::Image => layer,
            _ => {
                return Err(PluginError::invoke(
                    COMMAND,
                    format!("expected one image layer, got {}", layers.len()),
                ))
            }
        };

        let written = save(COMMAND, &path, layer).await?;
        Ok(json!([written]))
    }
}

/// File stem for a layer; repeated names get `_1`, `_2`, ... appended
fn unique_stem(taken: &mut HashSet<String>, layer: &Layer, index: usize) -> String {
    let base = if layer.name.trim().is_empty() {
        format!("layer_{}", index)
    } else {
        layer.name.replace(['/', '\\'], "_")
    };

    let mut stem = base.clone();
    let mut suffix = 1;
    while !taken.insert(stem.to_ascii_lowercase()) {
        stem = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    stem
}

/// Saves every layer as `<name>.npy` inside the requested directory
pub struct MultipleWriter;

#[async_trait]
impl CommandHandler for MultipleWriter {
    async fn invoke(&self, request: CommandRequest) -> Result<Value> {
        const COMMAND: &str = "write_multiple";
        let (dir, layers) = match request {
            CommandRequest::Write { path, layers } => (path, layers),
            other => return Err(unexpected(COMMAND, &other)),
        };

        tokio::fs::create_dir_all(&dir).await?;

        let mut stems = HashSet::new();
        let mut written = Vec::with_capacity(layers.len());
        for (index, layer) in layers.iter().enumerate() {
            let stem = unique_stem(&mut stems, layer, index);
            let path = dir.join(format!("{}.npy", stem));
            written.push(save(COMMAND, &path, layer).await?);
        }

        info!(dir = %dir.display(), layers = written.len(), "Saved layers");
        Ok(json!(written))
    }
}

/// The Particle Tracking widget: runs the tracking panel on the input points.
///
/// Options missing from the input fall back to the ones the widget was
/// built with.
pub struct TrackingWidget {
    link: LinkOptions,
    analysis: AnalysisOptions,
}

impl TrackingWidget {
    pub fn new(link: LinkOptions, analysis: AnalysisOptions) -> Self {
        Self { link, analysis }
    }
}

#[async_trait]
impl CommandHandler for TrackingWidget {
    async fn invoke(&self, request: CommandRequest) -> Result<Value> {
        const COMMAND: &str = "make_particle_tracking_widget";
        let input = match request {
            CommandRequest::Widget { input } | CommandRequest::Invoke { args: input } => input,
            other => return Err(unexpected(COMMAND, &other)),
        };

        let mut input: PanelInput = if input.is_null() {
            PanelInput::default()
        } else {
            serde_json::from_value(input).map_err(|e| PluginError::invoke(COMMAND, e.to_string()))?
        };
        input.link.get_or_insert(self.link);
        input.analysis.get_or_insert_with(|| self.analysis.clone());

        // Linking, fitting and CSV export are blocking work
        let report = tokio::task::spawn_blocking(move || TrackingPanel::run(input))
            .await
            .map_err(|e| PluginError::invoke(COMMAND, e.to_string()))?
            .map_err(|e| PluginError::invoke(COMMAND, e.to_string()))?;
        serde_json::to_value(report).map_err(|e| PluginError::invoke(COMMAND, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn image(name: &str) -> Layer {
        Layer::new(name, LayerType::Image, vec![2, 2], vec![1.0, 2.0, 3.0, 4.0])
    }

    #[tokio::test]
    async fn test_single_image_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("frame.npy");

        let written = SingleImageWriter
            .invoke(CommandRequest::Write {
                path: path.clone(),
                layers: vec![image("frame")],
            })
            .await
            .unwrap();
        assert_eq!(written, json!([path]));

        let read = NpyReader
            .invoke(CommandRequest::Read { path: path.clone() })
            .await
            .unwrap();
        let layers: Vec<Layer> = serde_json::from_value(read).unwrap();
        assert_eq!(layers, vec![image("frame")]);
    }

    #[tokio::test]
    async fn test_single_image_writer_rejects_two_layers() {
        let temp_dir = tempdir().unwrap();
        let result = SingleImageWriter
            .invoke(CommandRequest::Write {
                path: temp_dir.path().join("out.npy"),
                layers: vec![image("a"), image("b")],
            })
            .await;
        assert!(matches!(result, Err(PluginError::InvokeError { .. })));
    }

    #[tokio::test]
    async fn test_multiple_writer() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path().join("session");
        let labels = Layer::new("cells", LayerType::Labels, vec![4], vec![0.0, 1.0, 1.0, 2.0]);

        let written = MultipleWriter
            .invoke(CommandRequest::Write {
                path: dir.clone(),
                layers: vec![image("raw"), labels],
            })
            .await
            .unwrap();

        assert_eq!(written, json!([dir.join("raw.npy"), dir.join("cells.npy")]));
        assert!(dir.join("cells.npy").exists());
    }

    #[tokio::test]
    async fn test_multiple_writer_keeps_layers_with_the_same_name() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path().join("session");
        let first = Layer::new("cells", LayerType::Labels, vec![1], vec![1.0]);
        let second = Layer::new("cells", LayerType::Labels, vec![1], vec![2.0]);
        let third = Layer::new("Cells", LayerType::Image, vec![1], vec![3.0]);

        let written = MultipleWriter
            .invoke(CommandRequest::Write {
                path: dir.clone(),
                layers: vec![first, second, third],
            })
            .await
            .unwrap();

        assert_eq!(
            written,
            json!([dir.join("cells.npy"), dir.join("cells_1.npy"), dir.join("Cells_2.npy")])
        );
        assert_eq!(npy::read(dir.join("cells.npy")).await.unwrap().data, vec![1.0]);
        assert_eq!(npy::read(dir.join("cells_1.npy")).await.unwrap().data, vec![2.0]);
    }

    #[tokio::test]
    async fn test_writers_reject_oversized_shapes() {
        let temp_dir = tempdir().unwrap();
        let huge = Layer::new("huge", LayerType::Image, vec![usize::MAX, 2], vec![1.0]);
        let result = SingleImageWriter
            .invoke(CommandRequest::Write {
                path: temp_dir.path().join("huge.npy"),
                layers: vec![huge],
            })
            .await;
        assert!(matches!(result, Err(PluginError::InvokeError { .. })));
    }

    #[tokio::test]
    async fn test_reader_rejects_other_requests() {
        let result = NpyReader.invoke(CommandRequest::Invoke { args: Value::Null }).await;
        assert!(matches!(result, Err(PluginError::InvokeError { .. })));
    }

    #[tokio::test]
    async fn test_widget_runs_panel() {
        let widget = TrackingWidget::new(
            LinkOptions {
                search_range: 5.0,
                memory: 0,
            },
            AnalysisOptions::default(),
        );
        let points: Vec<Value> = (0..6)
            .map(|frame| json!({"frame": frame, "y": 1.0, "x": frame as f64}))
            .collect();

        let report = widget
            .invoke(CommandRequest::Widget {
                input: json!({ "points": points }),
            })
            .await
            .unwrap();
        assert_eq!(report["total_tracks"], json!(1));
        assert_eq!(report["tracked_points"].as_array().unwrap().len(), 6);

        let empty = widget.invoke(CommandRequest::Widget { input: Value::Null }).await;
        assert!(matches!(empty, Err(PluginError::InvokeError { .. })));
    }
}
