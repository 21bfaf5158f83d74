use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of layer the viewer can hand to a writer or receive from a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Graph,
    Image,
    Labels,
    Points,
    Shapes,
    Surface,
    Tracks,
    Vectors,
}

impl LayerType {
    pub const ALL: [LayerType; 8] = [
        LayerType::Graph,
        LayerType::Image,
        LayerType::Labels,
        LayerType::Points,
        LayerType::Shapes,
        LayerType::Surface,
        LayerType::Tracks,
        LayerType::Vectors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Graph => "graph",
            LayerType::Image => "image",
            LayerType::Labels => "labels",
            LayerType::Points => "points",
            LayerType::Shapes => "shapes",
            LayerType::Surface => "surface",
            LayerType::Tracks => "tracks",
            LayerType::Vectors => "vectors",
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        LayerType::ALL
            .into_iter()
            .find(|layer_type| layer_type.as_str() == lowered)
            .ok_or_else(|| format!("unknown layer type '{}'", s))
    }
}

/// Layer payload exchanged with reader and writer commands.
///
/// Data is stored flat in C order; `shape` gives its dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub layer_type: LayerType,
    #[serde(default)]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub data: Vec<f64>,
}

impl Layer {
    pub fn new(name: impl Into<String>, layer_type: LayerType, shape: Vec<usize>, data: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            layer_type,
            shape,
            data,
        }
    }

    /// Number of elements the shape describes, `None` when it overflows
    pub fn element_count(&self) -> Option<usize> {
        crate::npy::element_count(&self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_type_parsing() {
        assert_eq!("image".parse::<LayerType>().unwrap(), LayerType::Image);
        assert_eq!(" Labels ".parse::<LayerType>().unwrap(), LayerType::Labels);
        assert!("volume".parse::<LayerType>().is_err());
    }

    #[test]
    fn test_layer_serialization() {
        let layer = Layer::new("frame", LayerType::Image, vec![2, 2], vec![0.0, 1.0, 2.0, 3.0]);
        let value = serde_json::to_value(&layer).unwrap();
        assert_eq!(value["layer_type"], "image");
        assert_eq!(layer.element_count(), Some(4));

        let huge = Layer::new("huge", LayerType::Image, vec![usize::MAX, 2], vec![]);
        assert_eq!(huge.element_count(), None);
    }
}
