//! Reader filename matching and writer layer/extension matching.

use super::layer::LayerType;
use super::manifest::{ReaderContribution, WriterContribution};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Compile a reader filename pattern the way every matcher does
pub(crate) fn compile_glob(pattern: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(pattern.trim())
        .case_insensitive(true)
        .literal_separator(false)
        .build()
}

/// Decides whether a reader contribution can open a path
#[derive(Debug, Clone)]
pub struct ReaderMatcher {
    command: String,
    accepts_directories: bool,
    /// Patterns without a separator, matched against the file name
    name_globs: GlobSet,
    /// Patterns containing a separator, matched against the whole path
    path_globs: GlobSet,
    pattern_count: usize,
}

impl ReaderMatcher {
    /// Build a matcher; `command` should be the qualified command id
    pub fn new(command: impl Into<String>, reader: &ReaderContribution) -> Result<Self, globset::Error> {
        let mut name_builder = GlobSetBuilder::new();
        let mut path_builder = GlobSetBuilder::new();

        for pattern in &reader.filename_patterns {
            let glob = compile_glob(pattern)?;
            if pattern.contains('/') {
                path_builder.add(glob);
            } else {
                name_builder.add(glob);
            }
        }

        Ok(Self {
            command: command.into(),
            accepts_directories: reader.accepts_directories,
            name_globs: name_builder.build()?,
            path_globs: path_builder.build()?,
            pattern_count: reader.filename_patterns.len(),
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Check a candidate path; `is_dir` says whether it names a directory
    pub fn matches(&self, path: &Path, is_dir: bool) -> bool {
        if is_dir && !self.accepts_directories {
            return false;
        }
        if self.pattern_count == 0 {
            return is_dir;
        }

        let name_match = path
            .file_name()
            .map(|name| self.name_globs.is_match(Path::new(name)))
            .unwrap_or(false);

        name_match || self.path_globs.is_match(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerTypeError {
    #[error("unknown layer type '{0}'")]
    UnknownLayerType(String),

    #[error("invalid multiplicity '{0}'")]
    InvalidMultiplicity(String),
}

/// A layer type together with how many layers of it a writer takes.
///
/// Suffixes: none is exactly one, `?` zero or one, `+` one or more,
/// `*` any number, `{n}` exactly n, `{n,m}` between n and m, `{n,}` at least n.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerTypeConstraint {
    pub layer_type: LayerType,
    pub min: usize,
    pub max: Option<usize>,
}

impl LayerTypeConstraint {
    pub fn parse(pattern: &str) -> Result<Self, LayerTypeError> {
        let pattern = pattern.trim();
        let split = pattern
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(pattern.len());
        let (name, suffix) = pattern.split_at(split);

        let layer_type = name
            .parse::<LayerType>()
            .map_err(|_| LayerTypeError::UnknownLayerType(name.to_string()))?;

        let (min, max) = match suffix {
            "" => (1, Some(1)),
            "?" => (0, Some(1)),
            "+" => (1, None),
            "*" => (0, None),
            braced => parse_braces(braced)
                .ok_or_else(|| LayerTypeError::InvalidMultiplicity(braced.to_string()))?,
        };

        Ok(Self {
            layer_type,
            min,
            max,
        })
    }

    /// Whether `count` layers of this type satisfy the constraint
    pub fn admits(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }
}

fn parse_braces(suffix: &str) -> Option<(usize, Option<usize>)> {
    let inner = suffix.strip_prefix('{')?.strip_suffix('}')?;
    match inner.split_once(',') {
        None => {
            let exact = inner.trim().parse().ok()?;
            Some((exact, Some(exact)))
        }
        Some((low, high)) => {
            let low: usize = low.trim().parse().ok()?;
            if high.trim().is_empty() {
                return Some((low, None));
            }
            let high: usize = high.trim().parse().ok()?;
            (low <= high).then_some((low, Some(high)))
        }
    }
}

/// Decides whether a writer contribution can save a set of layers to a path
#[derive(Debug, Clone)]
pub struct WriterMatcher {
    command: String,
    constraints: Vec<LayerTypeConstraint>,
    /// Lowercased, without the leading dot
    extensions: Vec<String>,
}

impl WriterMatcher {
    pub fn new(command: impl Into<String>, writer: &WriterContribution) -> Result<Self, LayerTypeError> {
        let constraints = writer
            .layer_types
            .iter()
            .map(|pattern| LayerTypeConstraint::parse(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        let extensions = writer
            .filename_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Ok(Self {
            command: command.into(),
            constraints,
            extensions,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Every layer type must be named by a constraint, and every constraint's
    /// count must be in range
    pub fn accepts_layers(&self, layers: &[LayerType]) -> bool {
        if layers.is_empty() {
            return false;
        }

        let mut counts: HashMap<LayerType, usize> = HashMap::new();
        for layer_type in layers {
            *counts.entry(*layer_type).or_default() += 1;
        }

        let all_named = counts
            .keys()
            .all(|layer_type| self.constraints.iter().any(|c| c.layer_type == *layer_type));

        all_named
            && self
                .constraints
                .iter()
                .all(|c| c.admits(counts.get(&c.layer_type).copied().unwrap_or(0)))
    }

    /// A path with no extension is accepted; the first extension is appended
    /// by [`WriterMatcher::output_path`]
    pub fn accepts_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() || path.extension().is_none() {
            return true;
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        self.extensions
            .iter()
            .any(|ext| file_name.ends_with(&format!(".{}", ext)))
    }

    /// Whether the path's extension is one this writer lists by name
    pub fn names_extension(&self, path: &Path) -> bool {
        !self.extensions.is_empty() && path.extension().is_some() && self.accepts_extension(path)
    }

    pub fn accepts(&self, layers: &[LayerType], path: &Path) -> bool {
        self.accepts_layers(layers) && self.accepts_extension(path)
    }

    /// The path the writer should produce for a requested path
    pub fn output_path(&self, path: &Path) -> PathBuf {
        match (path.extension(), self.extensions.first()) {
            (None, Some(ext)) => path.with_extension(ext),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(patterns: &[&str], accepts_directories: bool) -> ReaderMatcher {
        let contribution = ReaderContribution {
            command: "get_reader".to_string(),
            filename_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            accepts_directories,
        };
        ReaderMatcher::new("plugin.get_reader", &contribution).unwrap()
    }

    fn writer(layer_types: &[&str], extensions: &[&str]) -> WriterMatcher {
        let contribution = WriterContribution {
            command: "write".to_string(),
            layer_types: layer_types.iter().map(|p| p.to_string()).collect(),
            filename_extensions: extensions.iter().map(|p| p.to_string()).collect(),
            display_name: None,
        };
        WriterMatcher::new("plugin.write", &contribution).unwrap()
    }

    #[test]
    fn test_reader_filename_patterns() {
        let matcher = reader(&["*.npy"], false);
        assert!(matcher.matches(Path::new("particles.npy"), false));
        assert!(matcher.matches(Path::new("/data/run1/PARTICLES.NPY"), false));
        assert!(!matcher.matches(Path::new("particles.csv"), false));
        assert!(!matcher.matches(Path::new("particles.npy"), true));
    }

    #[test]
    fn test_reader_directories() {
        let any_dir = reader(&[], true);
        assert!(any_dir.matches(Path::new("/data/stack"), true));
        assert!(!any_dir.matches(Path::new("/data/stack.npy"), false));

        let zarr = reader(&["*.zarr"], true);
        assert!(zarr.matches(Path::new("/data/image.zarr"), true));
        assert!(!zarr.matches(Path::new("/data/image"), true));
    }

    #[test]
    fn test_reader_path_patterns() {
        let matcher = reader(&["**/tracks/*.npy"], false);
        assert!(matcher.matches(Path::new("/exp/tracks/a.npy"), false));
        assert!(!matcher.matches(Path::new("/exp/points/a.npy"), false));
    }

    #[test]
    fn test_layer_type_constraint_parsing() {
        let exact = LayerTypeConstraint::parse("image").unwrap();
        assert_eq!((exact.min, exact.max), (1, Some(1)));

        let optional = LayerTypeConstraint::parse("labels?").unwrap();
        assert_eq!((optional.min, optional.max), (0, Some(1)));

        let many = LayerTypeConstraint::parse("points+").unwrap();
        assert_eq!((many.min, many.max), (1, None));

        let ranged = LayerTypeConstraint::parse("shapes{2,4}").unwrap();
        assert_eq!((ranged.min, ranged.max), (2, Some(4)));
        assert!(ranged.admits(3));
        assert!(!ranged.admits(5));

        assert_eq!(
            LayerTypeConstraint::parse("volume"),
            Err(LayerTypeError::UnknownLayerType("volume".to_string()))
        );
        assert!(matches!(
            LayerTypeConstraint::parse("image{4,2}"),
            Err(LayerTypeError::InvalidMultiplicity(_))
        ));
    }

    #[test]
    fn test_single_image_writer() {
        let matcher = writer(&["image"], &[".npy"]);
        assert!(matcher.accepts(&[LayerType::Image], Path::new("out.npy")));
        assert!(!matcher.accepts(&[LayerType::Image], Path::new("out.tif")));
        assert!(!matcher.accepts(&[LayerType::Labels], Path::new("out.npy")));
        assert!(!matcher.accepts(&[LayerType::Image, LayerType::Image], Path::new("out.npy")));
    }

    #[test]
    fn test_multiple_layer_writer() {
        let matcher = writer(&["image*", "labels*"], &[]);
        assert!(matcher.accepts_layers(&[LayerType::Image, LayerType::Labels, LayerType::Image]));
        assert!(matcher.accepts_layers(&[LayerType::Labels]));
        assert!(!matcher.accepts_layers(&[LayerType::Image, LayerType::Points]));
        assert!(!matcher.accepts_layers(&[]));
        assert!(matcher.accepts_extension(Path::new("out.anything")));
    }

    #[test]
    fn test_names_extension() {
        assert!(writer(&["image"], &[".npy"]).names_extension(Path::new("a.npy")));
        assert!(!writer(&["image"], &[".npy"]).names_extension(Path::new("a")));
        assert!(!writer(&["image*"], &[]).names_extension(Path::new("a.npy")));
    }

    #[test]
    fn test_output_path_appends_extension() {
        let matcher = writer(&["image"], &["npy"]);
        assert!(matcher.accepts_extension(Path::new("out")));
        assert_eq!(matcher.output_path(Path::new("out")), PathBuf::from("out.npy"));
        assert_eq!(matcher.output_path(Path::new("out.NPY")), PathBuf::from("out.NPY"));
    }
}
