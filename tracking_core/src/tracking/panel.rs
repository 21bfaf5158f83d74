use super::analysis::{analyze_tracks, AnalysisOptions, AnalysisReport};
use super::export::export_csv;
use super::linking::{link, LinkOptions};
use super::points::{filter_by_length, filter_points, group_tracks, Point, Track, TrackedPoint};
use super::{Result, TrackingError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Inclusive `[min, max]` range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

/// Where a run's CSV tables are written: `<dir>/<name>_<table>.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTarget {
    pub dir: PathBuf,
    pub name: String,
}

/// Everything the tracking widget needs for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelInput {
    pub points: Vec<Point>,
    /// Keep points whose intensity property lies in this range
    pub intensity_range: Option<ValueRange>,
    /// Keep tracks whose length lies in this range
    pub length_range: Option<ValueRange>,
    pub link: Option<LinkOptions>,
    pub analysis: Option<AnalysisOptions>,
    pub export: Option<ExportTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelReport {
    pub total_points: usize,
    pub filtered_points: usize,
    pub total_tracks: usize,
    pub kept_tracks: usize,
    pub tracked_points: Vec<TrackedPoint>,
    pub analysis: AnalysisReport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exported: Vec<PathBuf>,
}

/// Headless model of the tracking panel: points filtering, tracking,
/// track length filtering and tracks analysis, in that order
#[derive(Debug, Clone, Default)]
pub struct TrackingPanel {
    link_options: LinkOptions,
    analysis_options: AnalysisOptions,
    points: Vec<Point>,
    filtered: Vec<Point>,
    tracked: Vec<TrackedPoint>,
    tracks: Vec<Track>,
    kept: Vec<Track>,
}

impl TrackingPanel {
    pub fn new(link_options: LinkOptions, analysis_options: AnalysisOptions) -> Self {
        Self {
            link_options,
            analysis_options,
            ..Self::default()
        }
    }

    /// Replace the detected points; later steps are reset
    pub fn load_points(&mut self, points: Vec<Point>) {
        self.filtered = points.clone();
        self.points = points;
        self.tracked.clear();
        self.tracks.clear();
        self.kept.clear();
    }

    /// Keep points whose intensity lies in the range; returns how many remain
    pub fn filter_points(&mut self, range: ValueRange) -> usize {
        self.filtered = filter_points(
            &self.points,
            &self.analysis_options.intensity_property,
            range.min,
            range.max,
        );
        self.filtered.len()
    }

    /// Link the filtered points; returns the number of tracks
    pub fn track(&mut self) -> Result<usize> {
        if self.filtered.is_empty() {
            return Err(TrackingError::NotReady(
                "no points to track, load or widen the filter first".to_string(),
            ));
        }
        self.tracked = link(&self.filtered, &self.link_options)?;
        self.tracks = group_tracks(&self.tracked);
        self.kept = self.tracks.clone();
        Ok(self.tracks.len())
    }

    /// Keep tracks whose length lies in the range; returns how many remain
    pub fn filter_tracks(&mut self, range: ValueRange) -> Result<usize> {
        if self.tracks.is_empty() {
            return Err(TrackingError::NotReady(
                "generate the tracking first".to_string(),
            ));
        }
        let min = range.min.max(0.0).ceil() as usize;
        let max = if range.max.is_finite() {
            range.max.max(0.0).floor() as usize
        } else {
            usize::MAX
        };
        self.kept = filter_by_length(&self.tracks, min, max);
        Ok(self.kept.len())
    }

    pub fn analyze(&self) -> Result<AnalysisReport> {
        if self.tracks.is_empty() {
            return Err(TrackingError::NotReady(
                "generate the tracking first".to_string(),
            ));
        }
        analyze_tracks(&self.kept, &self.analysis_options)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.kept
    }

    /// Run every step on one input
    pub fn run(input: PanelInput) -> Result<PanelReport> {
        let mut panel = TrackingPanel::new(
            input.link.unwrap_or_default(),
            input.analysis.unwrap_or_default(),
        );
        let mut report = panel.run_steps(input.points, input.intensity_range, input.length_range)?;
        if let Some(target) = input.export {
            report.exported = panel.export(&report.analysis, &target.dir, &target.name)?;
        }
        Ok(report)
    }

    /// Write the all, MSD, MSD fit and filtered track tables of the last run
    pub fn export(&self, analysis: &AnalysisReport, dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
        if self.tracked.is_empty() {
            return Err(TrackingError::NotReady(
                "generate the tracking first".to_string(),
            ));
        }
        export_csv(dir, name, &self.tracked, &self.kept_points(), analysis)
    }

    fn kept_points(&self) -> Vec<TrackedPoint> {
        let kept_ids: Vec<u64> = self.kept.iter().map(|t| t.id).collect();
        self.tracked
            .iter()
            .filter(|t| kept_ids.contains(&t.track_id))
            .cloned()
            .collect()
    }

    /// Run every step with this panel's options
    pub fn run_steps(
        &mut self,
        points: Vec<Point>,
        intensity_range: Option<ValueRange>,
        length_range: Option<ValueRange>,
    ) -> Result<PanelReport> {
        let total_points = points.len();
        self.load_points(points);

        if let Some(range) = intensity_range {
            self.filter_points(range);
        }
        let total_tracks = self.track()?;
        if let Some(range) = length_range {
            self.filter_tracks(range)?;
        }
        let analysis = self.analyze()?;

        info!(
            total_points,
            filtered_points = self.filtered.len(),
            total_tracks,
            kept_tracks = self.kept.len(),
            "Tracking panel run finished"
        );

        Ok(PanelReport {
            total_points,
            filtered_points: self.filtered.len(),
            total_tracks,
            kept_tracks: self.kept.len(),
            tracked_points: self.kept_points(),
            analysis,
            exported: Vec::new(),
        })
    }

    pub fn link_options(&self) -> &LinkOptions {
        &self.link_options
    }

    pub fn analysis_options(&self) -> &AnalysisOptions {
        &self.analysis_options
    }
}
