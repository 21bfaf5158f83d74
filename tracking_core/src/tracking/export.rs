//! CSV export of a tracking run.

use super::analysis::AnalysisReport;
use super::points::TrackedPoint;
use super::{Result, TrackingError};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

impl From<csv::Error> for TrackingError {
    fn from(e: csv::Error) -> Self {
        TrackingError::ExportFailed(e.to_string())
    }
}

#[derive(Serialize)]
struct MsdRow {
    track_id: u64,
    lag: usize,
    msd: f64,
}

#[derive(Serialize)]
struct MsdFitRow {
    track_id: u64,
    lag: usize,
    alpha: f64,
    diffusion: f64,
    fit: f64,
}

/// Write `<name>_all_tracks.csv`, `<name>_msd.csv`, `<name>_msd_fit.csv`
/// and `<name>_filtered_tracks.csv` into `dir`, creating it if needed.
///
/// `all` holds every linked point, `kept` the points of the tracks that
/// survived length filtering.
pub fn export_csv(
    dir: &Path,
    name: &str,
    all: &[TrackedPoint],
    kept: &[TrackedPoint],
    analysis: &AnalysisReport,
) -> Result<Vec<PathBuf>> {
    if name.trim().is_empty() || name.contains(['/', '\\']) {
        return Err(TrackingError::InvalidParameter(format!(
            "export name must be a plain file stem, got '{}'",
            name
        )));
    }
    fs::create_dir_all(dir).map_err(|e| {
        TrackingError::ExportFailed(format!("{}: {}", dir.display(), e))
    })?;

    let path = |suffix: &str| dir.join(format!("{}_{}.csv", name, suffix));
    let written = vec![
        write_points(&path("all_tracks"), all)?,
        write_msd(&path("msd"), analysis)?,
        write_msd_fit(&path("msd_fit"), analysis)?,
        write_points(&path("filtered_tracks"), kept)?,
    ];

    info!(dir = %dir.display(), name, files = written.len(), "Exported tracking results");
    Ok(written)
}

/// One row per point: `track_id, frame, [z,] y, x` then every property name
/// seen, blank where a point lacks it
fn write_points(path: &Path, points: &[TrackedPoint]) -> Result<PathBuf> {
    let has_z = points.iter().any(|p| p.point.z.is_some());
    let properties: BTreeSet<&str> = points
        .iter()
        .flat_map(|p| p.point.properties.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["track_id", "frame"];
    if has_z {
        header.push("z");
    }
    header.extend(["y", "x"]);
    header.extend(properties.iter().copied());
    writer.write_record(&header)?;

    for tracked in points {
        let point = &tracked.point;
        let mut record = vec![tracked.track_id.to_string(), point.frame.to_string()];
        if has_z {
            record.push(point.z.map(|z| z.to_string()).unwrap_or_default());
        }
        record.push(point.y.to_string());
        record.push(point.x.to_string());
        for property in &properties {
            record.push(point.property(property).map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    writer.flush().map_err(|e| TrackingError::ExportFailed(e.to_string()))?;
    Ok(path.to_path_buf())
}

fn write_msd(path: &Path, analysis: &AnalysisReport) -> Result<PathBuf> {
    let mut writer = csv::Writer::from_path(path)?;
    for track in &analysis.tracks {
        for (index, msd) in track.msd.iter().enumerate() {
            writer.serialize(MsdRow {
                track_id: track.track_id,
                lag: index + 1,
                msd: *msd,
            })?;
        }
    }
    writer.flush().map_err(|e| TrackingError::ExportFailed(e.to_string()))?;
    Ok(path.to_path_buf())
}

fn write_msd_fit(path: &Path, analysis: &AnalysisReport) -> Result<PathBuf> {
    let mut writer = csv::Writer::from_path(path)?;
    for track in &analysis.tracks {
        let Some(fit) = &track.fit else { continue };
        for (index, value) in fit.fitted.iter().enumerate() {
            writer.serialize(MsdFitRow {
                track_id: track.track_id,
                lag: index + 1,
                alpha: fit.alpha,
                diffusion: fit.diffusion,
                fit: *value,
            })?;
        }
    }
    writer.flush().map_err(|e| TrackingError::ExportFailed(e.to_string()))?;
    Ok(path.to_path_buf())
}
