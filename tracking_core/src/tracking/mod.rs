//! Particle tracking: linking detected points into tracks and analysing
//! their motion.
//!
//! The pipeline mirrors the tracking panel: points are filtered by a
//! property range, linked frame to frame, filtered by track length and
//! finally characterised by their mean squared displacement.

mod analysis;
mod error;
mod export;
mod fit;
mod linking;
mod panel;
mod points;
mod stats;

pub use analysis::{analyze_tracks, AnalysisOptions, AnalysisReport, TrackAnalysis};
pub use error::TrackingError;
pub use export::export_csv;
pub use fit::{fit_msd, msd_model, Motion, MsdFit};
pub use linking::{link, LinkOptions};
pub use panel::{ExportTarget, PanelInput, PanelReport, TrackingPanel, ValueRange};
pub use points::{filter_by_length, filter_points, group_tracks, Point, Track, TrackedPoint};
pub use stats::{histogram, msd, Histogram, MAX_BINS};

pub type Result<T> = std::result::Result<T, TrackingError>;
