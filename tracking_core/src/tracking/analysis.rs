use super::fit::{fit_msd, Motion, MsdFit};
use super::points::Track;
use super::stats::{histogram, msd, Histogram};
use super::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Bin width of the α histogram
pub const ALPHA_BIN_SIZE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Time between frames in ms, used as the MSD lag unit
    pub time_delay: f64,
    /// Model evaluation budget of each MSD fit
    pub max_iterations: usize,
    /// Longest lag, in frames, of the MSD curve
    pub msd_limit: usize,
    /// Point property averaged per track
    pub intensity_property: String,
    /// Intensity histogram bin width; chosen from the data when unset
    pub histogram_bin_size: Option<f64>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            time_delay: 5.0,
            max_iterations: 1_000_000,
            msd_limit: 25,
            intensity_property: "mean_intensity".to_string(),
            histogram_bin_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackAnalysis {
    pub track_id: u64,
    pub length: usize,
    pub mean_intensity: Option<f64>,
    pub msd: Vec<f64>,
    pub fit: Option<MsdFit>,
    pub motion: Option<Motion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub tracks: Vec<TrackAnalysis>,
    pub confined: usize,
    pub diffusive: usize,
    pub directed: usize,
    pub unclassified: usize,
    pub length_histogram: Option<Histogram>,
    pub intensity_histogram: Option<Histogram>,
    /// Fitted exponents of every classified track
    pub alpha_histogram: Option<Histogram>,
    /// Mean intensities of the tracks in each motion class, binned like
    /// `intensity_histogram`
    pub confined_intensity_histogram: Option<Histogram>,
    pub diffusive_intensity_histogram: Option<Histogram>,
    pub directed_intensity_histogram: Option<Histogram>,
}

impl AnalysisReport {
    /// Tracks of one motion class
    pub fn tracks_with(&self, motion: Motion) -> impl Iterator<Item = &TrackAnalysis> {
        self.tracks
            .iter()
            .filter(move |t| t.motion == Some(motion))
    }
}

/// MSD, exponent fit and motion class of every track
pub fn analyze_tracks(tracks: &[Track], options: &AnalysisOptions) -> Result<AnalysisReport> {
    let mut analyses = Vec::with_capacity(tracks.len());

    for track in tracks {
        let mean_intensity = track.mean_property(&options.intensity_property);

        let (curve, fit) = if track.len() < 2 {
            (Vec::new(), None)
        } else {
            let curve = msd(&track.positions(), options.msd_limit)?;
            let fit = match fit_msd(&curve, options.time_delay, options.max_iterations) {
                Ok(fit) => Some(fit),
                Err(e) => {
                    warn!(track_id = track.id, error = %e, "Skipping MSD fit");
                    None
                }
            };
            (curve, fit)
        };

        analyses.push(TrackAnalysis {
            track_id: track.id,
            length: track.len(),
            mean_intensity,
            msd: curve,
            motion: fit.as_ref().map(|f| Motion::classify(f.alpha)),
            fit,
        });
    }

    let count = |motion: Motion| analyses.iter().filter(|a| a.motion == Some(motion)).count();
    let confined = count(Motion::Confined);
    let diffusive = count(Motion::Diffusive);
    let directed = count(Motion::Directed);
    let unclassified = analyses.len() - confined - diffusive - directed;

    let lengths: Vec<f64> = analyses.iter().map(|a| a.length as f64).collect();
    let length_histogram = histogram_of(&lengths, 1.0)?;

    let intensities: Vec<f64> = analyses.iter().filter_map(|a| a.mean_intensity).collect();
    let bin_size = options.histogram_bin_size.unwrap_or_else(|| {
        let finite: Vec<f64> = intensities.iter().copied().filter(|v| v.is_finite()).collect();
        let mean = finite.iter().sum::<f64>() / finite.len().max(1) as f64;
        if mean >= 1000.0 {
            100.0
        } else {
            5.0
        }
    });
    let intensity_histogram = histogram_of(&intensities, bin_size)?;

    let alphas: Vec<f64> = analyses
        .iter()
        .filter_map(|a| a.fit.as_ref().map(|f| f.alpha))
        .collect();
    let alpha_histogram = histogram_of(&alphas, ALPHA_BIN_SIZE)?;

    let class_intensities = |motion: Motion| -> Vec<f64> {
        analyses
            .iter()
            .filter(|a| a.motion == Some(motion))
            .filter_map(|a| a.mean_intensity)
            .collect()
    };
    let confined_intensity_histogram = histogram_of(&class_intensities(Motion::Confined), bin_size)?;
    let diffusive_intensity_histogram = histogram_of(&class_intensities(Motion::Diffusive), bin_size)?;
    let directed_intensity_histogram = histogram_of(&class_intensities(Motion::Directed), bin_size)?;

    debug!(
        tracks = analyses.len(),
        confined, diffusive, directed, "Analysed tracks"
    );

    Ok(AnalysisReport {
        tracks: analyses,
        confined,
        diffusive,
        directed,
        unclassified,
        length_histogram,
        intensity_histogram,
        alpha_histogram,
        confined_intensity_histogram,
        diffusive_intensity_histogram,
        directed_intensity_histogram,
    })
}

/// `None` when no finite value is left to bin
fn histogram_of(values: &[f64], bin_size: f64) -> Result<Option<Histogram>> {
    if values.iter().any(|v| v.is_finite()) {
        histogram(values, bin_size).map(Some)
    } else {
        Ok(None)
    }
}
