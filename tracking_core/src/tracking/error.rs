use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("No data: {0}")]
    EmptyInput(String),

    #[error("At least 2 positions are required, got {0}")]
    TooFewPositions(usize),

    #[error("Positions must have 2 or 3 coordinates, found {found}")]
    DimensionMismatch { found: usize },

    #[error("MSD fit failed: {0}")]
    FitFailed(String),

    #[error("Step out of order: {0}")]
    NotReady(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),
}
