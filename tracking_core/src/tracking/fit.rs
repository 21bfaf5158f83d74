use super::{Result, TrackingError};
use serde::{Deserialize, Serialize};

/// Anomalous diffusion model `4·D·t^α`
pub fn msd_model(t: f64, diffusion: f64, alpha: f64) -> f64 {
    4.0 * diffusion * t.powf(alpha)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsdFit {
    /// Diffusion coefficient D
    pub diffusion: f64,
    /// Anomalous exponent α
    pub alpha: f64,
    /// Model evaluated at every lag time
    pub fitted: Vec<f64>,
    pub evaluations: usize,
}

/// Motion class derived from the fitted exponent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Motion {
    Confined,
    Diffusive,
    Directed,
}

impl Motion {
    pub fn classify(alpha: f64) -> Self {
        if alpha < 0.4 {
            Motion::Confined
        } else if alpha <= 1.2 {
            Motion::Diffusive
        } else {
            Motion::Directed
        }
    }
}

const INITIAL_GUESS: [f64; 2] = [0.001, 0.01];
const MAX_DAMPING: f64 = 1e16;
const TOLERANCE: f64 = 1e-12;

/// Least-squares fit of [`msd_model`] to an MSD curve sampled at
/// `t = (1..=n)·delta` using Levenberg-Marquardt.
///
/// `max_evaluations` bounds the number of model evaluations over the data.
/// NaN samples are ignored but the fitted curve covers every lag.
pub fn fit_msd(msd: &[f64], delta: f64, max_evaluations: usize) -> Result<MsdFit> {
    if !delta.is_finite() || delta <= 0.0 {
        return Err(TrackingError::InvalidParameter(format!(
            "delta must be positive, got {}",
            delta
        )));
    }

    let samples: Vec<(f64, f64)> = msd
        .iter()
        .enumerate()
        .filter(|(_, y)| y.is_finite())
        .map(|(i, &y)| ((i + 1) as f64 * delta, y))
        .collect();
    if samples.len() < 2 {
        return Err(TrackingError::FitFailed(format!(
            "need at least 2 finite samples, got {}",
            samples.len()
        )));
    }

    let mut params = initial_guess(&samples);
    let mut evaluations = 1;
    let mut cost = sum_of_squares(&samples, params);
    let mut damping = 1e-3;

    while evaluations < max_evaluations.max(2) {
        let (jtj, jtr) = normal_equations(&samples, params);

        let step = loop {
            let a = [
                [jtj[0][0] * (1.0 + damping), jtj[0][1]],
                [jtj[1][0], jtj[1][1] * (1.0 + damping)],
            ];
            match solve_2x2(a, jtr) {
                Some(step) => break Some(step),
                None if damping < MAX_DAMPING => damping *= 10.0,
                None => break None,
            }
        };
        let Some(step) = step else { break };

        let candidate = [params[0] + step[0], params[1] + step[1]];
        let candidate_cost = sum_of_squares(&samples, candidate);
        evaluations += 1;

        if candidate_cost.is_finite() && candidate_cost < cost {
            let improvement = cost - candidate_cost;
            params = candidate;
            cost = candidate_cost;
            damping = (damping / 10.0).max(1e-12);

            let step_size = step[0].abs() + step[1].abs();
            let scale = params[0].abs() + params[1].abs() + TOLERANCE;
            if step_size <= TOLERANCE * scale || improvement <= TOLERANCE * (cost + TOLERANCE) {
                break;
            }
        } else {
            damping *= 10.0;
            if damping > MAX_DAMPING {
                break;
            }
        }
    }

    if !params.iter().all(|p| p.is_finite()) {
        return Err(TrackingError::FitFailed("parameters diverged".to_string()));
    }

    let fitted = (1..=msd.len())
        .map(|i| msd_model(i as f64 * delta, params[0], params[1]))
        .collect();

    Ok(MsdFit {
        diffusion: params[0],
        alpha: params[1],
        fitted,
        evaluations,
    })
}

/// Log-log regression when every sample is positive, otherwise the fixed guess
fn initial_guess(samples: &[(f64, f64)]) -> [f64; 2] {
    if samples.iter().any(|&(_, y)| y <= 0.0) {
        return INITIAL_GUESS;
    }

    let n = samples.len() as f64;
    let logs: Vec<(f64, f64)> = samples.iter().map(|&(t, y)| (t.ln(), y.ln())).collect();
    let mean_x = logs.iter().map(|l| l.0).sum::<f64>() / n;
    let mean_y = logs.iter().map(|l| l.1).sum::<f64>() / n;
    let sxx: f64 = logs.iter().map(|l| (l.0 - mean_x).powi(2)).sum();
    if sxx <= 0.0 {
        return INITIAL_GUESS;
    }
    let sxy: f64 = logs.iter().map(|l| (l.0 - mean_x) * (l.1 - mean_y)).sum();

    let alpha = sxy / sxx;
    let diffusion = (mean_y - alpha * mean_x).exp() / 4.0;
    if alpha.is_finite() && diffusion.is_finite() {
        [diffusion, alpha]
    } else {
        INITIAL_GUESS
    }
}

fn sum_of_squares(samples: &[(f64, f64)], params: [f64; 2]) -> f64 {
    samples
        .iter()
        .map(|&(t, y)| (y - msd_model(t, params[0], params[1])).powi(2))
        .sum()
}

/// `JᵀJ` and `Jᵀr` for residuals `r = y - f(t)`
fn normal_equations(samples: &[(f64, f64)], params: [f64; 2]) -> ([[f64; 2]; 2], [f64; 2]) {
    let mut jtj = [[0.0; 2]; 2];
    let mut jtr = [0.0; 2];

    for &(t, y) in samples {
        let power = t.powf(params[1]);
        let residual = y - 4.0 * params[0] * power;
        let jacobian = [4.0 * power, 4.0 * params[0] * power * t.ln()];

        for row in 0..2 {
            jtr[row] += jacobian[row] * residual;
            for col in 0..2 {
                jtj[row][col] += jacobian[row] * jacobian[col];
            }
        }
    }

    (jtj, jtr)
}

fn solve_2x2(a: [[f64; 2]; 2], b: [f64; 2]) -> Option<[f64; 2]> {
    let det = a[0][0] * a[1][1] - a[0][1] * a[1][0];
    if !det.is_finite() || det.abs() < f64::MIN_POSITIVE {
        return None;
    }
    Some([
        (b[0] * a[1][1] - a[0][1] * b[1]) / det,
        (a[0][0] * b[1] - b[0] * a[1][0]) / det,
    ])
}
