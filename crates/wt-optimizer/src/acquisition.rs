//! Expected Improvement acquisition over a random candidate pool.

use rand::Rng;

use wt_types::WtResult;

use crate::search::SearchSpace;
use crate::surrogate::SurrogateModel;

/// Added to the predictive standard deviation wherever it divides.
pub const STD_EPSILON: f64 = 1e-8;

/// Default number of random candidates scored per pick.
pub const DEFAULT_N_CANDIDATES: usize = 1000;

/// Standard normal PDF.
pub fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function, Abramowitz & Stegun 7.1.26 (|ε| < 1.5e-7).
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

/// Expected gain over `best_y` for a maximization problem.
///
/// `z = (μ - best) / (σ + ε)`, `EI = σ (z Φ(z) + φ(z))`.
pub fn expected_improvement(mean: f64, std: f64, best_y: f64) -> f64 {
    let z = (mean - best_y) / (std + STD_EPSILON);
    std * (z * norm_cdf(z) + norm_pdf(z))
}

/// Winner of one acquisition round.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePick {
    /// Raw point, inside the declared bounds and not yet normalized.
    pub point: Vec<f64>,
    pub expected_improvement: f64,
    /// Position in the candidate pool.
    pub index: usize,
}

/// Draw `n_candidates` uniform points, score each with EI and keep the
/// first maximum.
///
/// Candidates are scored at their normalized position, which is where the
/// objective would see them; the returned point is the raw draw. A NaN or
/// infinite prediction fails the pick with `NonFinitePrediction`.
pub fn select_candidate<R: Rng + ?Sized>(
    model: &dyn SurrogateModel,
    space: &SearchSpace,
    best_y: f64,
    n_candidates: usize,
    rng: &mut R,
) -> WtResult<CandidatePick> {
    let n_candidates = n_candidates.max(1);
    let mut candidates: Vec<Vec<f64>> = (0..n_candidates).map(|_| space.sample_raw(rng)).collect();
    let normalized: Vec<Vec<f64>> = candidates.iter().map(|c| space.normalize(c)).collect();
    let prediction = model.predict(&normalized)?.ensure_finite()?;

    let mut best_index = 0;
    let mut best_ei = f64::NEG_INFINITY;
    for i in 0..prediction.len() {
        let ei = expected_improvement(prediction.mean[i], prediction.std[i], best_y);
        if ei > best_ei {
            best_ei = ei;
            best_index = i;
        }
    }

    Ok(CandidatePick {
        point: candidates.swap_remove(best_index),
        expected_improvement: best_ei,
        index: best_index,
    })
}
