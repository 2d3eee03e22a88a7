//! Surrogate models: cheap probabilistic stand-ins for the objective.
//!
//! A surrogate is fitted on `(point, score)` pairs and predicts a mean and a
//! standard deviation at new points. [`GaussianProcess`] is the reference
//! model; [`BootstrapEnsemble`] averages several processes fitted on
//! bootstrap resamples. Both are selected through [`SurrogateConfig`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use wt_types::{NumericError, WtError, WtResult};

use crate::linalg::Cholesky;

/// Default observation noise added to the kernel diagonal. Acts as the
/// floor of the estimated noise.
pub const DEFAULT_NOISE_VARIANCE: f64 = 1e-6;

/// Candidate length scales, in units of the rescaled inputs, tried when
/// maximizing the marginal likelihood.
const LENGTH_SCALE_GRID: [f64; 10] = [0.05, 0.1, 0.2, 0.35, 0.5, 0.75, 1.0, 1.5, 2.5, 5.0];

/// Candidate noise variances on standardized targets.
const NOISE_GRID: [f64; 4] = [1e-6, 1e-4, 1e-2, 1e-1];

/// Jitter multipliers applied to the noise term when a factorization fails.
const JITTER_STEPS: [f64; 4] = [1.0, 10.0, 100.0, 1000.0];

/// Coordinate-ascent passes for per-dimension length scales.
const ARD_SWEEPS: usize = 2;

const SQRT_5: f64 = 2.236_067_977_499_79;

// ---------------------------------------------------------------------------
// Model interface
// ---------------------------------------------------------------------------

/// Predictive distribution at a batch of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Prediction {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Fail on the first NaN / infinite mean or NaN / infinite / negative
    /// standard deviation.
    pub fn ensure_finite(self) -> WtResult<Self> {
        for (index, (m, s)) in self.mean.iter().zip(&self.std).enumerate() {
            if !m.is_finite() {
                return Err(NumericError::NonFinitePrediction {
                    quantity: "mean".into(),
                    index,
                }
                .into());
            }
            if !s.is_finite() || *s < 0.0 {
                return Err(NumericError::NonFinitePrediction {
                    quantity: "std".into(),
                    index,
                }
                .into());
            }
        }
        Ok(self)
    }
}

/// Regression model used to guide the search.
pub trait SurrogateModel: Send + Sync {
    /// Fit on dense points and their observed scores.
    fn fit(&mut self, points: &[Vec<f64>], scores: &[f64]) -> WtResult<()>;

    /// Predict mean and non-negative standard deviation at each point.
    fn predict(&self, points: &[Vec<f64>]) -> WtResult<Prediction>;

    /// Human-readable model name.
    fn name(&self) -> &str;
}

/// Covariance family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    /// Matérn ν = 5/2, twice differentiable.
    #[default]
    Matern52,
    /// Squared exponential (RBF), infinitely smooth.
    SquaredExponential,
}

impl KernelKind {
    /// Unit-variance correlation between two points.
    pub fn eval(&self, a: &[f64], b: &[f64], length_scales: &[f64]) -> f64 {
        let r_sq: f64 = a
            .iter()
            .zip(b)
            .zip(length_scales)
            .map(|((x, y), l)| {
                let d = (x - y) / l;
                d * d
            })
            .sum();
        match self {
            KernelKind::Matern52 => {
                let sqrt5_r = SQRT_5 * r_sq.sqrt();
                (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
            }
            KernelKind::SquaredExponential => (-0.5 * r_sq).exp(),
        }
    }
}

/// Tagged selection of the surrogate implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurrogateConfig {
    GaussianProcess {
        #[serde(default)]
        kernel: KernelKind,
        #[serde(default = "default_noise")]
        noise_variance: f64,
    },
    BootstrapEnsemble {
        members: usize,
        #[serde(default)]
        kernel: KernelKind,
        #[serde(default = "default_noise")]
        noise_variance: f64,
    },
}

fn default_noise() -> f64 {
    DEFAULT_NOISE_VARIANCE
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self::GaussianProcess {
            kernel: KernelKind::Matern52,
            noise_variance: DEFAULT_NOISE_VARIANCE,
        }
    }
}

impl SurrogateConfig {
    pub fn validate(&self) -> WtResult<()> {
        let noise = match self {
            Self::GaussianProcess { noise_variance, .. } => *noise_variance,
            Self::BootstrapEnsemble {
                members,
                noise_variance,
                ..
            } => {
                if *members == 0 {
                    return Err(WtError::Config(
                        "bootstrap ensemble needs at least one member".into(),
                    ));
                }
                *noise_variance
            }
        };
        if !noise.is_finite() || noise <= 0.0 {
            return Err(WtError::Config(format!(
                "noise_variance must be positive and finite, got {noise}"
            )));
        }
        Ok(())
    }

    pub fn noise_variance(&self) -> f64 {
        match self {
            Self::GaussianProcess { noise_variance, .. }
            | Self::BootstrapEnsemble { noise_variance, .. } => *noise_variance,
        }
    }

    /// Build a fresh, unfitted model. `seed` drives any internal resampling.
    pub fn build(&self, seed: u64) -> Box<dyn SurrogateModel> {
        match self {
            Self::GaussianProcess {
                kernel,
                noise_variance,
            } => Box::new(GaussianProcess::new(*kernel, *noise_variance)),
            Self::BootstrapEnsemble {
                members,
                kernel,
                noise_variance,
            } => Box::new(BootstrapEnsemble::new(
                *members,
                *kernel,
                *noise_variance,
                seed,
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Gaussian process
// ---------------------------------------------------------------------------

/// Per-dimension affine map of the training inputs onto the unit cube.
#[derive(Debug, Clone)]
struct InputScaling {
    offset: Vec<f64>,
    span: Vec<f64>,
}

impl InputScaling {
    /// Spans narrower than `1e-12` (a constant column) are left unscaled.
    fn from_points(points: &[Vec<f64>]) -> Self {
        let dims = points[0].len();
        let mut lo = vec![f64::INFINITY; dims];
        let mut hi = vec![f64::NEG_INFINITY; dims];
        for point in points {
            for (d, v) in point.iter().enumerate() {
                lo[d] = lo[d].min(*v);
                hi[d] = hi[d].max(*v);
            }
        }
        let span = lo
            .iter()
            .zip(&hi)
            .map(|(l, h)| {
                let width = h - l;
                if width.is_finite() && width > 1e-12 {
                    width
                } else {
                    1.0
                }
            })
            .collect();
        Self { offset: lo, span }
    }

    fn apply(&self, point: &[f64]) -> Vec<f64> {
        point
            .iter()
            .zip(self.offset.iter().zip(&self.span))
            .map(|(v, (o, s))| (v - o) / s)
            .collect()
    }
}

/// Hyperparameters and factorization of one candidate fit.
#[derive(Debug, Clone)]
struct Candidate {
    length_scales: Vec<f64>,
    noise: f64,
    lml: f64,
    cholesky: Cholesky,
    alpha: Vec<f64>,
}

/// State kept after a successful fit.
#[derive(Debug, Clone)]
struct FittedGp {
    scaling: InputScaling,
    /// Training inputs after scaling.
    x_train: Vec<Vec<f64>>,
    cholesky: Cholesky,
    /// α = (K + σ²I)⁻¹ y on standardized targets.
    alpha: Vec<f64>,
    y_mean: f64,
    y_std: f64,
}

/// Gaussian-process regressor with hyperparameters chosen by maximizing the
/// log marginal likelihood over a fixed grid.
///
/// Inputs are rescaled per dimension onto the unit cube spanned by the
/// training points, and targets are standardized, so the grids apply to any
/// bounds and the signal variance is one. The observation noise is searched
/// jointly with the length scales unless noise estimation is turned off;
/// `noise_variance` is its floor. With `ard` enabled every input dimension
/// gets its own length scale.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    kernel: KernelKind,
    noise_variance: f64,
    estimate_noise: bool,
    ard: bool,
    length_scales: Vec<f64>,
    fitted_noise: Option<f64>,
    log_marginal_likelihood: Option<f64>,
    fitted: Option<FittedGp>,
}

impl GaussianProcess {
    /// Isotropic process: one shared length scale.
    pub fn new(kernel: KernelKind, noise_variance: f64) -> Self {
        Self {
            kernel,
            noise_variance,
            estimate_noise: true,
            ard: false,
            length_scales: Vec::new(),
            fitted_noise: None,
            log_marginal_likelihood: None,
            fitted: None,
        }
    }

    /// Automatic-relevance-determination process: one length scale per
    /// dimension.
    pub fn ard(kernel: KernelKind, noise_variance: f64) -> Self {
        Self {
            ard: true,
            ..Self::new(kernel, noise_variance)
        }
    }

    /// Keep the noise fixed at `noise_variance` instead of searching it.
    pub fn with_noise_estimation(mut self, estimate: bool) -> Self {
        self.estimate_noise = estimate;
        self
    }

    /// Length scales selected by the last fit, relative to the rescaled
    /// inputs (empty before fitting).
    pub fn length_scales(&self) -> &[f64] {
        &self.length_scales
    }

    /// Noise variance selected by the last fit, on standardized targets.
    pub fn fitted_noise(&self) -> Option<f64> {
        self.fitted_noise
    }

    pub fn log_marginal_likelihood(&self) -> Option<f64> {
        self.log_marginal_likelihood
    }

    fn noise_candidates(&self) -> Vec<f64> {
        if !self.estimate_noise {
            return vec![self.noise_variance];
        }
        std::iter::once(self.noise_variance)
            .chain(NOISE_GRID.into_iter().filter(|n| *n > self.noise_variance))
            .collect()
    }

    fn kernel_matrix(&self, x: &[Vec<f64>], length_scales: &[f64], noise: f64) -> Vec<Vec<f64>> {
        let n = x.len();
        let mut k = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let v = self.kernel.eval(&x[i], &x[j], length_scales);
                k[i][j] = v;
                k[j][i] = v;
            }
            k[i][i] += noise;
        }
        k
    }

    /// Factor `K + σ²I`, escalating the diagonal jitter on failure.
    fn factor(&self, x: &[Vec<f64>], length_scales: &[f64], noise: f64) -> Option<Cholesky> {
        for step in JITTER_STEPS {
            let jittered = noise * step;
            let k = self.kernel_matrix(x, length_scales, jittered);
            if let Some(chol) = Cholesky::decompose(&k) {
                if step > 1.0 {
                    warn!(jitter = jittered, "kernel factorized after jitter escalation");
                }
                return Some(chol);
            }
        }
        None
    }

    /// Log marginal likelihood of standardized targets; `None` if the kernel
    /// matrix cannot be factored.
    fn evaluate(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        length_scales: Vec<f64>,
        noise: f64,
    ) -> Option<Candidate> {
        let cholesky = self.factor(x, &length_scales, noise)?;
        let alpha = cholesky.solve(y);
        let data_fit: f64 = y.iter().zip(&alpha).map(|(a, b)| a * b).sum();
        let n = y.len() as f64;
        let lml = -0.5 * data_fit
            - cholesky.half_log_det()
            - 0.5 * n * (2.0 * std::f64::consts::PI).ln();
        lml.is_finite().then_some(Candidate {
            length_scales,
            noise,
            lml,
            cholesky,
            alpha,
        })
    }

    fn select_hyperparameters(&self, x: &[Vec<f64>], y: &[f64]) -> WtResult<Candidate> {
        let dims = x[0].len();
        let noises = self.noise_candidates();
        let mut best: Option<Candidate> = None;

        for &noise in &noises {
            for &l in &LENGTH_SCALE_GRID {
                if let Some(candidate) = self.evaluate(x, y, vec![l; dims], noise) {
                    if best.as_ref().map_or(true, |b| candidate.lml > b.lml) {
                        best = Some(candidate);
                    }
                }
            }
        }

        let max_noise = noises.iter().copied().fold(self.noise_variance, f64::max);
        let mut best = best.ok_or(NumericError::NotPositiveDefinite {
            jitter: max_noise * JITTER_STEPS[JITTER_STEPS.len() - 1],
        })?;

        if self.ard && dims > 1 {
            for _ in 0..ARD_SWEEPS {
                for d in 0..dims {
                    for &l in &LENGTH_SCALE_GRID {
                        if (best.length_scales[d] - l).abs() < f64::EPSILON {
                            continue;
                        }
                        let mut scales = best.length_scales.clone();
                        scales[d] = l;
                        if let Some(candidate) = self.evaluate(x, y, scales, best.noise) {
                            if candidate.lml > best.lml {
                                best = candidate;
                            }
                        }
                    }
                }
            }
        }

        Ok(best)
    }
}

impl SurrogateModel for GaussianProcess {
    fn fit(&mut self, points: &[Vec<f64>], scores: &[f64]) -> WtResult<()> {
        if points.is_empty() {
            return Err(WtError::Validation(
                "cannot fit a surrogate on zero points".into(),
            ));
        }
        if points.len() != scores.len() {
            return Err(NumericError::DimensionMismatch {
                expected: points.len(),
                actual: scores.len(),
            }
            .into());
        }
        let dims = points[0].len();
        if let Some(bad) = points.iter().find(|p| p.len() != dims) {
            return Err(NumericError::DimensionMismatch {
                expected: dims,
                actual: bad.len(),
            }
            .into());
        }
        if points.iter().flatten().chain(scores).any(|v| !v.is_finite()) {
            return Err(WtError::Validation("surrogate inputs must be finite".into()));
        }

        let n = scores.len() as f64;
        let y_mean = scores.iter().sum::<f64>() / n;
        let y_var = scores.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n;
        let y_std = if y_var.sqrt() > 1e-12 { y_var.sqrt() } else { 1.0 };
        let y: Vec<f64> = scores.iter().map(|s| (s - y_mean) / y_std).collect();

        let scaling = InputScaling::from_points(points);
        let x_train: Vec<Vec<f64>> = points.iter().map(|p| scaling.apply(p)).collect();
        let best = self.select_hyperparameters(&x_train, &y)?;
        debug!(
            points = points.len(),
            length_scales = ?best.length_scales,
            noise = best.noise,
            lml = best.lml,
            "gaussian process fitted"
        );

        self.length_scales = best.length_scales;
        self.fitted_noise = Some(best.noise);
        self.log_marginal_likelihood = Some(best.lml);
        self.fitted = Some(FittedGp {
            scaling,
            x_train,
            cholesky: best.cholesky,
            alpha: best.alpha,
            y_mean,
            y_std,
        });
        Ok(())
    }

    fn predict(&self, points: &[Vec<f64>]) -> WtResult<Prediction> {
        let fitted = self.fitted.as_ref().ok_or(NumericError::NotFitted)?;
        let dims = self.length_scales.len();

        let mut mean = Vec::with_capacity(points.len());
        let mut std = Vec::with_capacity(points.len());
        for point in points {
            if point.len() != dims {
                return Err(NumericError::DimensionMismatch {
                    expected: dims,
                    actual: point.len(),
                }
                .into());
            }
            let scaled = fitted.scaling.apply(point);
            let k_star: Vec<f64> = fitted
                .x_train
                .iter()
                .map(|x| self.kernel.eval(&scaled, x, &self.length_scales))
                .collect();
            let mu: f64 = k_star.iter().zip(&fitted.alpha).map(|(k, a)| k * a).sum();
            let v = fitted.cholesky.solve_lower(&k_star);
            let var = (1.0 - v.iter().map(|x| x * x).sum::<f64>()).max(0.0);

            mean.push(mu * fitted.y_std + fitted.y_mean);
            std.push(var.sqrt() * fitted.y_std);
        }

        Prediction { mean, std }.ensure_finite()
    }

    fn name(&self) -> &str {
        if self.ard {
            "gaussian_process_ard"
        } else {
            "gaussian_process"
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap ensemble
// ---------------------------------------------------------------------------

/// Several Gaussian processes, each fitted on a bootstrap resample.
///
/// Member `i` resamples with seed `base_seed + i`. Predictions combine by the
/// law of total variance, so disagreement between members widens the band.
#[derive(Debug, Clone)]
pub struct BootstrapEnsemble {
    members: Vec<GaussianProcess>,
    base_seed: u64,
    fitted: bool,
}

impl BootstrapEnsemble {
    pub fn new(members: usize, kernel: KernelKind, noise_variance: f64, base_seed: u64) -> Self {
        Self {
            members: (0..members.max(1))
                .map(|_| GaussianProcess::new(kernel, noise_variance))
                .collect(),
            base_seed,
            fitted: false,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member_seed(&self, index: usize) -> u64 {
        self.base_seed.wrapping_add(index as u64)
    }
}

impl SurrogateModel for BootstrapEnsemble {
    fn fit(&mut self, points: &[Vec<f64>], scores: &[f64]) -> WtResult<()> {
        if points.is_empty() {
            return Err(WtError::Validation(
                "cannot fit a surrogate on zero points".into(),
            ));
        }
        if points.len() != scores.len() {
            return Err(NumericError::DimensionMismatch {
                expected: points.len(),
                actual: scores.len(),
            }
            .into());
        }
        let n = points.len();
        for index in 0..self.members.len() {
            let mut rng = StdRng::seed_from_u64(self.member_seed(index));
            let picks: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
            let sample_x: Vec<Vec<f64>> = picks.iter().map(|&i| points[i].clone()).collect();
            let sample_y: Vec<f64> = picks.iter().map(|&i| scores[i]).collect();

            if let Err(e) = self.members[index].fit(&sample_x, &sample_y) {
                warn!(
                    member = index,
                    error = %e,
                    "bootstrap member failed, refitting on full data"
                );
                self.members[index].fit(points, scores)?;
            }
        }
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, points: &[Vec<f64>]) -> WtResult<Prediction> {
        if !self.fitted {
            return Err(NumericError::NotFitted.into());
        }
        let m = self.members.len() as f64;
        let mut first_moment = vec![0.0; points.len()];
        let mut second_moment = vec![0.0; points.len()];

        for member in &self.members {
            let p = member.predict(points)?;
            for i in 0..points.len() {
                first_moment[i] += p.mean[i] / m;
                second_moment[i] += (p.std[i].powi(2) + p.mean[i].powi(2)) / m;
            }
        }

        let std = first_moment
            .iter()
            .zip(&second_moment)
            .map(|(mu, s2)| (s2 - mu * mu).max(0.0).sqrt())
            .collect();
        Prediction {
            mean: first_moment,
            std,
        }
        .ensure_finite()
    }

    fn name(&self) -> &str {
        "bootstrap_ensemble"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let xs: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64 / 7.0]).collect();
        let ys = xs.iter().map(|x| (3.0 * x[0]).sin()).collect();
        (xs, ys)
    }

    #[test]
    fn kernels_are_one_at_zero_distance() {
        let a = [0.3, 0.7];
        let ls = [0.5, 0.5];
        assert!((KernelKind::Matern52.eval(&a, &a, &ls) - 1.0).abs() < 1e-12);
        assert!((KernelKind::SquaredExponential.eval(&a, &a, &ls) - 1.0).abs() < 1e-12);
        let b = [0.9, 0.1];
        assert!(KernelKind::Matern52.eval(&a, &b, &ls) < 1.0);
    }

    #[test]
    fn gp_interpolates_training_points() {
        let (xs, ys) = line_data();
        let mut gp =
            GaussianProcess::new(KernelKind::Matern52, 1e-8).with_noise_estimation(false);
        gp.fit(&xs, &ys).unwrap();
        assert_eq!(gp.fitted_noise(), Some(1e-8));

        let pred = gp.predict(&xs).unwrap();
        for (i, y) in ys.iter().enumerate() {
            assert!((pred.mean[i] - y).abs() < 1e-2, "mean {} vs {}", pred.mean[i], y);
            assert!(pred.std[i] < 0.05);
        }
    }

    #[test]
    fn gp_uncertainty_grows_away_from_data() {
        let xs = vec![vec![0.0], vec![0.1], vec![0.2]];
        let ys = vec![1.0, 1.5, 1.2];
        let mut gp = GaussianProcess::new(KernelKind::Matern52, 1e-6);
        gp.fit(&xs, &ys).unwrap();

        let pred = gp.predict(&[vec![0.1], vec![4.0]]).unwrap();
        assert!(pred.std[1] > pred.std[0]);
    }

    #[test]
    fn gp_models_inputs_on_wide_bounds() {
        let xs: Vec<Vec<f64>> = (0..=10).map(|i| vec![i as f64 * 100.0]).collect();
        let ys: Vec<f64> = xs.iter().map(|x| x[0]).collect();
        let mut gp = GaussianProcess::new(KernelKind::Matern52, 1e-6);
        gp.fit(&xs, &ys).unwrap();

        let pred = gp.predict(&[vec![250.0], vec![750.0]]).unwrap();
        assert!((pred.mean[0] - 250.0).abs() < 25.0, "pred {:?}", pred.mean);
        assert!((pred.mean[1] - 750.0).abs() < 25.0, "pred {:?}", pred.mean);
        assert!(pred.std.iter().all(|s| *s < 50.0), "std {:?}", pred.std);
    }

    #[test]
    fn gp_estimates_noise_on_repeated_noisy_points() {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for x in [0.0, 0.5, 1.0] {
            for jitter in [0.2, -0.2, 0.1, -0.1] {
                xs.push(vec![x]);
                ys.push(x + jitter);
            }
        }

        let mut noisy = GaussianProcess::new(KernelKind::Matern52, 1e-6);
        noisy.fit(&xs, &ys).unwrap();
        assert!(noisy.fitted_noise().unwrap() >= 1e-2, "{:?}", noisy.fitted_noise());

        let mut fixed =
            GaussianProcess::new(KernelKind::Matern52, 1e-6).with_noise_estimation(false);
        fixed.fit(&xs, &ys).unwrap();

        let at_data = [vec![0.5]];
        let noisy_std = noisy.predict(&at_data).unwrap().std[0];
        let fixed_std = fixed.predict(&at_data).unwrap().std[0];
        assert!(noisy_std > 0.02, "std {noisy_std}");
        assert!(noisy_std > 10.0 * fixed_std, "{noisy_std} vs {fixed_std}");
        assert!(noisy.log_marginal_likelihood() > fixed.log_marginal_likelihood());
    }

    #[test]
    fn non_finite_predictions_are_rejected() {
        let nan_mean = Prediction {
            mean: vec![0.0, f64::NAN],
            std: vec![1.0, 1.0],
        };
        let err = nan_mean.ensure_finite().unwrap_err();
        assert!(matches!(
            err,
            WtError::Numeric(NumericError::NonFinitePrediction { ref quantity, index: 1 })
                if quantity == "mean"
        ));

        let inf_std = Prediction {
            mean: vec![0.0],
            std: vec![f64::INFINITY],
        };
        assert!(matches!(
            inf_std.ensure_finite(),
            Err(WtError::Numeric(NumericError::NonFinitePrediction { index: 0, .. }))
        ));

        let negative_std = Prediction {
            mean: vec![0.0],
            std: vec![-1e-3],
        };
        assert!(negative_std.ensure_finite().is_err());

        let fine = Prediction {
            mean: vec![1.0],
            std: vec![0.0],
        };
        assert_eq!(fine.clone().ensure_finite().unwrap(), fine);
    }

    #[test]
    fn gp_handles_duplicate_points() {
        let xs = vec![vec![0.5, 0.5]; 4];
        let ys = vec![1.0, 1.0, 1.1, 0.9];
        let mut gp = GaussianProcess::new(KernelKind::Matern52, 1e-6);
        assert!(gp.fit(&xs, &ys).is_ok());
        assert!(gp.predict(&[vec![0.5, 0.5]]).is_ok());
    }

    #[test]
    fn predict_before_fit_fails() {
        let gp = GaussianProcess::new(KernelKind::Matern52, 1e-6);
        let err = gp.predict(&[vec![0.0]]).unwrap_err();
        assert!(matches!(err, WtError::Numeric(NumericError::NotFitted)));
    }

    #[test]
    fn fit_rejects_non_finite_scores() {
        let mut gp = GaussianProcess::new(KernelKind::Matern52, 1e-6);
        let err = gp.fit(&[vec![0.0], vec![1.0]], &[1.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, WtError::Validation(_)));
    }

    #[test]
    fn ard_prefers_short_scale_on_active_dimension() {
        // Score depends only on dimension 0.
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for i in 0..6 {
            for j in 0..3 {
                let x0 = i as f64 / 5.0;
                let x1 = j as f64 / 2.0;
                xs.push(vec![x0, x1]);
                ys.push((6.0 * x0).sin());
            }
        }
        let mut gp = GaussianProcess::ard(KernelKind::SquaredExponential, 1e-6);
        gp.fit(&xs, &ys).unwrap();
        let ls = gp.length_scales();
        assert_eq!(ls.len(), 2);
        assert!(ls[0] < ls[1], "length scales {ls:?}");
    }

    #[test]
    fn ensemble_seeds_use_offsets() {
        let ens = BootstrapEnsemble::new(3, KernelKind::Matern52, 1e-6, 40);
        assert_eq!(ens.member_count(), 3);
        assert_eq!(ens.member_seed(0), 40);
        assert_eq!(ens.member_seed(2), 42);
    }

    #[test]
    fn ensemble_is_reproducible_under_seed() {
        let (xs, ys) = line_data();
        let config = SurrogateConfig::BootstrapEnsemble {
            members: 4,
            kernel: KernelKind::Matern52,
            noise_variance: 1e-6,
        };
        let query = vec![vec![0.33], vec![0.9]];

        let mut a = config.build(7);
        a.fit(&xs, &ys).unwrap();
        let mut b = config.build(7);
        b.fit(&xs, &ys).unwrap();

        assert_eq!(a.predict(&query).unwrap(), b.predict(&query).unwrap());
        assert_eq!(a.name(), "bootstrap_ensemble");
    }

    #[test]
    fn surrogate_config_is_tagged() {
        let json = r#"{"kind":"bootstrap_ensemble","members":5}"#;
        let config: SurrogateConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config,
            SurrogateConfig::BootstrapEnsemble {
                members: 5,
                kernel: KernelKind::Matern52,
                noise_variance: DEFAULT_NOISE_VARIANCE,
            }
        );
        assert!(config.validate().is_ok());

        let empty = SurrogateConfig::BootstrapEnsemble {
            members: 0,
            kernel: KernelKind::Matern52,
            noise_variance: 1e-6,
        };
        assert!(empty.validate().is_err());
    }
}
