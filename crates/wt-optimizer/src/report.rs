//! Statistics derived from an evaluation history: convergence curves, best
//! point tracking, window summaries and per-signal importance.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scores per end of the window compared by `recent_trend`.
const TREND_SPAN: usize = 10;

/// Window size required before `recent_trend` is reported.
const TREND_MIN_WINDOW: usize = 2 * TREND_SPAN;

/// Running maximum of `scores`.
pub fn convergence_history(scores: &[f64]) -> Vec<f64> {
    let mut best = f64::NEG_INFINITY;
    scores
        .iter()
        .map(|&s| {
            if s > best {
                best = s;
            }
            best
        })
        .collect()
}

/// Index of the highest score; ties go to the earliest entry.
pub fn best_index(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((i, s));
        }
    }
    best.map(|(i, _)| i)
}

/// Summary of the scores currently held in an online window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStatistics {
    pub n_evaluations: usize,
    pub best_score: Option<f64>,
    pub avg_score: Option<f64>,
    /// Population standard deviation.
    pub score_std: Option<f64>,
    /// mean(last 10) - mean(first 10); 0 below 20 entries.
    pub recent_trend: f64,
}

impl WindowStatistics {
    pub fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self {
                n_evaluations: 0,
                best_score: None,
                avg_score: None,
                score_std: None,
                recent_trend: 0.0,
            };
        }

        let n = scores.len() as f64;
        let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = scores.iter().sum::<f64>() / n;
        let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        let recent_trend = if scores.len() >= TREND_MIN_WINDOW {
            mean_of(&scores[scores.len() - TREND_SPAN..]) - mean_of(&scores[..TREND_SPAN])
        } else {
            0.0
        };

        Self {
            n_evaluations: scores.len(),
            best_score: Some(best),
            avg_score: Some(mean),
            score_std: Some(var.sqrt()),
            recent_trend,
        }
    }
}

fn mean_of(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// `1/n` per signal, used when there is too little data to say anything.
pub fn uniform_importance<'a>(signal_ids: impl Iterator<Item = &'a str>) -> HashMap<String, f64> {
    let ids: Vec<&str> = signal_ids.collect();
    let share = 1.0 / ids.len().max(1) as f64;
    ids.into_iter().map(|id| (id.to_string(), share)).collect()
}

/// Turn ARD length scales into normalized importances.
///
/// A shorter length scale means the score reacts faster to that weight, so
/// importance is `1 / length_scale` rescaled to sum to one. Directional only.
pub fn importance_from_length_scales<'a>(
    signal_ids: impl Iterator<Item = &'a str>,
    length_scales: &[f64],
) -> HashMap<String, f64> {
    let raw: Vec<f64> = length_scales.iter().map(|l| 1.0 / (l + 1e-8)).collect();
    let total: f64 = raw.iter().sum();
    signal_ids
        .zip(raw)
        .map(|(id, r)| (id.to_string(), r / total))
        .collect()
}
