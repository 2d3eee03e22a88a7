//! Drives an online session against a synthetic objective and prints the
//! best weights found. Useful as a smoke test of a deployment's settings.

use tracing::info;

use wt_optimizer::{BatchConfig, BatchOptimizer};
use wt_service::{init_tracing, ServiceConfig, TuningService};
use wt_types::{SignalBound, WeightVector};

const TARGET: [(&str, f64); 3] = [("momentum", 0.5), ("mean_reversion", 0.3), ("sentiment", 0.2)];

fn synthetic_score(weights: &WeightVector) -> f64 {
    let distance: f64 = TARGET
        .iter()
        .map(|(id, target)| (weights.get(id).unwrap_or(0.0) - target).powi(2))
        .sum();
    1.0 - distance
}

fn bounds() -> Vec<SignalBound> {
    TARGET.iter().map(|(id, _)| SignalBound::unit(*id)).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let verbose = std::env::var("WT_VERBOSE").is_ok();
    init_tracing(verbose);

    let rounds: usize = std::env::var("WT_DEMO_ROUNDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);

    let batch = BatchOptimizer::new(bounds(), BatchConfig::default().with_calls(25, 8))?
        .optimize(|w| Ok::<_, std::convert::Infallible>(synthetic_score(w)))
        .into_result()?;
    info!(best = batch.best_score, "batch run finished");

    let service = TuningService::new(ServiceConfig::from_env()?)?;
    let session = service.create(bounds(), None)?;

    for _ in 0..rounds {
        let response = service.suggest(session, 1).await?;
        for weights in response.suggestions {
            let score = synthetic_score(&weights);
            let recorded = service.record(session, weights, score).await?;
            if recorded.should_refit {
                let best = service.best(session).await?;
                service.accept(session, best.weights).await?;
            }
        }
    }

    let best = service.best(session).await?;
    let importance = service.importance(session).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "batch_best_weights": batch.best_weights,
            "batch_best_score": batch.best_score,
            "online_best_weights": best.weights,
            "online_best_score": best.score,
            "statistics": best.statistics,
            "importance": importance,
        }))?
    );

    service.delete(session)?;
    Ok(())
}
