//! Service-wide settings with `WT_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use wt_optimizer::OnlineConfig;
use wt_types::{config_error, WtResult};

use crate::jobs::DEFAULT_FINISHED_JOB_RETENTION;

/// Service-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Threads in the surrogate-fit pool.
    pub worker_threads: usize,
    /// Upper bound on concurrently active sessions.
    pub max_sessions: usize,
    /// Finished batch jobs kept for status queries.
    pub max_finished_jobs: usize,
    /// Used by `create` when the caller supplies no config.
    pub default_online: OnlineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self {
            worker_threads: cores.saturating_sub(1).max(1),
            max_sessions: 1024,
            max_finished_jobs: DEFAULT_FINISHED_JOB_RETENTION,
            default_online: OnlineConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_max_finished_jobs(mut self, max_finished_jobs: usize) -> Self {
        self.max_finished_jobs = max_finished_jobs;
        self
    }

    pub fn with_default_online(mut self, online: OnlineConfig) -> Self {
        self.default_online = online;
        self
    }

    /// Defaults overlaid with `WT_*` environment variables.
    pub fn from_env() -> WtResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup<F>(lookup: F) -> WtResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        overlay(&lookup, "WT_WORKER_THREADS", &mut config.worker_threads)?;
        overlay(&lookup, "WT_MAX_SESSIONS", &mut config.max_sessions)?;
        overlay(&lookup, "WT_MAX_FINISHED_JOBS", &mut config.max_finished_jobs)?;
        overlay(&lookup, "WT_WINDOW_SIZE", &mut config.default_online.window_size)?;
        overlay(
            &lookup,
            "WT_UPDATE_INTERVAL",
            &mut config.default_online.update_interval,
        )?;
        overlay(
            &lookup,
            "WT_EXPLORATION_RATE",
            &mut config.default_online.exploration_rate,
        )?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WtResult<()> {
        if self.worker_threads == 0 {
            return Err(config_error!("worker_threads must be at least 1"));
        }
        if self.max_sessions == 0 {
            return Err(config_error!("max_sessions must be at least 1"));
        }
        if self.max_finished_jobs == 0 {
            return Err(config_error!("max_finished_jobs must be at least 1"));
        }
        self.default_online.validate()
    }
}

fn overlay<F, T>(lookup: &F, key: &str, target: &mut T) -> WtResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| config_error!("{key}={raw:?} is invalid: {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wt_types::WtError;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_sane() {
        let config = ServiceConfig::default();
        assert!(config.worker_threads >= 1);
        assert_eq!(config.max_sessions, 1024);
        assert_eq!(config.default_online.window_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("WT_WORKER_THREADS", "3"),
            ("WT_MAX_SESSIONS", "16"),
            ("WT_WINDOW_SIZE", "40"),
            ("WT_UPDATE_INTERVAL", "5"),
            ("WT_EXPLORATION_RATE", "0.25"),
            ("WT_MAX_FINISHED_JOBS", "12"),
        ]))
        .unwrap();

        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.max_sessions, 16);
        assert_eq!(config.max_finished_jobs, 12);
        assert_eq!(config.default_online.window_size, 40);
        assert_eq!(config.default_online.update_interval, 5);
        assert_eq!(config.default_online.exploration_rate, 0.25);
    }

    #[test]
    fn unparsable_value_is_config_error() {
        let err = ServiceConfig::from_lookup(lookup_from(&[("WT_MAX_SESSIONS", "lots")]))
            .unwrap_err();
        assert!(matches!(err, WtError::Config(ref msg) if msg.contains("WT_MAX_SESSIONS")));
    }

    #[test]
    fn zero_job_retention_is_rejected() {
        let config = ServiceConfig::default().with_max_finished_jobs(0);
        assert!(matches!(config.validate(), Err(WtError::Config(_))));
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        let result = ServiceConfig::from_lookup(lookup_from(&[("WT_EXPLORATION_RATE", "2")]));
        assert!(matches!(result, Err(WtError::Config(_))));
    }
}
