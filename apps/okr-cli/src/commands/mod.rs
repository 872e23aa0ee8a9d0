// mod.rs - Shared plumbing for okr subcommands.

pub mod kr;
pub mod objective;
pub mod recalc;
pub mod task;

use anyhow::Context as _;
use chrono::{DateTime, NaiveDate, Utc};
use okr_goal::{
    with_conflict_retry, EngineConfig, GoalResult, JournalSink, JsonFileGoalRepository, OkrConfig,
    ProgressPropagator,
};
use uuid::Uuid;

/// Opened store plus engine settings for one command invocation.
pub struct Workspace {
    pub config: OkrConfig,
    pub engine: EngineConfig,
    pub repo: JsonFileGoalRepository,
}

impl Workspace {
    pub fn open(config: &OkrConfig) -> anyhow::Result<Self> {
        let engine = config.load_engine_config()?;
        let repo = JsonFileGoalRepository::new(&config.store_dir)?;
        Ok(Self {
            config: config.clone(),
            engine,
            repo,
        })
    }

    /// A propagator over this store that journals every change.
    pub fn propagator(&self) -> ProgressPropagator<&JsonFileGoalRepository> {
        let mut propagator = ProgressPropagator::new(&self.repo).with_engine_config(&self.engine);
        propagator.add_sink(Box::new(JournalSink::new(&self.config.journal_path)));
        propagator
    }

    /// Run `op`, re-running it on objective write conflicts.
    pub fn retry<T, F>(&self, op: F) -> GoalResult<T>
    where
        F: FnMut() -> GoalResult<T>,
    {
        with_conflict_retry(self.engine.concurrency.max_conflict_retries, op)
    }
}

pub fn parse_id(id: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("invalid id: {}", id))
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid date '{}': expected YYYY-MM-DD or RFC 3339", value))
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parse_date_accepts_plain_dates() {
        let dt = parse_date("2026-04-01").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour()), (2026, 4, 1, 0));
    }

    #[test]
    fn parse_date_accepts_rfc3339() {
        let dt = parse_date("2026-04-01T10:30:00+02:00").unwrap();
        assert_eq!(dt.hour(), 8);
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date("next tuesday").is_err());
    }

    #[test]
    fn truncate_long_titles() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long objective title", 10), "a very ...");
    }
}
