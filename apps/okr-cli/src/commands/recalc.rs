// recalc.rs - Rebuild every derived value from the stored leaves.

use okr_goal::OkrConfig;

use super::{truncate, Workspace};

pub fn execute(config: &OkrConfig) -> anyhow::Result<()> {
    let ws = Workspace::open(config)?;
    let propagator = ws.propagator();
    let objectives = ws.retry(|| propagator.recalculate_all())?;

    if objectives.is_empty() {
        println!("No objectives found.");
        return Ok(());
    }

    for o in &objectives {
        println!(
            "{:<38} {:<30} {:>4}% {}",
            o.id,
            truncate(&o.title, 28),
            o.progress,
            o.status
        );
    }
    println!("\nRecalculated {} objective(s).", objectives.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use okr_goal::{GoalRepository, KeyResult, MetricType, Objective, Period};
    use tempfile::tempdir;

    #[test]
    fn recalc_repairs_stale_progress() {
        let dir = tempdir().unwrap();
        let config = OkrConfig::for_project(dir.path());
        let ws = Workspace::open(&config).unwrap();

        let start = Utc::now();
        let objective = Objective::new("Grow", Period::Yearly, start, start + Duration::days(365));
        ws.repo.save_objective(&objective).unwrap();
        let mut kr = KeyResult::new(objective.id, "NPS", MetricType::Percentage, 0.0, 100.0);
        kr.current_value = 30.0;
        ws.repo.save_key_result(&kr).unwrap();

        execute(&config).unwrap();

        assert_eq!(ws.repo.find_key_result(kr.id).unwrap().progress, 30.0);
        assert_eq!(ws.repo.find_objective(objective.id).unwrap().progress, 30.0);
    }
}
