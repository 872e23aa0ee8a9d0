// kr.rs - Key result subcommands: add, update, delete.
//
// Each change is written and propagated up to the owning objective in one
// store transaction, so a failed roll-up leaves the key result untouched.

use clap::Subcommand;
use okr_goal::{GoalRepository, KeyResult, KeyResultMutation, MetricType, Objective, OkrConfig};

use super::{parse_id, Workspace};

#[derive(Subcommand)]
pub enum KrCommands {
    /// Add a key result to an objective.
    Add {
        /// Owning objective ID.
        objective_id: String,
        /// Key result title (e.g., "Weekly active users").
        title: String,
        /// percentage, number, currency, boolean, or task_count.
        #[arg(long)]
        metric: String,
        /// Baseline value.
        #[arg(long, default_value_t = 0.0)]
        start_value: f64,
        /// Target value (ignored for task_count; boolean defaults to 1).
        #[arg(long)]
        target: Option<f64>,
        /// Current value (defaults to the baseline).
        #[arg(long)]
        current: Option<f64>,
        /// Display unit (e.g., "%", "users", "USD").
        #[arg(long)]
        unit: Option<String>,
    },
    /// Update a key result's values.
    Update {
        /// Key result ID.
        id: String,
        #[arg(long)]
        current: Option<f64>,
        #[arg(long)]
        target: Option<f64>,
        #[arg(long)]
        start_value: Option<f64>,
        #[arg(long)]
        title: Option<String>,
    },
    /// Delete a key result and its task links.
    Delete {
        /// Key result ID.
        id: String,
    },
}

pub fn execute(cmd: &KrCommands, config: &OkrConfig) -> anyhow::Result<()> {
    let ws = Workspace::open(config)?;

    match cmd {
        KrCommands::Add {
            objective_id,
            title,
            metric,
            start_value,
            target,
            current,
            unit,
        } => add_key_result(
            &ws,
            objective_id,
            title,
            metric,
            *start_value,
            *target,
            *current,
            unit.as_deref(),
        ),
        KrCommands::Update {
            id,
            current,
            target,
            start_value,
            title,
        } => update_key_result(&ws, id, *current, *target, *start_value, title.as_deref()),
        KrCommands::Delete { id } => delete_key_result(&ws, id),
    }
}

#[allow(clippy::too_many_arguments)]
fn add_key_result(
    ws: &Workspace,
    objective_id: &str,
    title: &str,
    metric: &str,
    start_value: f64,
    target: Option<f64>,
    current: Option<f64>,
    unit: Option<&str>,
) -> anyhow::Result<()> {
    let objective_id = parse_id(objective_id)?;
    let metric_type: MetricType = metric.parse()?;
    let target = match (metric_type, target) {
        (_, Some(target)) => target,
        (MetricType::Boolean, None) => 1.0,
        (MetricType::TaskCount, None) => 0.0,
        (_, None) => anyhow::bail!("--target is required for {} key results", metric_type),
    };
    if title.trim().is_empty() {
        anyhow::bail!("key result title must not be empty");
    }

    let mut kr = KeyResult::new(objective_id, title, metric_type, start_value, target);
    if let Some(current) = current {
        kr.current_value = current;
    }
    kr.unit = unit.map(|u| u.to_string());
    check_values(&kr)?;

    let propagator = ws.propagator();
    let objective = ws.retry(|| {
        propagator.apply_key_result_change(kr.id, KeyResultMutation::Created, |repo| {
            // Unknown objective: nothing is written.
            repo.find_objective(objective_id)?;
            repo.save_key_result(&kr)
        })
    })?;

    println!("Key result added: {}", kr.id);
    print_rollup(&objective);
    Ok(())
}

fn update_key_result(
    ws: &Workspace,
    id: &str,
    current: Option<f64>,
    target: Option<f64>,
    start_value: Option<f64>,
    title: Option<&str>,
) -> anyhow::Result<()> {
    if current.is_none() && target.is_none() && start_value.is_none() && title.is_none() {
        anyhow::bail!("nothing to update: pass --current, --target, --start-value, or --title");
    }

    let kr_id = parse_id(id)?;
    let edit = |kr: &mut KeyResult| {
        if let Some(current) = current {
            kr.current_value = current;
        }
        if let Some(target) = target {
            kr.target_value = target;
        }
        if let Some(start_value) = start_value {
            kr.start_value = start_value;
        }
        if let Some(title) = title {
            kr.title = title.to_string();
        }
    };

    let mut preview = ws.repo.find_key_result(kr_id)?;
    edit(&mut preview);
    check_values(&preview)?;

    let propagator = ws.propagator();
    let objective = ws.retry(|| {
        propagator.apply_key_result_change(kr_id, KeyResultMutation::Updated, |repo| {
            let mut kr = repo.find_key_result(kr_id)?;
            edit(&mut kr);
            repo.save_key_result(&kr)
        })
    })?;

    let kr = ws.repo.find_key_result(kr_id)?;
    println!("Key result updated: {} ({}%)", kr.id, kr.progress);
    print_rollup(&objective);
    Ok(())
}

fn delete_key_result(ws: &Workspace, id: &str) -> anyhow::Result<()> {
    let kr = ws.repo.find_key_result(parse_id(id)?)?;
    let mutation = KeyResultMutation::Deleted {
        objective_id: kr.objective_id,
    };

    let propagator = ws.propagator();
    let objective = ws.retry(|| {
        propagator.apply_key_result_change(kr.id, mutation, |repo| {
            repo.delete_key_result(kr.id).map(|_| ())
        })
    })?;

    println!("Key result deleted: {}", kr.id);
    print_rollup(&objective);
    Ok(())
}

fn check_values(kr: &KeyResult) -> anyhow::Result<()> {
    for (name, value) in [
        ("start value", kr.start_value),
        ("target", kr.target_value),
        ("current value", kr.current_value),
    ] {
        if !value.is_finite() {
            anyhow::bail!("{} must be a finite number", name);
        }
    }
    Ok(())
}

pub(crate) fn print_rollup(objective: &Objective) {
    println!(
        "  Objective {}: {}% ({})",
        objective.id, objective.progress, objective.status
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use okr_goal::{ObjectiveStatus, Period};
    use tempfile::tempdir;

    fn workspace_with_objective() -> (tempfile::TempDir, Workspace, Objective) {
        let dir = tempdir().unwrap();
        let ws = Workspace::open(&OkrConfig::for_project(dir.path())).unwrap();
        let start = Utc::now() - Duration::days(1);
        let objective = Objective::new("Grow", Period::Quarterly, start, start + Duration::days(90));
        ws.repo.save_objective(&objective).unwrap();
        (dir, ws, objective)
    }

    #[test]
    fn add_update_delete_rolls_up() {
        let (_dir, ws, objective) = workspace_with_objective();
        let oid = objective.id.to_string();

        add_key_result(&ws, &oid, "Signups", "number", 0.0, Some(200.0), Some(50.0), None)
            .unwrap();
        add_key_result(&ws, &oid, "Launch", "boolean", 0.0, None, None, None).unwrap();
        assert_eq!(ws.repo.find_objective(objective.id).unwrap().progress, 13.0);

        let krs = ws.repo.find_key_results_by_objective(objective.id).unwrap();
        update_key_result(&ws, &krs[1].id.to_string(), Some(1.0), None, None, None).unwrap();
        // (25 + 100) / 2 = 62.5
        assert_eq!(ws.repo.find_objective(objective.id).unwrap().progress, 63.0);

        delete_key_result(&ws, &krs[0].id.to_string()).unwrap();
        let stored = ws.repo.find_objective(objective.id).unwrap();
        assert_eq!(stored.progress, 100.0);
        assert_eq!(stored.status, ObjectiveStatus::Completed);
    }

    #[test]
    fn add_rejects_bad_input() {
        let (_dir, ws, objective) = workspace_with_objective();
        let oid = objective.id.to_string();

        assert!(add_key_result(&ws, &oid, "x", "number", 0.0, None, None, None).is_err());
        assert!(add_key_result(&ws, &oid, "x", "vibes", 0.0, Some(1.0), None, None).is_err());
        assert!(
            add_key_result(&ws, &oid, "x", "number", 0.0, Some(f64::NAN), None, None).is_err()
        );
        let unknown = uuid::Uuid::new_v4().to_string();
        assert!(add_key_result(&ws, &unknown, "x", "number", 0.0, Some(1.0), None, None).is_err());
        assert!(ws
            .repo
            .find_key_results_by_objective(objective.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn update_requires_a_change() {
        let (_dir, ws, objective) = workspace_with_objective();
        add_key_result(
            &ws,
            &objective.id.to_string(),
            "Revenue",
            "currency",
            0.0,
            Some(1000.0),
            None,
            Some("USD"),
        )
        .unwrap();
        let kr = &ws.repo.find_key_results_by_objective(objective.id).unwrap()[0];
        assert!(update_key_result(&ws, &kr.id.to_string(), None, None, None, None).is_err());
    }

    #[test]
    fn failed_roll_up_keeps_the_old_value() {
        let (_dir, ws, objective) = workspace_with_objective();
        add_key_result(
            &ws,
            &objective.id.to_string(),
            "Signups",
            "number",
            0.0,
            Some(100.0),
            Some(10.0),
            None,
        )
        .unwrap();
        let kr = ws.repo.find_key_results_by_objective(objective.id).unwrap()[0].clone();

        let objective_file = ws
            .config
            .store_dir
            .join("objectives")
            .join(format!("{}.json", objective.id));
        std::fs::write(&objective_file, "not json").unwrap();

        assert!(update_key_result(&ws, &kr.id.to_string(), Some(90.0), None, None, None).is_err());
        let stored = ws.repo.find_key_result(kr.id).unwrap();
        assert_eq!(stored.current_value, 10.0);
        assert_eq!(stored.progress, 10.0);
    }
}
