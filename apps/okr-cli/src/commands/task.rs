// task.rs - Task subcommands: link, unlink, status.
//
// Tasks live in an external tracker; the store only keeps their latest
// reported status and which key results they count toward.

use clap::Subcommand;
use okr_goal::{
    GoalRepository, KeyResultMutation, LinkedTask, OkrConfig, TaskSnapshot, TaskStatus,
};

use super::kr::print_rollup;
use super::{parse_id, Workspace};

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Count a task toward a key result (re-linking updates the weight).
    Link {
        /// Key result ID.
        key_result_id: String,
        /// Task ID in the external tracker.
        task_id: String,
        /// Relative weight of this task.
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
    },
    /// Stop counting a task toward a key result.
    Unlink {
        key_result_id: String,
        task_id: String,
    },
    /// Report a task's status (todo, in_progress, completed, cancelled).
    Status { task_id: String, status: String },
}

pub fn execute(cmd: &TaskCommands, config: &OkrConfig) -> anyhow::Result<()> {
    let ws = Workspace::open(config)?;

    match cmd {
        TaskCommands::Link {
            key_result_id,
            task_id,
            weight,
        } => link_task(&ws, key_result_id, task_id, *weight),
        TaskCommands::Unlink {
            key_result_id,
            task_id,
        } => unlink_task(&ws, key_result_id, task_id),
        TaskCommands::Status { task_id, status } => report_status(&ws, task_id, status),
    }
}

fn link_task(ws: &Workspace, key_result_id: &str, task_id: &str, weight: f64) -> anyhow::Result<()> {
    let key_result_id = parse_id(key_result_id)?;
    let task_id = parse_id(task_id)?;
    if !weight.is_finite() || weight <= 0.0 || weight > 10.0 {
        anyhow::bail!("--weight must be in (0, 10], got {}", weight);
    }

    let link = LinkedTask::new(key_result_id, task_id).with_weight(weight);
    let propagator = ws.propagator();
    let objective = ws.retry(|| {
        propagator.apply_key_result_change(key_result_id, KeyResultMutation::LinksChanged, |repo| {
            repo.save_linked_task(&link)
        })
    })?;

    println!("Task {} linked to key result {}", task_id, key_result_id);
    print_rollup(&objective);
    Ok(())
}

fn unlink_task(ws: &Workspace, key_result_id: &str, task_id: &str) -> anyhow::Result<()> {
    let key_result_id = parse_id(key_result_id)?;
    let task_id = parse_id(task_id)?;

    let linked = ws
        .repo
        .find_linked_tasks_by_key_result(key_result_id)?
        .iter()
        .any(|link| link.task_id == task_id);
    if !linked {
        println!("Task {} was not linked to key result {}", task_id, key_result_id);
        return Ok(());
    }

    let propagator = ws.propagator();
    let objective = ws.retry(|| {
        propagator.apply_key_result_change(key_result_id, KeyResultMutation::LinksChanged, |repo| {
            repo.delete_linked_task(key_result_id, task_id).map(|_| ())
        })
    })?;

    println!("Task {} unlinked from key result {}", task_id, key_result_id);
    print_rollup(&objective);
    Ok(())
}

fn report_status(ws: &Workspace, task_id: &str, status: &str) -> anyhow::Result<()> {
    let task_id = parse_id(task_id)?;
    let status: TaskStatus = status.parse()?;

    let snapshot = TaskSnapshot {
        id: task_id,
        status,
    };
    let propagator = ws.propagator();
    let objectives =
        ws.retry(|| propagator.apply_task_change(task_id, |repo| repo.save_task(&snapshot)))?;

    println!("Task {} is now {}", task_id, status);
    if objectives.is_empty() {
        println!("  (not linked to any task-count key result)");
    }
    for objective in &objectives {
        print_rollup(objective);
    }
    Ok(())
}
