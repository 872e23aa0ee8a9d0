// objective.rs - Objective subcommands: create, list, show, cancel, activate.

use clap::Subcommand;
use okr_goal::status::assess;
use okr_goal::{
    Clock, GoalError, GoalRepository, Objective, ObjectiveStatus, OkrConfig, Period, SystemClock,
};

use super::{parse_date, parse_id, truncate, Workspace};

#[derive(Subcommand)]
pub enum ObjectiveCommands {
    /// Create a new objective.
    Create {
        /// Objective title (e.g., "Launch the public beta").
        title: String,
        /// Start date (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        start: String,
        /// End date; derived from --period when omitted.
        #[arg(long)]
        end: Option<String>,
        /// weekly, monthly, quarterly, yearly, or custom.
        #[arg(long, default_value = "quarterly")]
        period: String,
        /// Longer description.
        #[arg(long)]
        description: Option<String>,
        /// Create as a draft instead of active.
        #[arg(long)]
        draft: bool,
    },
    /// List objectives.
    List {
        /// Filter by status (e.g., "active", "at_risk", "completed").
        #[arg(long)]
        status: Option<String>,
    },
    /// Show an objective with its key results.
    Show {
        /// Objective ID.
        id: String,
    },
    /// Cancel an objective. Cancelled objectives are never recomputed.
    Cancel {
        /// Objective ID.
        id: String,
    },
    /// Move a draft objective to active.
    Activate {
        /// Objective ID.
        id: String,
    },
}

pub fn execute(cmd: &ObjectiveCommands, config: &OkrConfig) -> anyhow::Result<()> {
    let ws = Workspace::open(config)?;

    match cmd {
        ObjectiveCommands::Create {
            title,
            start,
            end,
            period,
            description,
            draft,
        } => create_objective(
            &ws,
            title,
            start,
            end.as_deref(),
            period,
            description.as_deref(),
            *draft,
        ),
        ObjectiveCommands::List { status } => list_objectives(&ws, status.as_deref()),
        ObjectiveCommands::Show { id } => show_objective(&ws, id),
        ObjectiveCommands::Cancel { id } => cancel_objective(&ws, id),
        ObjectiveCommands::Activate { id } => activate_objective(&ws, id),
    }
}

fn create_objective(
    ws: &Workspace,
    title: &str,
    start: &str,
    end: Option<&str>,
    period: &str,
    description: Option<&str>,
    draft: bool,
) -> anyhow::Result<()> {
    let period: Period = period.parse()?;
    let start = parse_date(start)?;
    let end = match end {
        Some(end) => parse_date(end)?,
        None => period
            .default_end(start)
            .ok_or_else(|| anyhow::anyhow!("--end is required for a {} objective", period))?,
    };

    let mut objective = Objective::new(title, period, start, end);
    objective.description = description.map(|d| d.to_string());
    if draft {
        objective = objective.draft();
    }
    objective.validate()?;
    ws.repo.save_objective(&objective)?;

    println!("Objective created: {}", objective.id);
    println!("  Title:  {}", objective.title);
    println!("  Period: {} ({} to {})", period, start.date_naive(), end.date_naive());
    println!("  Status: {}", objective.status);

    Ok(())
}

fn list_objectives(ws: &Workspace, status: Option<&str>) -> anyhow::Result<()> {
    let filter: Option<ObjectiveStatus> = status.map(|s| s.parse()).transpose()?;
    let objectives: Vec<Objective> = ws
        .repo
        .list_objectives()?
        .into_iter()
        .filter(|o| filter.map_or(true, |status| o.status == status))
        .collect();

    if objectives.is_empty() {
        println!("No objectives found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<30} {:<10} {:>8} {:<12}",
        "ID", "TITLE", "STATUS", "PROGRESS", "ENDS"
    );
    println!("{}", "-".repeat(102));

    for o in &objectives {
        println!(
            "{:<38} {:<30} {:<10} {:>7}% {:<12}",
            o.id,
            truncate(&o.title, 28),
            o.status.to_string(),
            o.progress,
            o.end_date.date_naive(),
        );
    }
    println!("\n{} objective(s) total.", objectives.len());

    Ok(())
}

fn show_objective(ws: &Workspace, id: &str) -> anyhow::Result<()> {
    let objective = ws.repo.find_objective(parse_id(id)?)?;
    let key_results = ws.repo.find_key_results_by_objective(objective.id)?;
    let assessment = assess(
        objective.status,
        objective.progress,
        objective.start_date,
        objective.end_date,
        SystemClock.now(),
        &ws.engine.status,
    );

    println!("Objective: {}", objective.id);
    println!("Title:     {}", objective.title);
    if let Some(ref description) = objective.description {
        println!("About:     {}", description);
    }
    println!("Period:    {}", objective.period);
    println!(
        "Dates:     {} to {}",
        objective.start_date.date_naive(),
        objective.end_date.date_naive()
    );
    println!("Status:    {}", objective.status);
    println!("Progress:  {}%", objective.progress);
    println!("Expected:  {:.0}%", assessment.expected_progress);
    println!("Days left: {:.1}", assessment.days_remaining.max(0.0));
    println!("Updated:   {}", objective.updated_at.to_rfc3339());

    if key_results.is_empty() {
        println!("\nNo key results.");
        return Ok(());
    }

    println!();
    println!(
        "{:<38} {:<26} {:<10} {:>20} {:>8}",
        "KEY RESULT", "TITLE", "METRIC", "CURRENT / TARGET", "PROGRESS"
    );
    println!("{}", "-".repeat(106));
    for kr in &key_results {
        let unit = kr.unit.as_deref().unwrap_or("");
        println!(
            "{:<38} {:<26} {:<10} {:>20} {:>7}%",
            kr.id,
            truncate(&kr.title, 24),
            kr.metric_type.to_string(),
            format!("{}{} / {}{}", kr.current_value, unit, kr.target_value, unit),
            kr.progress,
        );
    }

    Ok(())
}

fn cancel_objective(ws: &Workspace, id: &str) -> anyhow::Result<()> {
    let objective_id = parse_id(id)?;
    let objective = ws.retry(|| {
        let mut objective = ws.repo.find_objective(objective_id)?;
        if objective.status.is_terminal() {
            return Err(GoalError::Validation(format!(
                "objective is already {}",
                objective.status
            )));
        }
        objective.status = ObjectiveStatus::Cancelled;
        objective.next_revision(SystemClock.now());
        ws.repo.save_objective(&objective)?;
        Ok(objective)
    })?;

    tracing::info!(objective_id = %objective.id, "objective cancelled");
    println!("Objective cancelled: {}", objective.id);
    Ok(())
}

fn activate_objective(ws: &Workspace, id: &str) -> anyhow::Result<()> {
    let objective_id = parse_id(id)?;
    let propagator = ws.propagator();
    // Status may move straight on (at risk, completed) given progress.
    let objective = ws.retry(|| {
        propagator.apply_objective_change(objective_id, |repo| {
            let mut objective = repo.find_objective(objective_id)?;
            if objective.status != ObjectiveStatus::Draft {
                return Err(GoalError::Validation(format!(
                    "only draft objectives can be activated (is {})",
                    objective.status
                )));
            }
            objective.status = ObjectiveStatus::Active;
            objective.next_revision(propagator.clock().now());
            repo.save_objective(&objective)
        })
    })?;

    println!("Objective activated: {}", objective.id);
    println!("  Status:   {}", objective.status);
    println!("  Progress: {}%", objective.progress);
    Ok(())
}
