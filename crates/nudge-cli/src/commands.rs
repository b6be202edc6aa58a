use std::future::Future;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use nudge_api::client::{ApiClient, TaskCreate, TaskPatch};
use nudge_api::snapshot::{Mutation, Snapshot};
use nudge_core::bucket::{bucketize, bucketize_with_completed};
use nudge_core::calendar::{month_grid, tasks_on_date};
use nudge_core::config::Config;
use nudge_core::datekey::{DateKey, date_key_of, resolve_zone};
use nudge_core::deadline::{DeadlineShortcut, denormalize, normalize, parse_wire_instant};
use nudge_core::recurrence::next_occurrence;
use nudge_core::reminder::{digest_tasks, due_reminders, remind_at_from_offset, scheduled_reminders};
use nudge_core::task::Task;
use tracing::{debug, info, instrument, warn};

use crate::cli::Command;
use crate::render::Renderer;

/// How many recently completed tasks the combined `list --all` view shows.
const RECENT_COMPLETED: usize = 10;

#[instrument(skip(client, cfg, renderer, command, now))]
pub async fn dispatch(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::List { all } => cmd_list(client, cfg, renderer, now, all).await,
        Command::Cal { year, month, day } => {
            cmd_cal(client, cfg, renderer, now, year, month, day).await
        }
        Command::Archived { limit, clear } => {
            cmd_archived(client, cfg, renderer, limit, clear).await
        }
        Command::Completed { since } => cmd_completed(client, cfg, renderer, &since).await,
        Command::Add { text, due } => {
            cmd_add(client, cfg, renderer, now, text, due.as_deref()).await
        }
        Command::Done { id } => cmd_done(client, cfg, renderer, now, id).await,
        Command::Reopen { id } => cmd_reopen(client, cfg, renderer, now, id).await,
        Command::Archive { id } => cmd_archive(client, cfg, renderer, now, id).await,
        Command::Edit { id, text } => cmd_edit(client, cfg, renderer, now, id, text).await,
        Command::Move { id, when } => cmd_move(client, cfg, renderer, now, id, &when).await,
        Command::Delete { id } => cmd_delete(client, cfg, renderer, now, id).await,
        Command::Timezone { zone } => cmd_timezone(client, renderer, zone.as_deref()).await,
        Command::Digest => cmd_digest(client, cfg, renderer, now).await,
    }
}

async fn cmd_list(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    all: bool,
) -> anyhow::Result<()> {
    let mut tasks = client.active_tasks().await?;

    if all {
        tasks.extend(client.archived_tasks(RECENT_COMPLETED).await?);
        let groups = bucketize_with_completed(&tasks, now, &cfg.display.timezone);
        return renderer.print_buckets(&groups, &cfg.display.timezone);
    }

    let groups = bucketize(&tasks, now, &cfg.display.timezone);
    renderer.print_buckets(&groups, &cfg.display.timezone)
}

async fn cmd_cal(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
) -> anyhow::Result<()> {
    let (year, month) = match (year, month) {
        (Some(year), Some(month)) => (year, month),
        (None, None) => {
            let today = date_key_of(now, &cfg.display.timezone);
            (today.year, today.month)
        }
        _ => return Err(anyhow!("cal expects both YEAR and MONTH, or neither")),
    };

    if !(1..=12).contains(&month) {
        return Err(anyhow!("month out of range: {month}"));
    }

    let tasks = client.active_tasks().await?;

    if let Some(day) = day {
        let date_key = DateKey::new(year, month, day);
        let hits = tasks_on_date(date_key, &tasks, &cfg.display.timezone);
        return renderer.print_day(date_key, &hits, &cfg.display.timezone);
    }

    let grid = month_grid(year, month - 1, &tasks, &cfg.display.timezone, now)?;
    renderer.print_month(&grid, year, month)
}

async fn cmd_archived(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    limit: usize,
    clear: bool,
) -> anyhow::Result<()> {
    if clear {
        client.clear_archive().await?;
        println!("archive cleared");
        return Ok(());
    }

    let tasks = client.archived_tasks(limit).await?;
    renderer.print_archive(&tasks, &cfg.display.timezone)
}

async fn cmd_completed(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    since: &str,
) -> anyhow::Result<()> {
    let since: DateKey = since.parse().context("invalid --since date")?;
    let tasks = client.completed_tasks_since(since).await?;
    renderer.print_archive(&tasks, &cfg.display.timezone)
}

async fn cmd_add(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    text: String,
    due: Option<&str>,
) -> anyhow::Result<()> {
    let trimmed = text.trim().to_string();
    if trimmed.is_empty() {
        return Err(anyhow!("task text cannot be empty"));
    }

    let deadline_iso = match due {
        Some(when) => deadline_wire_for(when, cfg, now)?,
        None => None,
    };
    let create = TaskCreate {
        text: trimmed,
        deadline_iso,
    };

    let created = client.create_task(&create).await?;
    info!(id = created.id, "task created");
    println!("task {} added", created.id);

    let tasks = client.active_tasks().await?;
    let groups = bucketize(&tasks, now, &cfg.display.timezone);
    renderer.print_buckets(&groups, &cfg.display.timezone)
}

async fn cmd_done(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    id: i64,
) -> anyhow::Result<()> {
    let tasks = client.active_tasks().await?;
    let target = tasks
        .iter()
        .find(|task| task.id == id)
        .cloned()
        .ok_or_else(|| anyhow!("no active task with id {id}"))?;

    let (snapshot, outcome) = run_optimistic(
        client,
        tasks,
        |tasks| tasks.retain(|task| task.id != id),
        client.complete_task(id),
    )
    .await?;

    println!("task {id} done");
    if let Some(new_id) = outcome.new_task_id {
        println!("recurring task rolled forward as task {new_id}");
        if let (Some(recurrence), Some(due)) = (target.recurrence(), target.due_at) {
            let next = next_occurrence(due, recurrence);
            println!(
                "next occurrence due {}",
                denormalize(next, &cfg.display.timezone)
            );
        }
    }

    let groups = bucketize(snapshot.tasks(), now, &cfg.display.timezone);
    renderer.print_buckets(&groups, &cfg.display.timezone)
}

async fn cmd_reopen(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    id: i64,
) -> anyhow::Result<()> {
    client.reopen_task(id).await?;
    info!(id, "task reopened");
    println!("task {id} reopened");

    let tasks = client.active_tasks().await?;
    let groups = bucketize(&tasks, now, &cfg.display.timezone);
    renderer.print_buckets(&groups, &cfg.display.timezone)
}

async fn cmd_archive(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    id: i64,
) -> anyhow::Result<()> {
    let tasks = client.active_tasks().await?;
    ensure_present(&tasks, id)?;

    let (snapshot, ()) = run_optimistic(
        client,
        tasks,
        |tasks| tasks.retain(|task| task.id != id),
        client.archive_task(id),
    )
    .await?;

    println!("task {id} archived");
    let groups = bucketize(snapshot.tasks(), now, &cfg.display.timezone);
    renderer.print_buckets(&groups, &cfg.display.timezone)
}

async fn cmd_edit(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    id: i64,
    text: String,
) -> anyhow::Result<()> {
    let trimmed = text.trim().to_string();
    if trimmed.is_empty() {
        return Err(anyhow!("task text cannot be empty"));
    }

    let tasks = client.active_tasks().await?;
    ensure_present(&tasks, id)?;

    let patch = TaskPatch::text(trimmed.clone());
    let local_text = trimmed;
    let (snapshot, _updated) = run_optimistic(
        client,
        tasks,
        move |tasks| {
            for task in tasks.iter_mut().filter(|task| task.id == id) {
                task.text = local_text.clone();
            }
        },
        client.update_task(id, &patch),
    )
    .await?;

    println!("task {id} updated");
    let groups = bucketize(snapshot.tasks(), now, &cfg.display.timezone);
    renderer.print_buckets(&groups, &cfg.display.timezone)
}

async fn cmd_move(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    id: i64,
    when: &str,
) -> anyhow::Result<()> {
    let tasks = client.active_tasks().await?;
    let target = tasks
        .iter()
        .find(|task| task.id == id)
        .cloned()
        .ok_or_else(|| anyhow!("no active task with id {id}"))?;

    let wire = deadline_wire_for(when, cfg, now)?;
    // Best effort for the optimistic view: a passthrough string the engine
    // cannot parse leaves the local due untouched until the reload.
    let parsed = wire.as_deref().and_then(|raw| parse_wire_instant(raw).ok());
    let clear = wire.is_none();

    let patch = TaskPatch::deadline(wire);
    let (snapshot, _updated) = run_optimistic(
        client,
        tasks,
        move |tasks| {
            for task in tasks.iter_mut().filter(|task| task.id == id) {
                if clear {
                    task.due_at = None;
                } else if let Some(instant) = parsed {
                    task.due_at = Some(instant);
                }
            }
        },
        client.update_task(id, &patch),
    )
    .await?;

    if clear {
        println!("task {id} deadline cleared");
    } else {
        println!("task {id} rescheduled");
        // The store keeps the reminder lead time across reschedules; show
        // where the reminder is expected to land.
        if let (Some(offset), Some(instant)) = (target.remind_offset_min, parsed) {
            let remind = remind_at_from_offset(instant, offset, now);
            println!(
                "reminder expected at {}",
                denormalize(remind, &cfg.display.timezone)
            );
        }
    }
    let groups = bucketize(snapshot.tasks(), now, &cfg.display.timezone);
    renderer.print_buckets(&groups, &cfg.display.timezone)
}

async fn cmd_delete(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
    id: i64,
) -> anyhow::Result<()> {
    let tasks = client.active_tasks().await?;
    ensure_present(&tasks, id)?;

    let (snapshot, ()) = run_optimistic(
        client,
        tasks,
        |tasks| tasks.retain(|task| task.id != id),
        client.delete_task(id),
    )
    .await?;

    println!("task {id} deleted");
    let groups = bucketize(snapshot.tasks(), now, &cfg.display.timezone);
    renderer.print_buckets(&groups, &cfg.display.timezone)
}

async fn cmd_timezone(
    client: &ApiClient,
    renderer: &mut Renderer,
    zone: Option<&str>,
) -> anyhow::Result<()> {
    let settings = match zone {
        None => client.me().await?,
        Some(zone) => {
            if resolve_zone(zone).is_none() {
                warn!(zone, "zone id not in the local tz database; server may reject it");
            }
            client.set_timezone(zone).await?
        }
    };
    renderer.print_settings(&settings)
}

async fn cmd_digest(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let tasks = client.active_tasks().await?;
    let due = due_reminders(&tasks, now);
    let scheduled = scheduled_reminders(&tasks, now);
    let active = digest_tasks(&tasks);
    renderer.print_digest(&due, &scheduled, &active, &cfg.display.timezone)
}

/// Optimistic-update-then-reconcile: apply locally, issue the request, and
/// either commit and reload the snapshot wholesale, or roll back to the
/// exact pre-mutation contents and surface the failure.
async fn run_optimistic<T, Fut>(
    client: &ApiClient,
    tasks: Vec<Task>,
    apply: impl FnOnce(&mut Vec<Task>),
    request: Fut,
) -> anyhow::Result<(Snapshot, T)>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut snapshot = Snapshot::new(tasks);
    let mut mutation = Mutation::new();
    mutation.apply(&mut snapshot, apply)?;

    match request.await {
        Ok(value) => {
            mutation.commit()?;
            snapshot.reload(client.active_tasks().await?);
            Ok((snapshot, value))
        }
        Err(err) => {
            mutation.roll_back(&mut snapshot)?;
            warn!(error = %err, "request failed; optimistic change rolled back");
            Err(err)
        }
    }
}

fn ensure_present(tasks: &[Task], id: i64) -> anyhow::Result<()> {
    if tasks.iter().any(|task| task.id == id) {
        Ok(())
    } else {
        Err(anyhow!("no active task with id {id}"))
    }
}

/// Maps a user-entered deadline to the wire value for `PATCH`. `None`
/// clears the deadline; shortcuts resolve against the display timezone's
/// current wall clock; everything else goes through the normalizer.
fn deadline_wire_for(
    when: &str,
    cfg: &Config,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<String>> {
    let token = when.trim();
    if token.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    if let Some(shortcut) = DeadlineShortcut::parse(token) {
        let resolved = match resolve_zone(&cfg.display.timezone) {
            Some(tz) => shortcut.resolve(&now.with_timezone(&tz))?.to_rfc3339(),
            None => shortcut
                .resolve(&now.with_timezone(&chrono::Local))?
                .to_rfc3339(),
        };
        return Ok(Some(resolved));
    }

    Ok(normalize(token, &cfg.deadline.default_offset))
}
