use std::sync::Arc;

use clap::Subcommand;
use serde_json::json;
use studyroom_core::storage::Database;
use studyroom_core::{ChecklistItem, ChecklistStore, ChecklistSummary, Config, DailyRolloverScheduler, SystemClock};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{print_json, resolve_user, runtime, CliResult};

#[derive(Subcommand)]
pub enum ChecklistAction {
    /// Add an item to today's checklist
    Add {
        /// Item title
        title: String,
    },
    /// List today's items
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Flip an item between done and not done
    Toggle {
        /// Item ID
        id: String,
    },
    /// Delete an item
    Delete {
        /// Item ID
        id: String,
    },
    /// Delete today's completed items now
    ClearCompleted,
    /// Clear completed items at every local midnight until Ctrl-C
    Watch,
}

pub fn run(user: Option<String>, action: ChecklistAction) -> CliResult {
    let config = Config::load()?;
    let user = resolve_user(user, &config)?;
    let store = ChecklistStore::new(Database::open()?);

    match action {
        ChecklistAction::Add { title } => {
            let item = store.add(&user, &title)?;
            print_json(&item)?;
        }
        ChecklistAction::List { json } => {
            let items = store.today_items(&user)?;
            if json {
                print_json(&items)?;
            } else {
                print_list(&items);
            }
        }
        ChecklistAction::Toggle { id } => {
            let completed = store.toggle(&user, &id)?;
            print_json(&json!({ "id": id, "completed": completed }))?;
        }
        ChecklistAction::Delete { id } => {
            store.delete(&user, &id)?;
            print_json(&json!({ "deleted": id }))?;
        }
        ChecklistAction::ClearCompleted => {
            let cleared = store.clear_completed_today(&user)?;
            print_json(&json!({ "cleared": cleared }))?;
        }
        ChecklistAction::Watch => {
            if !config.checklist.auto_clear {
                eprintln!("checklist.auto_clear is off; nothing to watch.");
                return Ok(());
            }
            runtime()?.block_on(watch(Arc::new(store), &user))?;
        }
    }
    Ok(())
}

pub(crate) fn print_list(items: &[ChecklistItem]) {
    if items.is_empty() {
        println!("Nothing on today's checklist.");
        return;
    }
    for item in items {
        let mark = if item.completed { "x" } else { " " };
        println!("[{mark}] {}  ({})", item.title, item.id);
    }
    let summary = ChecklistSummary::of(items);
    println!(
        "{}/{} done {}",
        summary.completed,
        summary.total,
        summary.mood.emoji()
    );
}

async fn watch(store: Arc<ChecklistStore>, user: &str) -> CliResult {
    let mut scheduler = DailyRolloverScheduler::new(store, SystemClock);
    let mut events = scheduler.subscribe();
    scheduler.set_identity(Some(user));
    eprintln!("Clearing completed items for '{user}' at local midnight. Ctrl-C to stop.");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = events.recv() => match received {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "rollover events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    scheduler.teardown();
    Ok(())
}
