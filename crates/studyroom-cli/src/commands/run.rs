//! `studyroom run`: the timer and the midnight rollover in one process.

use std::sync::Arc;

use clap::Args;
use studyroom_core::storage::Database;
use studyroom_core::{ChecklistStore, Config, DailyRolloverScheduler, Event, SystemClock, TimerRunner};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::checklist::print_list;
use super::timer::report;
use super::{open_timer, resolve_user, runtime, CliResult};

#[derive(Args)]
pub struct RunArgs {
    /// Checklist owner (defaults to checklist.user_id from config)
    #[arg(long)]
    user: Option<String>,
    /// Restore the timer without starting it
    #[arg(long)]
    paused: bool,
}

pub fn run(args: RunArgs) -> CliResult {
    let config = Config::load()?;
    let auto_clear = config.checklist.auto_clear;
    let mut timer = open_timer(&config)?;

    // Without a user the timer still runs; the checklist side stays off.
    let user = resolve_user(args.user, &config).ok();
    let paused = args.paused;
    let checklist = match &user {
        Some(_) => Some(Arc::new(ChecklistStore::new(Database::open()?))),
        None => None,
    };

    if let (Some(store), Some(user)) = (checklist.clone(), user.clone()) {
        timer.set_observer(move |work_ended| {
            if !work_ended {
                return;
            }
            eprintln!("\nWork session done. Anything to tick off?");
            match store.today_items(&user) {
                Ok(items) => print_list(&items),
                Err(e) => warn!(error = %e, "could not load checklist"),
            }
        });
    }

    runtime()?.block_on(async move {
        let mut runner = TimerRunner::new(timer);
        if !paused {
            runner.start();
        }

        let mut scheduler = checklist.map(|store| DailyRolloverScheduler::new(store, SystemClock));
        let mut rollovers = match scheduler.as_mut() {
            Some(scheduler) if auto_clear => {
                let events = scheduler.subscribe();
                scheduler.set_identity(user.as_deref());
                Some(events)
            }
            _ => {
                info!("midnight auto-clear off");
                None
            }
        };

        let mut ticks = runner.subscribe();
        let mut status = tokio::time::interval(std::time::Duration::from_secs(1));
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = status.tick() => super::timer::status_line(&runner),
                received = ticks.recv() => match received {
                    Ok(event) => report(&event)?,
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "timer events dropped"),
                    Err(RecvError::Closed) => break,
                },
                received = next_rollover(&mut rollovers) => match received {
                    Ok(event) => report(&event)?,
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "rollover events dropped"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        if let Some(scheduler) = scheduler.as_mut() {
            scheduler.teardown();
        }
        eprintln!();
        runner.pause();
        report(&runner.snapshot())?;
        Ok(())
    })
}

async fn next_rollover(
    events: &mut Option<tokio::sync::broadcast::Receiver<Event>>,
) -> Result<Event, RecvError> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
