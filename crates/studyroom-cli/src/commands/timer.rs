use std::time::Duration;

use clap::Subcommand;
use studyroom_core::timer::format_mm_ss;
use studyroom_core::{Config, Event, KvStore, Notifier, TimerRunner};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{open_timer, print_json, runtime, CliResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Print current timer state as JSON
    Status,
    /// Start the countdown (it ticks while `timer run` or `run` is active)
    Start,
    /// Pause the countdown
    Pause,
    /// Start if paused, pause if running
    Toggle,
    /// Back to an idle work phase
    Reset,
    /// Set the work duration in minutes (at least 1)
    Work {
        #[arg(allow_negative_numbers = true)]
        minutes: i64,
    },
    /// Set the break duration in minutes (at least 1)
    Break {
        #[arg(allow_negative_numbers = true)]
        minutes: i64,
    },
    /// Run the countdown in the foreground until Ctrl-C
    Run,
}

pub fn run(action: TimerAction) -> CliResult {
    let config = Config::load()?;
    let mut timer = open_timer(&config)?;

    let event = match action {
        TimerAction::Status => None,
        TimerAction::Start => timer.start(),
        TimerAction::Pause => timer.pause(),
        TimerAction::Toggle => timer.toggle(),
        TimerAction::Reset => timer.reset(),
        TimerAction::Work { minutes } => timer.set_work_duration(minutes),
        TimerAction::Break { minutes } => timer.set_break_duration(minutes),
        TimerAction::Run => {
            timer.set_observer(|work_ended| {
                if work_ended {
                    eprintln!("\nWork session done. Good moment to tick something off your checklist.");
                }
            });
            return runtime()?.block_on(async {
                let mut runner = TimerRunner::new(timer);
                runner.start();
                foreground(&mut runner).await
            });
        }
    };

    match event {
        Some(event) => print_json(&event)?,
        None => print_json(&timer.snapshot())?,
    }
    Ok(())
}

/// Render a live status line until Ctrl-C, then pause the timer.
pub(crate) async fn foreground<S, N>(runner: &mut TimerRunner<S, N>) -> CliResult
where
    S: KvStore + 'static,
    N: Notifier + 'static,
{
    let mut events = runner.subscribe();
    let mut status = tokio::time::interval(Duration::from_secs(1));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = status.tick() => status_line(runner),
            received = events.recv() => match received {
                Ok(event) => report(&event)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "timer events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    eprintln!();
    runner.pause();
    print_json(&runner.snapshot())?;
    Ok(())
}

pub(crate) fn status_line<S, N>(runner: &TimerRunner<S, N>)
where
    S: KvStore + 'static,
    N: Notifier + 'static,
{
    let state = runner.state();
    let marker = if state.running { "▶" } else { "⏸" };
    eprint!(
        "\r{marker} {}: {}   ",
        state.phase.label(),
        format_mm_ss(state.remaining_secs)
    );
}

/// One event per line on stdout, for piping.
pub(crate) fn report(event: &Event) -> Result<(), serde_json::Error> {
    eprintln!();
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
