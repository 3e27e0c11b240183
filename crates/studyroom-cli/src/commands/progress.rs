use clap::Subcommand;
use studyroom_core::storage::{daily_totals, Database, SubjectUpdate, DEFAULT_RECENT_DAYS};
use studyroom_core::{Config, ProgressStore};

use super::{print_json, resolve_user, CliResult};

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Log a studied topic
    Add {
        /// Subject (e.g. "Physics")
        subject: String,
        /// Topic (e.g. "Kinematics")
        topic: String,
        /// Status label
        #[arg(long)]
        status: Option<String>,
    },
    /// Set topic counts for a subject; omitted counts keep their value
    Subject {
        /// Subject name
        name: String,
        /// Topics completed so far
        #[arg(long)]
        completed: Option<u32>,
        /// Topics in the subject (required the first time)
        #[arg(long)]
        total: Option<u32>,
    },
    /// List subject progress
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Records logged over the last few days
    Recent {
        /// Number of days to look back
        #[arg(long, default_value_t = DEFAULT_RECENT_DAYS)]
        days: u32,
        /// Output raw records as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(user: Option<String>, action: ProgressAction) -> CliResult {
    let config = Config::load()?;
    let user = resolve_user(user, &config)?;
    let store = ProgressStore::new(Database::open()?);

    match action {
        ProgressAction::Add {
            subject,
            topic,
            status,
        } => {
            let record = store.record(&user, &subject, &topic, status.as_deref())?;
            print_json(&record)?;
        }
        ProgressAction::Subject {
            name,
            completed,
            total,
        } => {
            let update = SubjectUpdate {
                topics_completed: completed,
                total_topics: total,
            };
            let progress = store.set_subject(&user, &name, update)?;
            print_json(&progress)?;
        }
        ProgressAction::List { json } => {
            let subjects = store.subjects(&user)?;
            if json {
                print_json(&subjects)?;
            } else if subjects.is_empty() {
                println!("No subjects yet.");
            } else {
                for s in &subjects {
                    println!(
                        "{:<24} {:>3}/{:<3} {:>5.1}%",
                        s.subject_name,
                        s.topics_completed,
                        s.total_topics,
                        s.percent()
                    );
                }
            }
        }
        ProgressAction::Recent { days, json } => {
            let records = store.recent(&user, days)?;
            if json {
                print_json(&records)?;
            } else if records.is_empty() {
                println!("Nothing logged in the last {days} days.");
            } else {
                for day in daily_totals(&records) {
                    println!("{}  {:<24} {}", day.date, day.subject, day.records);
                }
            }
        }
    }
    Ok(())
}
