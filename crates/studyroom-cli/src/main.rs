use clap::{Parser, Subcommand};

mod commands;
mod logging;
mod notifier;

#[derive(Parser)]
#[command(name = "studyroom", version, about = "Studyroom CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work/break timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Daily checklist
    Checklist {
        /// Checklist owner (defaults to checklist.user_id from config)
        #[arg(long, global = true)]
        user: Option<String>,
        #[command(subcommand)]
        action: commands::checklist::ChecklistAction,
    },
    /// Study progress per subject
    Progress {
        /// Progress owner (defaults to checklist.user_id from config)
        #[arg(long, global = true)]
        user: Option<String>,
        #[command(subcommand)]
        action: commands::progress::ProgressAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the timer and the midnight checklist rollover until Ctrl-C
    Run(commands::run::RunArgs),
}

fn main() {
    logging::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Checklist { user, action } => commands::checklist::run(user, action),
        Commands::Progress { user, action } => commands::progress::run(user, action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Run(args) => commands::run::run(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
