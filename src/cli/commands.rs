use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tly", about = concat!("tally v", env!("CARGO_PKG_VERSION"), " - a live task index over your notes"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different vault directory
    #[arg(short = 'C', long = "vault-dir", global = true)]
    pub vault_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index the vault and list every task
    Scan,
    /// List tasks shown on a day, honoring the day boundary hour
    Day(DayArgs),
    /// Show task details
    Show(ShowArgs),
    /// Change a task's status
    Set(SetArgs),
    /// Keep the index live and report completions as they happen
    Watch,
}

#[derive(Args)]
pub struct DayArgs {
    /// Day to list (YYYY-MM-DD)
    pub date: String,
    /// Hour the visual day starts at (overrides tally.toml)
    #[arg(long)]
    pub boundary_hour: Option<u32>,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Task location as PATH:LINE (line numbers start at 1)
    pub location: String,
}

#[derive(Args)]
pub struct SetArgs {
    /// Task location as PATH:LINE (line numbers start at 1)
    pub location: String,
    /// New status: todo, done, cancelled, exception, in-progress, deferred,
    /// or a single checkbox character
    pub status: String,
}
