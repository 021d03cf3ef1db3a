use clap::Parser;
use tally::cli::commands::Cli;
use tally::cli::handlers;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = handlers::dispatch(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
