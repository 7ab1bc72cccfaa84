use clap::Parser;
use std::error::Error;

use mg_cli::cli::{Cli, Commands};
use mg_cli::scenario;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::RunScenario(cmd) => {
            tracer::init_tracing("octomg-cli", Some(&cmd.config.log_level));
            let report = scenario::run(cmd.scenario, &cmd.config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
