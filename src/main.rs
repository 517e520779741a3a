use anyhow::Result;
use clap::Parser;

use insight_cache::{app::load_config, cli::handle_command, cli::Cli, utils::init_logger};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays clean
    init_logger(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    // Exit with appropriate code
    if !handle_command(&cli, &config).await? {
        std::process::exit(1);
    }

    Ok(())
}
