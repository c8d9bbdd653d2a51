use anyhow::Result;
use clap::Parser;
use entitled::{
    cmd::{Cli, Commands},
    utils::logs_fmt::UptimeSeconds,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_timer(UptimeSeconds)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Resolve(args) => args.execute().await?,
        Commands::Session(cmd) => cmd.execute().await?,
        Commands::Cache(cmd) => cmd.execute().await?,
    }

    Ok(())
}
