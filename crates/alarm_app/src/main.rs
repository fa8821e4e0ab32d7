use alarm_app::app::{App, Cli};
use alarm_app::config::AppConfig;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()
        .unwrap_or_default()
        .with_overrides(&cli.overrides);

    let mut app = App::start(&config)?;
    let mut stdout = std::io::stdout();
    if let Err(err) = app.execute(cli.command, &mut stdout).await {
        eprintln!("alarmclock: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}
