use clap::Parser;
use tracing::error;

use agent_tasks::app::AppState;
use agent_tasks::cli::Cli;
use agent_tasks::infrastructure::config::Settings;

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Failed to load settings");
            return;
        }
    };

    if let Err(e) = AppState::new(settings).run(cli.task).await {
        error!(task = ?cli.task, error = %e, "Task failed");
    }
}
