use std::sync::Arc;
use tracing::{error, info};
use yagwr::AppState;
use yagwr::config::Settings;
use yagwr::error::Result;
use yagwr::handlers::router;
use yagwr::logging::setup_logging;
use yagwr::rules::RuleSet;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn run(settings: Settings) -> Result<()> {
    let rules = RuleSet::load(&settings.rules_path)?;
    info!(
        "Loaded {} rule(s) from {:?}",
        rules.len(),
        settings.rules_path
    );

    let state = Arc::new(AppState::new(rules, settings.shell));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_address).await?;
    info!("Listening on {}", settings.bind_address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let _log_guard = match setup_logging(&settings.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Unable to set up logging: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(settings).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
