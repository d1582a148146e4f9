use std::sync::Arc;

use teloxide::prelude::*;

mod bot;
mod configuration;
mod db;
mod feed_preferences;
mod logger;
mod notifier;
mod sources;
mod subscriptions;
mod sweep;
mod utils;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Starting mangagram bot");

    if cfg!(debug_assertions) {
        println!("Debug mode - loading .env file.");
        if let Err(e) = dotenvy::dotenv() {
            println!("No .env file loaded: {e}");
        }
    }
    logger::init_from_environment();

    log::info!("Starting mangagram bot...");

    log::debug!("Loading configuration");
    let config = configuration::Configuration::from_env()?;

    log::debug!("Initializing database");
    let pool = db::initialize_db(&config).await?;
    let repositories = db::RepositoryProvider::new(pool);

    log::debug!("Registering manga sources");
    let sources = Arc::new(sources::SourceRegistry::from_configuration(&config)?);
    log::info!(
        "Available feeds: {}",
        sources
            .feeds()
            .iter()
            .map(|feed| feed.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let bot = Bot::new(config.teloxide_token.clone());

    let sweep_state = Arc::new(sweep::SweepState {
        repositories: repositories.clone(),
        sources: sources.clone(),
        notifier: Arc::new(bot.clone()),
        concurrency: config.sweep_concurrency,
    });
    sweep::spawn(sweep_state, config.sweep_interval_secs).await;

    let state = Arc::new(bot::BotState::new(repositories, sources));
    bot::run(bot, state, &config).await?;

    log::info!("mangagram bot stopped");
    Ok(())
}
