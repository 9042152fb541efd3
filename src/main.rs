use amputator::amputate::Amputator;
use amputator::resolver::AmputatorClient;
use amputator::{config::Config, db::Database, handlers, Data};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging; RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let discord_token = config.discord_token.clone();

    let db = Database::new(&config)?;
    db.execute_init()?;
    info!("Database ready at {}", config.database_url);

    let resolver = AmputatorClient::new(
        reqwest::Client::new(),
        &config.resolver_url,
        config.resolver_timeout,
    );
    let amputator = Amputator::new(db.clone(), config.cache_scope, Arc::new(resolver));

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![],
            event_handler: |ctx, event, _framework, data| {
                Box::pin(handlers::handle_event(ctx, event, data))
            },
            ..Default::default()
        })
        .setup(move |_ctx, ready, _framework| {
            Box::pin(async move {
                info!("Bot is ready as {}", ready.user.name);
                Ok(Data {
                    config,
                    db,
                    amputator,
                    bot_id: ready.user.id.get(),
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
