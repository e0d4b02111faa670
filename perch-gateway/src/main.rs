use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use perch_gateway::discord::{DiscordError, start_discord_bot};
use perch_gateway::generator::chromium::ChromiumHost;
use perch_gateway::generator::perchance::PerchanceClient;
use perch_gateway::generator::{CacheOptions, GeneratorCache, GeneratorLoader, LoadPolicy, Resolver};
use perch_gateway::render::Renderer;
use perch_gateway::server::{self, ServerState};
use perch_gateway::web::GeneratorSearch;
use perch_gateway::{AppState, Pipeline, RateLimitGate};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first so the log level can come from it
    let config = perch_core::Config::load()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.settings.logging.level.as_str().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind_addr = config.bind_addr();
    let Some(token) = config.discord_token().map(str::to_string) else {
        warn!("DISCORD_TOKEN is not set; only the liveness server will run");
        let state = Arc::new(ServerState {
            discord_configured: false,
            resolver: None,
        });
        return server::run(state, &bind_addr).await;
    };
    let settings = config.settings;
    info!(
        "Configuration loaded (prefix: {:?}, cache capacity: {})",
        settings.discord.command_prefix, settings.generators.cache_capacity
    );

    // Generator sandbox and cache
    let host = Arc::new(ChromiumHost::launch(&settings.browser).await?);
    let catalog = Arc::new(PerchanceClient::new(&settings.generators)?);
    let loader = GeneratorLoader::new(
        catalog,
        host.clone(),
        LoadPolicy::from_settings(&settings.generators),
    );
    let cache = Arc::new(GeneratorCache::new(
        loader,
        CacheOptions::from_settings(&settings.generators),
    ));
    let resolver = Arc::new(Resolver::new(Arc::clone(&cache)));

    let finder = Arc::new(GeneratorSearch::new(&settings.search)?);
    let renderer = Renderer::new(settings.generators.request_timeout())?;
    let gate = RateLimitGate::new();
    let pipeline = Pipeline::new(Arc::clone(&resolver), finder, renderer, gate.clone());

    let server_state = Arc::new(ServerState {
        discord_configured: true,
        resolver: settings.gateway.api_enabled.then(|| Arc::clone(&resolver)),
    });
    let state = Arc::new(AppState::new(settings, pipeline, gate));

    let mut client = start_discord_bot(&token, Arc::clone(&state)).await?;
    let mut discord_task = tokio::spawn(async move { client.start().await });
    info!("Discord bot started");

    let result: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        result = server::run(server_state, &bind_addr) => result,
        joined = &mut discord_task => {
            let reason = match joined {
                Ok(Ok(())) => "connection closed".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };
            error!("Discord client error: {}", reason);
            Err(DiscordError::Stopped(reason).into())
        }
        () = state.shutdown_requested() => {
            info!("Restart requested, shutting down");
            Ok(())
        }
    };

    discord_task.abort();
    cache.clear().await;
    host.shutdown().await;

    result
}
