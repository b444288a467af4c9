use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use enterprise_auth::{
    auth::{
        AuthService, InMemoryStore, PasswordService, PgStore, Repositories, RoleCatalog,
        TokenSweeper,
    },
    clock::{Clock, SystemClock},
    config::AuthConfig,
    db,
    routes::create_router,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Enterprise Auth - Starting...");

    // Fails fast when JWT_SECRET is missing or a numeric option is malformed
    let config = AuthConfig::from_env()?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let repositories = match std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()) {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(&database_url).await?;
            db::run_migrations(&pool).await?;
            Repositories::from_store(Arc::new(PgStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            let store = InMemoryStore::with_catalog(&RoleCatalog::default_catalog()).await?;
            Repositories::from_store(Arc::new(store))
        }
    };

    TokenSweeper::from_config(repositories.refresh_tokens.clone(), clock.clone(), &config)
        .spawn();

    let service = AuthService::new(
        repositories,
        Arc::new(PasswordService::new()),
        clock,
        &config,
    )?;

    let app = create_router(Arc::new(service));

    let addr = format!("{}:{}", host, port);
    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Enterprise Auth is running on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
