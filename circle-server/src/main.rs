use circle_server::{
    config::Settings,
    db::{repositories::{StoryRepository, UserRepository}, Database},
    router::build_router,
    state::AppState,
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Drop expired sessions and stories that expired more than a ttl ago
fn run_cleanup(state: &AppState) {
    match state.session_manager.cleanup_expired_sessions() {
        Ok(count) => {
            if count > 0 {
                tracing::info!("Cleanup: removed {} expired sessions", count);
            }
        }
        Err(e) => {
            tracing::error!("Session cleanup failed: {:#}", e);
        }
    }

    let ttl = chrono::Duration::hours(state.settings.stories.ttl_hours);
    let cutoff = chrono::Utc::now() - ttl;
    if let Err(e) = StoryRepository::new(state.db.pool.clone()).purge_expired(cutoff) {
        tracing::error!("Story purge failed: {:#}", e);
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circle_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load settings
    let settings = Settings::new().expect("Failed to load settings");

    // Initialize database
    let db = Database::new(&settings.database.path).expect("Failed to create database");
    db.initialize()
        .expect("Failed to initialize database schema");
    tracing::info!("Database initialized successfully");

    // Promote the configured admin account, if any
    if let Some(username) = settings.admin.username.as_deref() {
        match UserRepository::new(db.pool.clone()).promote_by_username(username) {
            Ok(0) => tracing::warn!("Admin account '{}' does not exist yet", username),
            Ok(_) => tracing::info!("Granted admin rights to '{}'", username),
            Err(e) => tracing::error!("Failed to promote admin '{}': {:#}", username, e),
        }
    }

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .expect("Failed to parse server address");

    // Create application state
    let state = AppState::new(db, settings);

    // Run initial cleanup on startup
    tracing::info!("Running initial cleanup...");
    run_cleanup(&state);

    // Start background task for periodic cleanup
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            tracing::debug!("Running periodic cleanup...");
            run_cleanup(&cleanup_state);
        }
    });

    let app = build_router(state);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
