//! Sentinel Authentication server
//!
//! Runs the authentication routes over Postgres-backed credentials and an
//! in-process keyed store.

use sentinel_auth::{
    create_routes, Argon2Hasher, AuthConfig, AuthService, LogMailSender, MemoryStore,
    PgCredentialStore,
};

use axum::http::{header, HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AuthConfig::from_env()?;
    config.validate()?;

    let database_url =
        env::var("DATABASE_URL").map_err(|_| "DATABASE_URL environment variable is required")?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    let credentials = PgCredentialStore::new(pool, Argon2Hasher::from_config(&config)?);
    credentials.migrate().await?;

    let cors = CorsLayer::new()
        .allow_origin(config.app_url.parse::<HeaderValue>()?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let store = Arc::new(MemoryStore::new());
    spawn_purge(store.clone());

    let auth = Arc::new(AuthService::new(
        config.clone(),
        store,
        Arc::new(credentials),
        Arc::new(LogMailSender::new(config.app_url.clone())),
    ));

    let app = create_routes(auth)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Sentinel authentication server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down (ctrl-c)...");
        }
    })
    .await?;

    Ok(())
}

/// Drop expired keys from the in-process store once a minute
fn spawn_purge(store: Arc<MemoryStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Expired store keys purged");
            }
        }
    });
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
