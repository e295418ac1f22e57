use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokenkeeper::auth::AuthService;
use tokenkeeper::configuration::get_configuration;
use tokenkeeper::startup::run;
use tokenkeeper::store::MemoryStore;
use tokenkeeper::telemetry::init_telemetry;
use tokenkeeper::users::{InMemoryUserRepository, PgUserRepository, UserRepository};

/// How often expired token records are swept out of the in-memory store
const STORE_REAP_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let users: Arc<dyn UserRepository> = match &configuration.database {
        Some(database) => {
            tracing::info!("Attempting to connect to database");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database.connection_string())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to create connection pool: {}", e);
                    std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "Database connection error",
                    )
                })?;
            tracing::info!("Database connection pool created successfully");
            Arc::new(PgUserRepository::new(pool))
        }
        None => {
            tracing::warn!("No database configured; using an empty in-memory user repository");
            Arc::new(InMemoryUserRepository::new())
        }
    };

    let store = Arc::new(MemoryStore::new());
    let _reaper = store.spawn_reaper(STORE_REAP_INTERVAL);
    let auth = AuthService::new(store, users, &configuration.auth);

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, auth)?.await
}
