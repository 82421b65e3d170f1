use clap::Parser;
use medheart_server::{
    app::build_router,
    auth::{AuthPolicy, AuthService, CredentialHasher, TokenCodec},
    cli::{Cli, Commands, SessionCommands},
    config::ServerConfig,
    state::ServerState,
    storage::{PostgresSessionStore, PostgresUserStore, SessionStore, UserStore},
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medheart_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .max_lifetime(config.db_max_lifetime())
        .idle_timeout(config.db_idle_timeout())
        .acquire_timeout(config.db_acquire_timeout())
        .connect(&config.database_url)
        .await?;

    // Users first, sessions reference them
    let user_store = PostgresUserStore::new(pool.clone());
    user_store.initialize().await?;

    let session_store = PostgresSessionStore::new(pool.clone());
    session_store.initialize().await?;

    let user_store: Arc<dyn UserStore> = Arc::new(user_store);
    let session_store: Arc<dyn SessionStore> = Arc::new(session_store);

    let auth = Arc::new(AuthService::new(
        user_store.clone(),
        session_store,
        TokenCodec::new(config.jwt_secret.as_bytes()),
        CredentialHasher::new(),
        AuthPolicy {
            max_failed_attempts: config.max_failed_login_attempts,
            session_lifetime: config.session_lifetime(),
        },
    ));

    match cli.command {
        Some(Commands::User(cmd)) => return cmd.execute(pool).await,
        Some(Commands::Sessions(SessionCommands::Prune)) => {
            let removed = auth.prune_expired_sessions().await?;
            println!("Removed {} expired sessions.", removed);
            return Ok(());
        }
        Some(Commands::Serve) | None => {}
    }

    info!("Starting MedHeart Server v{}", VERSION);
    info!("Configuration loaded: {:?}", config);

    if config.session_cleanup_interval_seconds > 0 {
        let auth = auth.clone();
        let every = Duration::from_secs(config.session_cleanup_interval_seconds);
        tokio::spawn(async move {
            let mut interval = time::interval(every);
            loop {
                interval.tick().await;
                match auth.prune_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => info!("Cleaned up {} expired sessions", removed),
                    Err(e) => error!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    let state = Arc::new(ServerState::new(config.clone(), auth, user_store));
    let app = build_router(state);

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
