use std::net::SocketAddr;
use tokio::net::TcpListener;

use lectern_server::auth::jwt::{load_or_generate_jwt_secret, IdentityVerifier};
use lectern_server::config::{generate_config_template, Config};
use lectern_server::{db, routes, session, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lectern_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Lectern server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = load_or_generate_jwt_secret(&config.data_dir)?;
    let verifier = IdentityVerifier::new(jwt_secret, config.token_ttl_secs);

    // Spawn the session loop that owns all room membership
    let sessions = session::spawn_session_loop(config.rooms);

    let app_state = state::AppState {
        db,
        verifier,
        sessions,
    };

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
