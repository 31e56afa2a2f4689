use blog_backend::{build_state, config::Config, configure_routes, init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);
    let config = config.with_app_properties();

    tracing::info!(
        environment = %config.environment,
        timezone = %config.timezone,
        features = ?config.features,
        app_properties = ?config.app_properties,
        database = %config.database.location(),
        "Starting blog API"
    );

    let listen_addr = config.listen_addr;
    let state = build_state(config).await?;
    let app = configure_routes(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("Listening on {}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last handle to the pool; its connections are gone now.
    tracing::info!("Database connections closed, bye");
    Ok(())
}
