use warden::{
    authz::seed_defaults, build_store, create_router, init_tracing, shutdown_telemetry, AppState,
    Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    init_tracing(&config);

    info!(
        service = "warden",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        backend = ?config.database.backend,
        "Starting server"
    );

    for issue in config.validate_for_production() {
        warn!(issue = %issue, "Configuration warning");
    }

    let store = build_store(&config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to create database pool");
        std::process::exit(1);
    });

    if config.security.seed_on_startup {
        match seed_defaults(store.as_ref(), &config.security.default_organization_name) {
            Ok(report) if report.is_noop() => info!("Seed data already present"),
            Ok(report) => info!(
                permissions = report.permissions_created,
                roles = report.roles_created,
                organization = report.organization_created,
                "Seeded defaults"
            ),
            Err(e) => {
                error!(error = %e, "Seeding failed");
                std::process::exit(1);
            }
        }
    }

    let state = AppState::new(store, &config);
    let app = create_router(state, &config);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, address = %addr, "Failed to bind HTTP server");
            std::process::exit(1);
        });

    info!(
        address = %addr,
        docs_url = %format!("http://{}/swagger-ui", addr),
        "HTTP server ready"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = result {
        error!(error = %e, "HTTP server error");
    }

    shutdown_telemetry();
    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
