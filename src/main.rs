use anyhow::Context;
use api_versioned::api::{ApiHandlers, AppState};
use api_versioned::versioning::VersionedRouterBuilder;
use api_versioned::VersioningConfig;
use axum::extract::Request;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_ADDRESS: &str = "0.0.0.0:3001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_versioned=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = VersioningConfig::from_env_or_disabled();
    tracing::info!(
        enabled = config.enabled,
        header = %config.header,
        rewrite_policy = %config.rewrite_policy,
        "Loaded versioning configuration"
    );

    let router = VersionedRouterBuilder::<AppState>::new(config)
        .source(&ApiHandlers)
        .catalog("/versions")
        .build_with_state(AppState::seeded())
        .context("Could not build the versioned router")?;

    let app = ServiceBuilder::new()
        .layer(CorsLayer::permissive())
        .service(router);

    let address = std::env::var("APP_ADDRESS").unwrap_or_else(|_| DEFAULT_ADDRESS.to_string());
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Could not bind TcpListener to {address}"))?;

    tracing::debug!(
        "listening on {}",
        listener
            .local_addr()
            .context("Could not convert listener address to local address")?
    );

    axum::serve(listener, axum::ServiceExt::<Request>::into_make_service(app))
        .await
        .context("Could not successfully serve")?;

    Ok(())
}
