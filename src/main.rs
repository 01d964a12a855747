use std::sync::Arc;

use dotenvy::dotenv;
use paimon_relay::config::Settings;
use paimon_relay::providers::{ProviderKind, ProviderRegistry, mega::MegaProvider};
use paimon_relay::{AppState, create_app};
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let settings = Settings::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "paimon_relay={0},tower_http={0}",
                    settings.log_level
                ))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Paimon Cloud Storage relay");

    tokio::fs::create_dir_all(&settings.temp_upload_dir).await?;
    info!(
        "Temporary upload directory: {}",
        settings.temp_upload_dir.display()
    );

    let mut registry = ProviderRegistry::new();
    match (&settings.mega_email, &settings.mega_password) {
        (Some(email), Some(password)) => {
            let provider = MegaProvider::new(email.clone(), password.clone())?;
            registry.register(ProviderKind::Mega, Arc::new(provider));
            info!("MEGA provider registered");
        }
        _ => warn!("MEGA credentials not configured; upload requests will be rejected"),
    }

    let settings = Arc::new(settings);
    let state = AppState {
        settings: settings.clone(),
        providers: Arc::new(registry),
    };

    let app = create_app(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        info!(
                            "Finished in {:?} with status {}",
                            latency,
                            response.status()
                        );
                    },
                ),
        )
        .layer(CorsLayer::permissive())
        .layer(axum::extract::DefaultBodyLimit::max(settings.max_file_size));

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown...");
        },
    }
}
