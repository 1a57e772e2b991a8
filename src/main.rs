use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pictodo::api::router;
use pictodo::app::{AppOptions, TodoApp};
use pictodo::backend::{Backend, InMemoryBackend, SupabaseClient};
use pictodo::config::{BackendKind, ClientConfig};
use pictodo::error::AppError;
use pictodo::state::AppState;
use pictodo::view::Renderer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "pictodo=debug,tower_http=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::new_from_env()?;
    let backend = build_backend(&config)?;

    let app = Arc::new(TodoApp::new(backend, AppOptions::from(&config)));
    let state = AppState {
        app: app.clone(),
        renderer: Arc::new(Renderer::new()?),
        max_upload_bytes: config.max_upload_bytes,
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app.close().await;
    Ok(())
}

fn build_backend(config: &ClientConfig) -> Result<Backend, AppError> {
    match config.backend {
        BackendKind::Supabase => {
            let supabase = config
                .supabase
                .clone()
                .ok_or_else(|| AppError::Config("Supabase settings are missing".to_string()))?;
            info!("Using Supabase backend at {}", supabase.url);
            Ok(Backend::from_service(Arc::new(SupabaseClient::new(supabase)?)))
        }
        BackendKind::Memory => {
            let mut memory = InMemoryBackend::new();
            match &config.demo_account {
                Some(account) => {
                    info!("Using in-memory backend with account {}", account.email);
                    memory = memory.with_user(&account.email, &account.password);
                }
                None => warn!("Using in-memory backend without DEMO_EMAIL/DEMO_PASSWORD, nobody can sign in"),
            }
            Ok(Backend::from_service(Arc::new(memory)))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
