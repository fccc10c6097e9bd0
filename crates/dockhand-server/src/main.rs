use std::sync::Arc;

use tracing::info;

use dockhand_common::HostDescriptor;
use dockhand_server::{create_app, AppState, HostRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dockhand_server=debug,dockhand_backend=debug".into()),
        )
        .init();

    let registry = match std::env::var("DOCKHAND_HOSTS") {
        Ok(path) => HostRegistry::load_file(&path)?,
        Err(_) => {
            // No host file: manage the local engine only.
            let registry = HostRegistry::new();
            registry.register(HostDescriptor::local("local"));
            registry
        }
    };

    let state = AppState {
        registry: Arc::new(registry),
    };
    let app = create_app(state);

    let addr = std::env::var("DOCKHAND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    info!(%addr, "dockhand listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
