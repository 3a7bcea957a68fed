//! HTTP surface.

pub mod routes;
pub mod types;

use std::sync::Arc;

use crate::config::Config;

pub use routes::AppState;

/// Bind and serve until the process is stopped.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config));

    // Background TTL sweep over the search cache.
    let _sweeper = state.memory.spawn_sweeper();

    let app = routes::router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "agent relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}
