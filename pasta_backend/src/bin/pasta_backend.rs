use anyhow::{Context, Result};
use pasta_backend::config::ServiceConfig;
use pasta_backend::runtime::BackendRuntime;
use pasta_backend::server::serve_backend;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pasta_backend=debug")),
        )
        .init();

    let config = ServiceConfig::load();
    let server_rt = tokio::runtime::Runtime::new().context("failed to start server runtime")?;
    server_rt.block_on(async {
        let runtime = BackendRuntime::bootstrap(config)
            .await
            .context("failed to bootstrap backend runtime")?;

        tracing::info!(
            "Starting PASTA backend (set GROQ_API_KEY + FIRESTORE_PROJECT_ID, optional PASTA_BACKEND_BIND; PASTA_STORE=memory for offline runs)"
        );
        serve_backend(runtime).await
    })
}
