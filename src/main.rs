use std::sync::Arc;

use compliance_checker::{
    cache::NullHookCache,
    config::AppConfig,
    hook::ComplianceHook,
    http::{self, AppState},
};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let hook = ComplianceHook::from_config(&config.compliance)?;
    info!(
        endpoint = %config.compliance.endpoint_url,
        model = %config.compliance.model,
        failure_policy = %config.compliance.failure_policy,
        timeout_sec = config.compliance.request_timeout.as_secs(),
        "compliance hook configured"
    );

    let app = http::router(AppState {
        hook: Arc::new(hook),
        cache: Arc::new(NullHookCache),
        failure_policy: config.compliance.failure_policy,
    });
    let listener = TcpListener::bind(config.http_bind).await?;
    info!("compliance checker listening on {}", config.http_bind);

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();
}
