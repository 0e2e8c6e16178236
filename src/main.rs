use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

use docshare::{
    access::payout::PaymentSchedule,
    auth::jwt::JwtService,
    captcha::RecaptchaVerifier,
    config::AppConfig,
    db,
    render::HttpRenderService,
    routes,
    s3::build_client,
    state::{AppState, Services},
    storage::S3Storage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        media_bucket = %config.media_bucket,
        public_bucket = %config.public_bucket,
        captcha_secrets = config.captcha_secret_keys.len(),
        "loaded docshare configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let timeout = Duration::from_secs(config.upstream_timeout_seconds);
    let s3_client = build_client(&config).await?;
    let services = Services {
        storage: Arc::new(S3Storage::new(s3_client, config.public_base_url.clone())),
        renderer: Arc::new(HttpRenderService::new(&config.render_endpoint, timeout)?),
        captcha: Arc::new(RecaptchaVerifier::new(
            config.captcha_verify_url.clone(),
            timeout,
        )?),
    };
    let payments = PaymentSchedule::load(config.payment_config_path.as_deref())?;
    let jwt = JwtService::from_config(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    let state = AppState::new(pool, config, services, payments, jwt);
    let app = routes::create_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("api received shutdown signal");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
