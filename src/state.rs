use std::sync::Arc;

use crate::{
    access::payout::PaymentSchedule,
    access::resolver::StorageLayout,
    auth::jwt::JwtService,
    captcha::CaptchaVerifier,
    config::AppConfig,
    db::{PgPool, PgPooledConnection},
    error::{AppError, AppResult},
    render::RenderService,
    storage::ObjectStorage,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub renderer: Arc<dyn RenderService>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub payments: Arc<PaymentSchedule>,
    pub layout: Arc<StorageLayout>,
    pub jwt: JwtService,
}

/// External collaborators of the access pipeline.
pub struct Services {
    pub storage: Arc<dyn ObjectStorage>,
    pub renderer: Arc<dyn RenderService>,
    pub captcha: Arc<dyn CaptchaVerifier>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        services: Services,
        payments: PaymentSchedule,
        jwt: JwtService,
    ) -> Self {
        let layout = StorageLayout::new(&config.media_bucket, &config.public_bucket);
        Self {
            pool,
            config: Arc::new(config),
            storage: services.storage,
            renderer: services.renderer,
            captcha: services.captcha,
            payments: Arc::new(payments),
            layout: Arc::new(layout),
            jwt,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
