use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use docshare::access::payout::PaymentSchedule;
use docshare::access::{AccessMode, ServableReference};
use docshare::auth::jwt::JwtService;
use docshare::captcha::CaptchaVerifier;
use docshare::config::AppConfig;
use docshare::db::{self, PgPool};
use docshare::models::{
    Document, NewCenter, NewCountry, NewDocument, NewStudentStudy, NewUpload, NewUser, User,
    UserBan, RENDERABLE_CONTENT_TYPE,
};
use docshare::render::RenderService;
use docshare::schema::{centers, countries, documents, student_studies, uploads, user_bans, users};
use docshare::state::{AppState, Services};
use docshare::storage::{BlobLocation, ObjectStorage};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub const MEDIA_BUCKET: &str = "media-bucket";
pub const PUBLIC_BUCKET: &str = "public-bucket";
pub const CAPTCHA_SECRET: &str = "test-captcha-secret";
/// Token the fake verifier accepts.
pub const VALID_CAPTCHA: &str = "solved-captcha";
pub const COUNTRY_ID: i32 = 1;
pub const CENTER_ID: i32 = 1;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<BlobLocation, Vec<u8>>>,
    copies: AtomicUsize,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn exists(&self, location: &BlobLocation) -> Result<bool> {
        Ok(self.objects.lock().await.contains_key(location))
    }

    async fn copy_object(
        &self,
        source: &BlobLocation,
        destination: &BlobLocation,
        _content_type: &str,
    ) -> Result<()> {
        let mut guard = self.objects.lock().await;
        let bytes = guard
            .get(source)
            .cloned()
            .ok_or_else(|| anyhow!("object {source} missing"))?;
        guard.insert(destination.clone(), bytes);
        self.copies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_object(&self, location: &BlobLocation) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(location)
            .cloned()
            .ok_or_else(|| anyhow!("object {location} missing"))
    }

    fn public_url(&self, location: &BlobLocation) -> String {
        format!("https://fake-storage/{}/{}", location.bucket, location.key)
    }
}

impl FakeStorage {
    pub async fn put(&self, location: BlobLocation, bytes: &[u8]) {
        self.objects.lock().await.insert(location, bytes.to_vec());
    }

    #[allow(dead_code)]
    pub async fn contains(&self, location: &BlobLocation) -> bool {
        self.objects.lock().await.contains_key(location)
    }

    #[allow(dead_code)]
    pub fn copy_count(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeRender {
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeRender {
    #[allow(dead_code)]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderService for FakeRender {
    async fn render(
        &self,
        document_id: Uuid,
        mode: AccessMode,
        _premium: bool,
    ) -> Result<ServableReference> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("render service unavailable"));
        }
        Ok(ServableReference::new(format!(
            "https://render.test/{}/{document_id}",
            mode.render_action()
        )))
    }

    async fn thumbnail(&self, document_id: Uuid) -> Result<ServableReference> {
        Ok(ServableReference::new(format!(
            "https://render.test/thumbnail/{document_id}"
        )))
    }
}

pub struct FakeVerifier;

#[async_trait]
impl CaptchaVerifier for FakeVerifier {
    async fn verify(&self, secret: &str, token: &str, _client_ip: Option<&str>) -> Result<bool> {
        Ok(secret == CAPTCHA_SECRET && token == VALID_CAPTCHA)
    }
}

/// Seed for a user row; every account lives in the seeded country.
pub struct UserSeed {
    pub nickname: &'static str,
    pub role: &'static str,
    pub captcha_counter: i32,
    pub premium_downloads: i32,
    pub with_study: bool,
}

impl UserSeed {
    pub fn reader(nickname: &'static str) -> Self {
        Self {
            nickname,
            role: "user",
            captcha_counter: 5,
            premium_downloads: 0,
            with_study: false,
        }
    }

    pub fn owner(nickname: &'static str) -> Self {
        Self {
            with_study: true,
            ..Self::reader(nickname)
        }
    }

    #[allow(dead_code)]
    pub fn admin(nickname: &'static str) -> Self {
        Self {
            role: "admin",
            ..Self::reader(nickname)
        }
    }
}

/// Seed for a document; `store_original` puts its bytes in the media bucket.
pub struct DocumentSeed {
    pub filename: &'static str,
    pub content_type: &'static str,
    pub downloads: i32,
    pub pages: i32,
    pub corrupt: i32,
    pub store_original: bool,
}

impl DocumentSeed {
    pub fn pdf() -> Self {
        Self {
            filename: "constitutional-law.pdf",
            content_type: RENDERABLE_CONTENT_TYPE,
            downloads: 5,
            pages: 30,
            corrupt: 0,
            store_original: true,
        }
    }
}

pub struct SeededDocument {
    pub id: Uuid,
    #[allow(dead_code)]
    pub upload_id: Uuid,
    #[allow(dead_code)]
    pub filename: &'static str,
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    renderer: Arc<FakeRender>,
}

impl TestApp {
    /// Builds the app against `TEST_DATABASE_URL`, or returns `None` when it
    /// is not set so database-backed flows are skipped.
    pub async fn new() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping database-backed test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "eu-west-1".to_string(),
            media_bucket: MEDIA_BUCKET.to_string(),
            public_bucket: PUBLIC_BUCKET.to_string(),
            public_base_url: None,
            render_endpoint: "http://render.invalid".to_string(),
            captcha_secret_keys: vec![CAPTCHA_SECRET.to_string()],
            captcha_verify_url: "http://captcha.invalid".to_string(),
            payment_config_path: None,
            boosts_config_key: "config/money-boosts.json".to_string(),
            upstream_timeout_seconds: 1,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let renderer = Arc::new(FakeRender::default());
        let services = Services {
            storage: storage.clone(),
            renderer: renderer.clone(),
            captcha: Arc::new(FakeVerifier),
        };
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool, config, services, PaymentSchedule::default(), jwt);
        let router = docshare::routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            router,
            storage,
            renderer,
        }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(|conn| truncate_all(conn)).await
    }

    /// Makes every payout insert fail until the next cleanup, so a request
    /// errors after the usage ledger has already written its rows.
    #[allow(dead_code)]
    pub async fn reject_payouts(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.batch_execute(
                "CREATE OR REPLACE FUNCTION reject_payout() RETURNS trigger AS $$ \
                 BEGIN RAISE EXCEPTION 'payouts are frozen'; END; $$ LANGUAGE plpgsql; \
                 CREATE TRIGGER reject_payouts BEFORE INSERT ON payouts \
                 FOR EACH ROW EXECUTE FUNCTION reject_payout();",
            )
            .context("failed to install payout trigger")
        })
        .await
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn renderer(&self) -> Arc<FakeRender> {
        self.renderer.clone()
    }

    pub fn token(&self, user_id: Uuid) -> Result<String> {
        self.state.jwt.generate_token(user_id, "user")
    }

    pub async fn insert_user(&self, seed: UserSeed) -> Result<Uuid> {
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                nickname: seed.nickname.to_string(),
                role: seed.role.to_string(),
                country_id: Some(COUNTRY_ID),
                money: Decimal::ZERO,
                accumulated: Decimal::ZERO,
                premium_downloads: seed.premium_downloads,
                captcha_counter: seed.captcha_counter,
            };
            diesel::insert_into(users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;

            if seed.with_study {
                diesel::insert_into(student_studies::table)
                    .values(&NewStudentStudy {
                        id: Uuid::new_v4(),
                        user_id: user.id,
                        center_id: CENTER_ID,
                        is_default: true,
                    })
                    .execute(conn)
                    .context("failed to insert study")?;
            }
            Ok(user.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn ban(&self, user_id: Uuid, global_ban: bool, download_ban: bool) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(user_bans::table)
                .values(&UserBan {
                    user_id,
                    download_ban,
                    upload_ban: false,
                    global_ban,
                })
                .execute(conn)
                .context("failed to insert ban")?;
            Ok(())
        })
        .await
    }

    pub async fn insert_document(
        &self,
        owner_id: Option<Uuid>,
        seed: DocumentSeed,
    ) -> Result<SeededDocument> {
        let directory = "2024/03";
        let filename = seed.filename;
        let store_original = seed.store_original;
        let seeded = self
            .with_conn(move |conn| {
                let upload_id = Uuid::new_v4();
                diesel::insert_into(uploads::table)
                    .values(&NewUpload {
                        id: upload_id,
                        owner_id,
                        title: "Constitutional law notes".to_string(),
                    })
                    .execute(conn)
                    .context("failed to insert upload")?;

                let extension = filename.rsplit('.').next().unwrap_or_default().to_string();
                let document = NewDocument {
                    id: Uuid::new_v4(),
                    owner_id,
                    upload_id,
                    center_id: CENTER_ID,
                    name: "Constitutional law notes".to_string(),
                    directory: directory.to_string(),
                    filename: filename.to_string(),
                    extension,
                    content_type: seed.content_type.to_string(),
                    pages: seed.pages,
                    monetizable: true,
                    corrupt: seed.corrupt,
                    downloads: seed.downloads,
                };
                diesel::insert_into(documents::table)
                    .values(&document)
                    .execute(conn)
                    .context("failed to insert document")?;

                Ok(SeededDocument {
                    id: document.id,
                    upload_id,
                    filename,
                })
            })
            .await?;

        if store_original {
            let original = BlobLocation::new(
                MEDIA_BUCKET,
                format!("media/docs/{directory}/{filename}"),
            );
            self.storage.put(original, b"%PDF-1.7 test").await;
        }
        Ok(seeded)
    }

    pub async fn document(&self, document_id: Uuid) -> Result<Document> {
        self.with_conn(move |conn| {
            documents::table
                .find(document_id)
                .first::<Document>(conn)
                .context("failed to load document")
        })
        .await
    }

    pub async fn user(&self, user_id: Uuid) -> Result<User> {
        self.with_conn(move |conn| {
            users::table
                .find(user_id)
                .first::<User>(conn)
                .context("failed to load user")
        })
        .await
    }

    /// Runs a single-row count query such as `SELECT COUNT(*) AS count ...`.
    pub async fn count(&self, sql: &'static str, document_id: Uuid) -> Result<i64> {
        #[derive(QueryableByName)]
        struct Count {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            count: i64,
        }

        self.with_conn(move |conn| {
            let row = diesel::sql_query(sql)
                .bind::<diesel::sql_types::Uuid, _>(document_id)
                .get_result::<Count>(conn)
                .context("failed to run count query")?;
            Ok(row.count)
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn delete_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::DELETE, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_json(response: hyper::Response<Body>) -> Result<serde_json::Value> {
    let collected = response
        .into_body()
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(serde_json::from_slice(&collected.to_bytes())?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        seed_geography(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "DROP TRIGGER IF EXISTS reject_payouts ON payouts; \
         TRUNCATE TABLE access_events, access_records, payouts, popularity_events, reactions, \
         shares, share_blocks, student_studies, user_bans, documents, discussions, uploads, \
         users, centers, countries RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}

fn seed_geography(conn: &mut PgConnection) -> Result<()> {
    diesel::insert_into(countries::table)
        .values(&NewCountry {
            id: COUNTRY_ID,
            name: "Spain".to_string(),
            download_coefficient: Decimal::ONE,
        })
        .execute(conn)
        .context("failed to insert country")?;
    diesel::insert_into(centers::table)
        .values(&NewCenter {
            id: CENTER_ID,
            name: "Faculty of Law".to_string(),
            country_id: COUNTRY_ID,
            city_id: Some(10),
            university_id: Some(100),
        })
        .execute(conn)
        .context("failed to insert center")?;
    Ok(())
}
