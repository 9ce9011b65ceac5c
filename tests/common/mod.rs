// Shared by every integration test binary; each uses a subset.
#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

use registrar::auth::jwt::JwtService;
use registrar::auth::password;
use registrar::clock::FixedClock;
use registrar::config::AppConfig;
use registrar::db::{self, PgPool};
use registrar::models::{NewStaff, NewStudent};
use registrar::routes;
use registrar::state::AppState;
use registrar::storage::ObjectStorage;
use registrar::workflow::TransitionTable;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Instant the test clock is pinned to; "today" in aggregation tests.
pub fn test_now() -> DateTime<Utc> {
    "2025-03-14T09:30:00Z".parse().expect("valid test instant")
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let guard = self.objects.lock().await;
        guard
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }
}

impl FakeStorage {
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

pub struct AttachmentUpload<'a> {
    pub filename: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
    pub requirement_type_id: i32,
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

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
            storage_dir: "unused-in-tests".to_string(),
        };

        let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;
        let transitions = prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let jwt = JwtService::from_config(&config)?;
        let clock = Arc::new(FixedClock(test_now()));
        let state = AppState::new(pool.clone(), config, storage_for_state, jwt, clock, transitions);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(|conn| truncate_all(conn)).await
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub async fn insert_student(
        &self,
        id: &str,
        firstname: &str,
        lastname: &str,
        password: &str,
    ) -> Result<()> {
        let id = id.to_string();
        let firstname = firstname.to_string();
        let lastname = lastname.to_string();
        let password = password.to_string();
        self.with_conn(move |conn| {
            use registrar::schema::{roles, students};

            let role_id: i32 = roles::table
                .filter(roles::name.eq("Student"))
                .select(roles::id)
                .first(conn)
                .context("Student role missing")?;

            diesel::insert_into(students::table)
                .values(&NewStudent {
                    id,
                    firstname,
                    lastname,
                    password_hash: password::hash_password(&password)?,
                    role_id,
                })
                .execute(conn)
                .context("failed to insert student")?;
            Ok(())
        })
        .await
    }

    pub async fn insert_staff(&self, id: &str, password: &str, role: &str) -> Result<()> {
        let id = id.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            use registrar::schema::{roles, staff};

            let role_id: i32 = roles::table
                .filter(roles::name.eq(&role))
                .select(roles::id)
                .first(conn)
                .with_context(|| format!("role {role} missing"))?;

            diesel::insert_into(staff::table)
                .values(&NewStaff {
                    id: id.clone(),
                    firstname: "Test".to_string(),
                    lastname: "Registrar".to_string(),
                    email: format!("{id}@school.test"),
                    password_hash: password::hash_password(&password)?,
                    role_id,
                })
                .execute(conn)
                .context("failed to insert staff")?;
            Ok(())
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    pub async fn document_type_id(&self, name: &str) -> Result<i32> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            use registrar::schema::document_types;
            document_types::table
                .filter(document_types::name.eq(&name))
                .select(document_types::id)
                .first(conn)
                .with_context(|| format!("document type {name} missing"))
        })
        .await
    }

    pub async fn insert_requirement_type(&self, name: &str) -> Result<i32> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            use registrar::schema::requirement_types;
            diesel::insert_into(requirement_types::table)
                .values(requirement_types::name.eq(&name))
                .returning(requirement_types::id)
                .get_result(conn)
                .context("failed to insert requirement type")
        })
        .await
    }

    pub async fn delete_requirement_type(&self, id: i32) -> Result<()> {
        self.with_conn(move |conn| {
            use registrar::schema::requirement_types;
            diesel::delete(requirement_types::table.find(id))
                .execute(conn)
                .context("failed to delete requirement type")?;
            Ok(())
        })
        .await
    }

    pub async fn requirement_type_id(&self, name: &str) -> Result<i32> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            use registrar::schema::requirement_types;
            requirement_types::table
                .filter(requirement_types::name.eq(&name))
                .select(requirement_types::id)
                .first(conn)
                .with_context(|| format!("requirement type {name} missing"))
        })
        .await
    }

    pub async fn status_id(&self, name: &str) -> Result<i32> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            use registrar::schema::statuses;
            statuses::table
                .filter(statuses::name.eq(&name))
                .select(statuses::id)
                .first(conn)
                .with_context(|| format!("status {name} missing"))
        })
        .await
    }

    pub async fn history_count(&self, request_id: i32) -> Result<i64> {
        self.with_conn(move |conn| {
            use registrar::schema::request_status_history;
            request_status_history::table
                .filter(request_status_history::request_id.eq(request_id))
                .count()
                .get_result(conn)
                .context("failed to count history rows")
        })
        .await
    }

    pub async fn insert_history_row(
        &self,
        request_id: i32,
        status_id: i32,
        created_at: NaiveDateTime,
    ) -> Result<()> {
        self.with_conn(move |conn| {
            use registrar::models::NewStatusHistoryEntry;
            use registrar::schema::request_status_history;

            diesel::insert_into(request_status_history::table)
                .values(&NewStatusHistoryEntry {
                    request_id,
                    status_id,
                    created_at,
                })
                .execute(conn)
                .context("failed to insert history row")?;
            Ok(())
        })
        .await
    }

    /// Creates a request directly through the workflow layer, bypassing
    /// HTTP. Useful for seeding and for backdated rows.
    pub async fn seed_request(
        &self,
        student_id: &str,
        document_type_id: i32,
        purpose: &str,
        created_at: NaiveDateTime,
    ) -> Result<i32> {
        let transitions = self.state.transitions.clone();
        let student_id = student_id.to_string();
        let purpose = purpose.to_string();
        self.with_conn(move |conn| {
            use registrar::workflow::{self, NewRequestSpec};

            workflow::create_request(
                conn,
                &transitions,
                created_at,
                NewRequestSpec {
                    student_id,
                    document_type_id,
                    purpose,
                    attachments: Vec::new(),
                },
            )
            .context("failed to seed request")
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
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

    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::POST).uri(path);
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

    /// Submits a document request as multipart form data, pairing each
    /// attachment with its requirement type in field order.
    pub async fn submit_request(
        &self,
        document_type_id: i32,
        purpose: &str,
        attachments: &[AttachmentUpload<'_>],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();

        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(b"Content-Disposition: form-data; name=\"document_type_id\"\r\n\r\n");
        body.extend(document_type_id.to_string().as_bytes());
        body.extend(b"\r\n");

        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(b"Content-Disposition: form-data; name=\"purpose\"\r\n\r\n");
        body.extend(purpose.as_bytes());
        body.extend(b"\r\n");

        for upload in attachments {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"attachment\"; filename=\"{}\"\r\n",
                    upload.filename
                )
                .as_bytes(),
            );
            body.extend(format!("Content-Type: {}\r\n\r\n", upload.content_type).as_bytes());
            body.extend(upload.bytes);
            body.extend(b"\r\n");

            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(b"Content-Disposition: form-data; name=\"requirement_type_id\"\r\n\r\n");
            body.extend(upload.requirement_type_id.to_string().as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        self.submit_multipart(body, &boundary, token).await
    }

    /// Sends a raw multipart body to the request-creation endpoint.
    /// Lets tests send deliberately malformed field layouts.
    pub async fn submit_multipart(
        &self,
        body: Vec<u8>,
        boundary: &str,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/requests")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;

        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
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

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

async fn prepare_database(pool: &PgPool) -> Result<TransitionTable> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<TransitionTable> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        TransitionTable::load(&mut conn).context("failed to load transition table")
    })
    .await
    .context("migration task panicked")?
}

// Catalog tables (roles, statuses, document/requirement types) are
// reference data seeded by the migration and are left alone.
fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE attachments, request_status_history, requests, students, staff RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
