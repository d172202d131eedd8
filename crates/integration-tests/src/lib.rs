//! Integration test harness for Studyforge.
//!
//! Each [`TestApp`] serves the real router on an ephemeral port, backed by
//! in-memory stores, an in-memory cookie session store, an outbox mailer and
//! a canned curriculum generator.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p studyforge-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Client;
use secrecy::SecretString;
use serde_json::{Value, json};

use studyforge_core::{AdminPermissions, AdminUserId, Difficulty, Email, LearnerId, Username};
use studyforge_server::config::AuthSettings;
use studyforge_server::db::memory::MemoryDb;
use studyforge_server::db::{AdminUserStore, LearnerStore, Stores};
use studyforge_server::models::{
    AdminUser, Learner, NewAdminUser, NewLearner, NewVerificationTicket,
};
use studyforge_server::services::auth::password::{Argon2Hasher, CredentialHasher};
use studyforge_server::services::curriculum::{CurriculumError, CurriculumGenerator};
use studyforge_server::services::email::OutboxMailer;
use studyforge_server::state::{AppState, Collaborators};

/// Password used for every seeded account.
pub const PASSWORD: &str = "S3cure!pass";

/// Three tasks over two weeks.
pub const CANNED_OUTLINE: &str = r#"Here is your plan:
[
  {"week": 1, "title": "Basics", "tasks": ["Install the toolchain", "Hello world"]},
  {"week": 2, "title": "Ownership", "tasks": ["Read the ownership chapter"]}
]"#;

struct CannedGenerator;

impl CurriculumGenerator for CannedGenerator {
    fn generate<'a>(
        &'a self,
        _topic: &'a str,
        _duration: &'a str,
        _difficulty: Difficulty,
    ) -> BoxFuture<'a, Result<String, CurriculumError>> {
        futures::future::ready(Ok(CANNED_OUTLINE.to_owned())).boxed()
    }
}

/// A running server plus handles into its state.
pub struct TestApp {
    pub base_url: String,
    pub state: AppState,
    pub outbox: OutboxMailer,
    db: MemoryDb,
    hasher: Arc<Argon2Hasher>,
}

impl TestApp {
    /// Serve with e-mail verification required.
    pub async fn spawn() -> Self {
        Self::spawn_with(AuthSettings::default()).await
    }

    pub async fn spawn_with(settings: AuthSettings) -> Self {
        let hasher = Arc::new(Argon2Hasher::for_tests().unwrap());
        let outbox = OutboxMailer::new();
        let db = MemoryDb::new();
        let state = AppState::assemble(
            settings,
            Stores::from_memory(&db),
            Collaborators {
                hasher: hasher.clone(),
                mailer: Arc::new(outbox.clone()),
                generator: Arc::new(CannedGenerator),
            },
        );

        let app = studyforge_server::app(
            state.clone(),
            tower_sessions::MemoryStore::default(),
            None,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            outbox,
            db,
            hasher,
        }
    }

    /// A fresh client with its own cookie jar.
    #[must_use]
    pub fn client(&self) -> Client {
        Client::builder().cookie_store(true).build().unwrap()
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn seed_admin(&self, username: &str, permissions: AdminPermissions) -> AdminUser {
        self.state
            .stores()
            .admins
            .create(&NewAdminUser {
                username: Username::parse(username).unwrap(),
                email: Email::parse(&format!("{username}@staff.example.com")).unwrap(),
                full_name: format!("{username} admin"),
                password_hash: self.hasher.hash(PASSWORD).unwrap(),
                permissions,
            })
            .await
            .unwrap()
    }

    /// An active learner with a verified ticket.
    pub async fn seed_learner(&self, username: &str) -> Learner {
        let (learner, _) = self
            .state
            .stores()
            .learners
            .create(
                &NewLearner {
                    username: Username::parse(username).unwrap(),
                    email: Email::parse(&format!("{username}@example.com")).unwrap(),
                    first_name: "Test".to_owned(),
                    last_name: "Learner".to_owned(),
                    password_hash: self.hasher.hash(PASSWORD).unwrap(),
                    is_active: true,
                },
                &NewVerificationTicket::verified(Utc::now()),
            )
            .await
            .unwrap();
        learner
    }

    pub async fn learner_exists(&self, id: LearnerId) -> bool {
        self.state
            .stores()
            .learners
            .find_by_id(id)
            .await
            .unwrap()
            .is_some()
    }

    /// POST `/api/auth/login` and return status and body.
    pub async fn login(
        &self,
        client: &Client,
        identifier: &str,
        password: &str,
    ) -> (reqwest::StatusCode, Value) {
        self.post_json(
            client,
            "/api/auth/login",
            &json!({ "identifier": identifier, "password": password }),
        )
        .await
    }

    pub async fn post_json(
        &self,
        client: &Client,
        path: &str,
        body: &Value,
    ) -> (reqwest::StatusCode, Value) {
        let resp = client.post(self.url(path)).json(body).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    pub async fn get_json(&self, client: &Client, path: &str) -> (reqwest::StatusCode, Value) {
        let resp = client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    /// Admin sessions for `admin` not yet revoked.
    #[must_use]
    pub fn active_admin_sessions(&self, admin: AdminUserId) -> usize {
        self.db.active_sessions(admin)
    }

    /// Generate the canned two-week curriculum for a logged-in learner and return its id.
    pub async fn generate_curriculum(&self, client: &Client) -> i64 {
        let (_, body) = self
            .post_json(
                client,
                "/api/curricula",
                &json!({ "topic": "Rust", "duration": 2 }),
            )
            .await;
        body["curriculum"]["id"].as_i64().unwrap()
    }

    /// The token of the most recent verification mail.
    #[must_use]
    pub fn last_verification_token(&self) -> String {
        let sent = self.outbox.sent();
        let link = &sent.last().unwrap().link;
        link.rsplit('/').next().unwrap().to_owned()
    }
}
