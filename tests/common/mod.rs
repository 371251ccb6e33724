//! Shared harness for the integration tests.
//!
//! Every `TestApp` owns a freshly seeded in-memory store and serves the
//! full router on an ephemeral port, so tests never share state.

#![allow(dead_code)]

use std::sync::Arc;

use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

use warden::{
    auth::PasswordService,
    authz::seed_defaults,
    create_router,
    models::{NewOrganization, NewUser},
    store::{MemoryStore, Store},
    AppState, Config,
};

pub const TEST_PASSWORD: &str = "correct horse battery";

/// Role ids as seeded on an empty store.
pub const USER_ROLE: i32 = 1;
pub const ADMIN_ROLE: i32 = 2;
pub const PROJECT_MANAGER_ROLE: i32 = 3;

pub const DEFAULT_ORGANIZATION: i32 = 1;

/// Hashing is the slow part of creating fixtures; every directly inserted
/// user shares this hash of `TEST_PASSWORD`.
static TEST_PASSWORD_HASH: Lazy<String> = Lazy::new(|| {
    PasswordService::hash_password_with_cost(TEST_PASSWORD, 4).expect("hash test password")
});

pub struct TestApp {
    pub client: Client,
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub config: Config,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthBody {
    pub user: UserBody,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserBody {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role_id: Option<i32>,
    pub role_name: Option<String>,
    pub organization_id: Option<i32>,
    pub organization_name: Option<String>,
    pub is_active: bool,
}

/// A logged-in user.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: i32,
    pub username: String,
    pub organization_id: Option<i32>,
    pub token: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = Config::default_for_testing();
        let store = Arc::new(MemoryStore::new());
        seed_defaults(store.as_ref(), &config.security.default_organization_name)
            .expect("seed defaults");

        let state = AppState::new(store.clone(), &config);
        let app = create_router(state, &config);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let port = listener.local_addr().expect("local addr").port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });

        Self {
            client: Client::new(),
            base_url: format!("http://127.0.0.1:{}", port),
            store,
            config,
        }
    }

    pub fn unique_name(prefix: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}_{}", prefix, &suffix[..12])
    }

    pub async fn register(&self, username: &str, password: &str, organization: Option<&str>) -> reqwest::Response {
        let mut body = json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": password,
        });
        if let Some(org) = organization {
            body["organization"] = json!(org);
        }
        self.post_public("/auth/register", body).await
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.post_public(
            "/auth/login",
            json!({ "username": username, "password": password }),
        )
        .await
    }

    /// Registers a fresh user with the default role.
    pub async fn register_user(&self, prefix: &str) -> TestUser {
        let username = Self::unique_name(prefix);
        let response = self.register(&username, TEST_PASSWORD, None).await;
        assert_eq!(response.status().as_u16(), 201, "registration failed");
        let auth: AuthBody = response.json().await.expect("auth body");
        TestUser {
            id: auth.user.id,
            username: auth.user.username,
            organization_id: auth.user.organization_id,
            token: auth.access_token,
        }
    }

    /// Inserts a user straight into the store and logs them in.
    pub async fn user_with_role(&self, prefix: &str, role_id: i32, organization_id: Option<i32>) -> TestUser {
        let username = Self::unique_name(prefix);
        let user = self
            .store
            .create_user(NewUser {
                username: username.clone(),
                email: format!("{}@example.com", username),
                password_hash: TEST_PASSWORD_HASH.clone(),
                role_id: Some(role_id),
                organization_id,
                is_active: true,
            })
            .expect("insert user");

        let response = self.login(&username, TEST_PASSWORD).await;
        assert_eq!(response.status().as_u16(), 200, "login failed");
        let auth: AuthBody = response.json().await.expect("auth body");

        TestUser {
            id: user.id,
            username,
            organization_id,
            token: auth.access_token,
        }
    }

    pub async fn admin(&self) -> TestUser {
        self.user_with_role("admin", ADMIN_ROLE, Some(DEFAULT_ORGANIZATION))
            .await
    }

    pub async fn project_manager(&self, organization_id: i32) -> TestUser {
        self.user_with_role("pm", PROJECT_MANAGER_ROLE, Some(organization_id))
            .await
    }

    pub async fn member(&self, organization_id: i32) -> TestUser {
        self.user_with_role("member", USER_ROLE, Some(organization_id))
            .await
    }

    pub fn create_organization(&self, prefix: &str) -> i32 {
        self.store
            .create_organization(NewOrganization {
                name: Self::unique_name(prefix),
            })
            .expect("insert organization")
            .id
    }

    pub fn organization_name(&self, organization_id: i32) -> String {
        self.store
            .get_organization(organization_id)
            .expect("organization")
            .name
    }

    /// Creates a project through the API and returns its id.
    pub async fn create_project(&self, owner: &TestUser, name: &str) -> i32 {
        let response = self
            .post("/projects", &owner.token, json!({ "name": name }))
            .await;
        assert_eq!(response.status().as_u16(), 201, "project creation failed");
        let body: Value = response.json().await.expect("project body");
        body["id"].as_i64().expect("project id") as i32
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to send GET request")
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to send POST request")
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .put(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to send PUT request")
    }

    pub async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to send DELETE request")
    }

    pub async fn get_public(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Failed to send GET request")
    }

    pub async fn post_public(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send POST request")
    }
}

/// Asserts the status code and returns the parsed body.
pub async fn expect_json(response: reqwest::Response, status: u16) -> Value {
    assert_eq!(
        response.status().as_u16(),
        status,
        "Expected status {}, got {}",
        status,
        response.status()
    );
    response.json().await.expect("Failed to parse response")
}

#[macro_export]
macro_rules! assert_status {
    ($response:expr, $expected:expr) => {
        assert_eq!(
            $response.status().as_u16(),
            $expected,
            "Expected status {}, got {}",
            $expected,
            $response.status()
        );
    };
}
