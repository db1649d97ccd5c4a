//! Common test utilities for keyshop integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use tempfile::TempDir;

use keyshop_core::{Key, UserId, VoucherCode};
use keyshop_service::auth::{AppMetadata, JwtClaims, ADMIN_KEY_HEADER};
use keyshop_service::{create_router, AppState, KeySource, ServiceConfig};
use keyshop_store::{RocksStore, Store};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const MOBILE: &str = "0812345678";
pub const VOUCHER: &str = "ABCDEFGHIJ-1234567";

type ConfigFn = Box<dyn FnOnce(&mut ServiceConfig)>;
type WrapFn = Box<dyn FnOnce(Arc<RocksStore>) -> Arc<dyn Store>>;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct access to the store behind the server.
    pub store: Arc<RocksStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

/// Customises the harness before the server starts.
#[derive(Default)]
pub struct HarnessBuilder {
    configure: Vec<ConfigFn>,
    wrap: Option<WrapFn>,
    upstream: Option<Arc<dyn KeySource>>,
}

impl HarnessBuilder {
    /// Point the TrueMoney client at a mock server.
    pub fn gateway(self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.config(move |c| {
            c.truemoney_api_url = Some(base_url);
            c.truemoney_mobile = Some(MOBILE.into());
            c.gateway_timeout_seconds = 1;
        })
    }

    /// Point the notifier at a mock sink with fast retries.
    pub fn notifier(self, url: impl Into<String>, max_attempts: u32) -> Self {
        let url = url.into();
        self.config(move |c| {
            c.notify_webhook_url = Some(url);
            c.notify_max_attempts = max_attempts;
            c.notify_backoff_ms = 1;
        })
    }

    /// Use `source` for key sync.
    pub fn upstream(mut self, source: Arc<dyn KeySource>) -> Self {
        self.upstream = Some(source);
        self
    }

    /// Wrap the store the server sees.
    pub fn wrap_store(
        mut self,
        wrap: impl FnOnce(Arc<RocksStore>) -> Arc<dyn Store> + 'static,
    ) -> Self {
        self.wrap = Some(Box::new(wrap));
        self
    }

    /// Adjust the configuration.
    pub fn config(mut self, f: impl FnOnce(&mut ServiceConfig) + 'static) -> Self {
        self.configure.push(Box::new(f));
        self
    }

    /// Open a fresh database and start the server.
    pub fn build(self) -> TestHarness {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            admin_api_key: Some(ADMIN_KEY.into()),
            ..ServiceConfig::default()
        };
        for f in self.configure {
            f(&mut config);
        }

        let served: Arc<dyn Store> = match self.wrap {
            Some(wrap) => wrap(Arc::clone(&store)),
            None => Arc::clone(&store) as Arc<dyn Store>,
        };

        let mut state = AppState::new(served, config);
        if let Some(upstream) = self.upstream {
            state = state.with_upstream(upstream);
        }
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        TestHarness {
            server,
            store,
            _temp_dir: temp_dir,
            test_user_id: UserId::generate(),
        }
    }
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start customising a harness.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Authorization header for the test user.
    pub fn user_auth(&self) -> HeaderValue {
        bearer(&user_token(&self.test_user_id, None))
    }

    /// Authorization header for another user.
    pub fn auth_for(user_id: &UserId) -> HeaderValue {
        bearer(&user_token(user_id, None))
    }

    /// Authorization header for a user holding the admin role.
    pub fn admin_jwt_auth() -> HeaderValue {
        bearer(&user_token(&UserId::generate(), Some("admin")))
    }

    /// Operator key header.
    pub fn admin_key() -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static(ADMIN_KEY_HEADER),
            HeaderValue::from_static(ADMIN_KEY),
        )
    }

    /// Name of the authorization header.
    pub fn authorization() -> HeaderName {
        AUTHORIZATION
    }

    /// Stock an unclaimed key directly in the store.
    pub fn stock(&self, code: &str, maps: &[&str]) -> Key {
        let key = Key::pending(
            code,
            format!("loadstring('{code}')"),
            maps.iter().map(ToString::to_string),
        );
        assert!(self.store.insert_key(&key).unwrap());
        key
    }

    /// Credit a user directly in the store.
    pub fn fund(&self, user_id: &UserId, amount_cents: i64) {
        let voucher = VoucherCode::parse(VOUCHER).unwrap();
        self.store
            .credit_topup(user_id, amount_cents, &voucher, false)
            .unwrap();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Mint a token the service accepts.
pub fn user_token(user_id: &UserId, role: Option<&str>) -> String {
    let claims = JwtClaims {
        sub: user_id.to_string(),
        aud: Some(serde_json::json!("authenticated")),
        exp: chrono::Utc::now().timestamp() + 3600,
        app_metadata: AppMetadata {
            role: role.map(ToString::to_string),
        },
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign token")
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).expect("valid header value")
}
