//! Shared helpers for driving the router in-process
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use gamehub::api::{router, AppState};
use gamehub::chain::{AcceptAllVerifier, ChainVerifier};
use gamehub::config::{Config, Environment};
use gamehub::database::{DocumentStore, MemoryStore};
use gamehub::services::matches::LogSettlement;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const RESOLVER_TOKEN: &str = "test-resolver-token";

/// Router over an in-memory store
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_verifier(Arc::new(AcceptAllVerifier))
    }

    pub fn with_verifier(verifier: Arc<dyn ChainVerifier>) -> Self {
        let config = Config::default_for_environment(Environment::Testing);
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let state = AppState::with_parts(config, store, verifier, Arc::new(LogSettlement));
        Self {
            router: router(state.clone()),
            state,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.request(Method::GET, path, None, &[]).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, path, Some(body), &[]).await
    }

    /// Register a user and return its JSON record
    pub async fn register(&self, wallet: &str, username: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/auth/register",
                serde_json::json!({ "walletAddress": wallet, "username": username }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["user"].clone()
    }
}

/// A well-formed 20-byte address ending in `n`
pub fn wallet(n: u8) -> String {
    format!("0x{:040x}", n)
}
