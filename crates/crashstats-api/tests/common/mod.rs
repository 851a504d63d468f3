//! Shared fixtures: a scriptable backend and a router wired to it.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use crashstats_api::{config::GatewayConfig, create_app, identity::InMemoryIdentityStore, AppState};
use crashstats_core::{
    BackendError, BackendParams, BackendResult, InMemoryStore, ModelBackend, ModelDescriptor,
    Permission, PermissionSet, UserAccount,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

type Handler = Box<dyn Fn(&BackendParams) -> Result<BackendResult, BackendError> + Send + Sync>;

/// Backend whose answers are scripted per model name
#[derive(Default)]
pub struct MockBackend {
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<(String, BackendParams)>>,
}

impl MockBackend {
    pub fn on<F>(&self, model: &str, handler: F)
    where
        F: Fn(&BackendParams) -> Result<BackendResult, BackendError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert(model.to_string(), Box::new(handler));
    }

    /// Answer `model` with the same JSON every time
    pub fn returns(&self, model: &str, value: Value) {
        self.on(model, move |_| Ok(BackendResult::Json(value.clone())));
    }

    pub fn calls(&self) -> Vec<(String, BackendParams)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_params(&self, model: &str) -> Option<BackendParams> {
        self.calls()
            .into_iter()
            .rev()
            .find(|(name, _)| name == model)
            .map(|(_, params)| params)
    }

    fn call(
        &self,
        model: &ModelDescriptor,
        params: &BackendParams,
    ) -> Result<BackendResult, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.name.clone(), params.clone()));
        let handlers = self.handlers.lock().unwrap();
        match handlers.get(&model.name) {
            Some(handler) => handler(params),
            None => Err(BackendError::Unavailable(format!("no mock for {}", model.name))),
        }
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn get(
        &self,
        model: &ModelDescriptor,
        params: &BackendParams,
    ) -> Result<BackendResult, BackendError> {
        self.call(model, params)
    }

    async fn act(
        &self,
        model: &ModelDescriptor,
        params: &BackendParams,
    ) -> Result<Value, BackendError> {
        match self.call(model, params)? {
            BackendResult::Json(value) => Ok(value),
            BackendResult::Binary(_) => Err(BackendError::Payload("binary action result".into())),
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub struct TestApp {
    pub router: Router,
    pub backend: Arc<MockBackend>,
    pub identities: Arc<InMemoryIdentityStore>,
    next_id: Mutex<u64>,
}

/// Gateway config used by the tests: forwarded-for trusted, no response cache
pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        trust_forwarded_for: true,
        response_cache: false,
        ..GatewayConfig::default()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let backend = Arc::new(MockBackend::default());
        let identities = Arc::new(InMemoryIdentityStore::new());
        let state = AppState::new(
            config,
            backend.clone(),
            Arc::new(InMemoryStore::new(1024)),
            identities.clone(),
        )
        .unwrap();
        Self {
            router: create_app(state),
            backend,
            identities,
            next_id: Mutex::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        *next
    }

    pub fn user(&self, permissions: &[Permission]) -> UserAccount {
        let id = self.next_id();
        let user = permissions
            .iter()
            .fold(UserAccount::new(id, format!("test{id}")), |u, p| u.with_permission(*p));
        self.identities.add_user(user.clone());
        user
    }

    /// Log `user` in; returns the `Cookie` header value
    pub fn login(&self, user: &UserAccount) -> String {
        let session = format!("session-{}", user.id);
        self.identities.add_session(session.clone(), user.id);
        format!("sessionid={session}")
    }

    pub fn token(&self, user: &UserAccount, permissions: &[Permission], notes: &str) -> String {
        let key = format!("token-{}-{}", user.id, self.next_id());
        let permissions: PermissionSet = permissions.iter().copied().collect();
        self.identities.add_token(key.clone(), user.id, permissions, None, notes);
        key
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        let (uri, body) = if method == Method::POST {
            (path.to_string(), Body::from(encoded))
        } else if encoded.is_empty() {
            (path.to_string(), Body::empty())
        } else {
            (format!("{path}?{encoded}"), Body::empty())
        };

        let mut builder = Request::builder().method(method.clone()).uri(uri);
        if method == Method::POST {
            builder = builder.header("content-type", "application/x-www-form-urlencoded");
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> TestResponse {
        self.request(Method::GET, path, params, &[]).await
    }

    pub async fn get_with(
        &self,
        path: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request(Method::GET, path, params, headers).await
    }
}

pub fn model_url(name: &str) -> String {
    format!("/api/{name}/")
}
