//! 测试辅助模块
//! 进程内模拟认证后端 + 脚本化 EIP-1193 provider

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use walletauth::{
    config::BackendConfig,
    domain::{
        Eip1193Event, Eip1193Provider, InjectedProvider, ProviderBus, ProviderDetail,
        ProviderInfo,
    },
    error::ProviderRpcError,
    infrastructure::{
        backend_client::BackendClient,
        event_bus::{EventBus, Subscription},
    },
};

// ========== 模拟后端 ==========

#[derive(Default)]
pub struct Recorded {
    pub challenge: String,
    pub fail_challenge: bool,
    pub fail_verify: bool,
    /// GET /auth/challenge 的 publicKey 参数
    pub challenge_requests: Vec<String>,
    /// (路径, 请求体)
    pub verifications: Vec<(String, Value)>,
    pub total_requests: usize,
}

#[derive(Clone, Default)]
pub struct BackendState {
    inner: Arc<Mutex<Recorded>>,
}

impl BackendState {
    pub fn with<R>(&self, f: impl FnOnce(&mut Recorded) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }
}

pub struct FakeBackend {
    pub base_url: String,
    pub state: BackendState,
    _server: tokio::task::JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start(challenge: &str) -> Self {
        let state = BackendState::default();
        state.with(|r| r.challenge = challenge.to_string());

        let app = Router::new()
            .route("/auth/challenge", get(challenge_handler))
            .route("/auth/wallet", post(verify_handler))
            .route("/auth/phantom", post(verify_handler))
            .route("/tokenamount", get(token_amount_handler))
            .route("/profile", get(profile_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            _server: server,
        }
    }

    pub fn config(&self) -> BackendConfig {
        BackendConfig {
            base_url: self.base_url.clone(),
            request_timeout_secs: 5,
            include_credentials: true,
        }
    }

    pub fn client(&self) -> Arc<BackendClient> {
        Arc::new(BackendClient::new(&self.config()).unwrap())
    }

    pub fn challenge_requests(&self) -> Vec<String> {
        self.state.with(|r| r.challenge_requests.clone())
    }

    pub fn verifications(&self) -> Vec<(String, Value)> {
        self.state.with(|r| r.verifications.clone())
    }

    pub fn total_requests(&self) -> usize {
        self.state.with(|r| r.total_requests)
    }
}

async fn challenge_handler(
    State(state): State<BackendState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.with(|r| {
        r.total_requests += 1;
        r.challenge_requests
            .push(query.get("publicKey").cloned().unwrap_or_default());
        if r.fail_challenge {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response()
        } else {
            r.challenge.clone().into_response()
        }
    })
}

async fn verify_handler(
    State(state): State<BackendState>,
    uri: axum::http::Uri,
    Json(body): Json<Value>,
) -> Response {
    state.with(|r| {
        r.total_requests += 1;
        r.verifications.push((uri.path().to_string(), body.clone()));
        if r.fail_verify {
            return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
        }
        let public_key = body["publicKey"].as_str().unwrap_or_default().to_string();
        (
            [(header::SET_COOKIE, format!("session={}; Path=/", public_key))],
            Json(json!({ "authenticated": true, "publicKey": public_key })),
        )
            .into_response()
    })
}

fn session_of(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|c| c.trim().strip_prefix("session="))
        .map(str::to_string)
        .next()
}

async fn token_amount_handler(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    state.with(|r| r.total_requests += 1);
    match session_of(&headers) {
        Some(_) => "42.5".into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn profile_handler(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    state.with(|r| r.total_requests += 1);
    match session_of(&headers) {
        Some(public_key) => Json(json!({ "publicKey": public_key })).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

// ========== 脚本化 EVM provider ==========

/// 固定账户与固定签名，记录每次请求
pub struct ScriptedEvmProvider {
    pub accounts: Vec<String>,
    pub signature: String,
    pub calls: Mutex<Vec<(String, Vec<Value>)>>,
    events: EventBus<Eip1193Event>,
}

impl ScriptedEvmProvider {
    pub fn new(accounts: &[&str]) -> Self {
        Self {
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            signature: format!("0x{}1b", "ab".repeat(64)),
            calls: Mutex::new(Vec::new()),
            events: EventBus::new(),
        }
    }

    pub fn calls_to(&self, method: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl Eip1193Provider for ScriptedEvmProvider {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, ProviderRpcError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        match method {
            "eth_requestAccounts" | "eth_accounts" => Ok(json!(self.accounts)),
            "personal_sign" => Ok(Value::String(self.signature.clone())),
            other => Err(ProviderRpcError::unsupported_method(other)),
        }
    }

    fn events(&self) -> &EventBus<Eip1193Event> {
        &self.events
    }
}

/// 在总线上公告一个 provider，返回公告句柄
pub fn announce(
    bus: &ProviderBus,
    vendor_id: &str,
    name: &str,
    provider: InjectedProvider,
) -> Subscription {
    ProviderDetail {
        info: ProviderInfo::new(vendor_id, name, format!("data:{}", vendor_id)),
        provider,
    }
    .announce_on(bus)
}
