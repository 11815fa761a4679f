//! 认证后端客户端
//!
//! 挑战获取、签名校验与会话查询。开启 `include_credentials` 时由 cookie store
//! 保存后端下发的会话 Cookie，并随后续请求一起发送。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::BackendConfig,
    domain::ChainKind,
    error::{WalletError, WalletResult},
};

/// 签名校验端点：后端按链使用不同的验签方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEndpoint {
    /// `/auth/wallet`（EVM personal_sign）
    Wallet,
    /// `/auth/phantom`（ed25519）
    Phantom,
}

impl AuthEndpoint {
    pub fn for_chain(chain: ChainKind) -> Self {
        match chain {
            ChainKind::Evm => Self::Wallet,
            ChainKind::Solana => Self::Phantom,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::Wallet => "/auth/wallet",
            Self::Phantom => "/auth/phantom",
        }
    }
}

/// 校验请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub wallet_name: String,
    pub public_key: String,
    pub challenge: String,
    /// EVM 为 0x 十六进制，Solana 为 base58
    pub signature: String,
}

/// 认证协调器依赖的后端能力
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// 获取一次性挑战串
    async fn fetch_challenge(&self, public_key: &str) -> WalletResult<String>;

    /// 提交签名，成功时返回后端的会话结果
    async fn verify(&self, endpoint: AuthEndpoint, payload: &AuthPayload) -> WalletResult<Value>;
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> WalletResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .cookie_store(config.include_credentials)
            .build()
            .map_err(|e| WalletError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 后端记录的代币数量；非 2xx 时按 0 显示
    pub async fn token_amount(&self) -> WalletResult<f64> {
        let response = self.client.get(self.url("/tokenamount")).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!("GET /tokenamount returned {}, showing 0", status);
            return Ok(0.0);
        }

        let body = response.text().await?;
        body.trim()
            .parse::<f64>()
            .map_err(|e| WalletError::Backend(format!("invalid token amount {:?}: {}", body, e)))
    }

    /// 当前会话的用户资料；未登录（非 2xx）时返回 `None`
    pub async fn profile(&self) -> WalletResult<Option<Value>> {
        let response = self.client.get(self.url("/profile")).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::info!("GET /profile returned {}, not logged in", status);
            return Ok(None);
        }
        Ok(Some(response.json::<Value>().await?))
    }
}

#[async_trait]
impl AuthBackend for BackendClient {
    async fn fetch_challenge(&self, public_key: &str) -> WalletResult<String> {
        tracing::debug!("GET /auth/challenge for {}", public_key);

        let response = self
            .client
            .get(self.url("/auth/challenge"))
            .query(&[("publicKey", public_key)])
            .send()
            .await
            .map_err(|e| WalletError::ChallengeFetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::ChallengeFetchFailed(format!(
                "challenge endpoint returned {}",
                status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| WalletError::ChallengeFetchFailed(e.to_string()))
    }

    async fn verify(&self, endpoint: AuthEndpoint, payload: &AuthPayload) -> WalletResult<Value> {
        tracing::debug!("POST {} for {}", endpoint.path(), payload.public_key);

        let response = self
            .client
            .post(self.url(endpoint.path()))
            .json(payload)
            .send()
            .await
            .map_err(|e| WalletError::AuthVerifyFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WalletError::AuthVerifyFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(WalletError::AuthVerifyFailed(format!(
                "{} returned {}: {}",
                endpoint.path(),
                status,
                body
            )));
        }

        // 会话结果通常是 JSON，非 JSON 时原样保留
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}
