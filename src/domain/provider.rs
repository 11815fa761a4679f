//! 注入式钱包 provider 模型
//!
//! - EVM 钱包遵循 EIP-1193（`request` + 事件）
//! - Solana 钱包暴露 connect / disconnect / signMessage
//! - 多钱包通过 EIP-6963 公告协议在同一事件目标上自我声明

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::wallet_kind::ChainKind,
    error::ProviderRpcError,
    infrastructure::event_bus::{EventBus, Subscription},
};

/// EIP-6963 provider 信息，公告后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub uuid: String,
    #[serde(rename = "rdns")]
    pub vendor_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "icon")]
    pub icon_uri: String,
}

impl ProviderInfo {
    pub fn new(
        vendor_id: impl Into<String>,
        display_name: impl Into<String>,
        icon_uri: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            vendor_id: vendor_id.into(),
            display_name: display_name.into(),
            icon_uri: icon_uri.into(),
        }
    }
}

/// EIP-1193 事件
#[derive(Debug, Clone, PartialEq)]
pub enum Eip1193Event {
    Connect { chain_id: String },
    Disconnect { code: i64, message: String },
    ChainChanged(String),
    AccountsChanged(Vec<String>),
}

/// Solana 钱包事件
#[derive(Debug, Clone, PartialEq)]
pub enum SolanaEvent {
    Connect(String),
    Disconnect,
    /// `None` 表示钱包切换到了未授权的账户
    AccountChanged(Option<String>),
}

#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, ProviderRpcError>;

    fn events(&self) -> &EventBus<Eip1193Event>;
}

#[async_trait]
pub trait SolanaProvider: Send + Sync {
    /// 连接并返回 base58 公钥
    async fn connect(&self) -> Result<String, ProviderRpcError>;

    async fn disconnect(&self) -> Result<(), ProviderRpcError>;

    /// 当前授权账户（连接之后才有值）
    fn public_key(&self) -> Option<String>;

    /// 对原始字节签名，返回 64 字节 ed25519 签名
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, ProviderRpcError>;

    fn events(&self) -> &EventBus<SolanaEvent>;
}

/// 注入对象的封闭变体集合
#[derive(Clone)]
pub enum InjectedProvider {
    Evm(Arc<dyn Eip1193Provider>),
    Solana(Arc<dyn SolanaProvider>),
}

impl InjectedProvider {
    pub fn chain(&self) -> ChainKind {
        match self {
            Self::Evm(_) => ChainKind::Evm,
            Self::Solana(_) => ChainKind::Solana,
        }
    }
}

impl fmt::Debug for InjectedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InjectedProvider::{}", self.chain())
    }
}

/// 公告事件负载
#[derive(Debug, Clone)]
pub struct ProviderDetail {
    pub info: ProviderInfo,
    pub provider: InjectedProvider,
}

/// 浏览器窗口级的发现事件
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// `eip6963:requestProvider`
    RequestProvider,
    /// `eip6963:announceProvider`
    AnnounceProvider(ProviderDetail),
}

pub type ProviderBus = EventBus<DiscoveryEvent>;

impl ProviderDetail {
    /// 钱包侧协议：立即公告一次，之后每收到一次请求就重新公告
    pub fn announce_on(self, bus: &ProviderBus) -> Subscription {
        let responder = bus.clone();
        let detail = self.clone();
        let subscription = bus.subscribe(move |event| {
            if matches!(event, DiscoveryEvent::RequestProvider) {
                responder.dispatch(&DiscoveryEvent::AnnounceProvider(detail.clone()));
            }
        });

        tracing::debug!(
            "Announcing provider: {} ({})",
            self.info.display_name,
            self.info.vendor_id
        );
        bus.dispatch(&DiscoveryEvent::AnnounceProvider(self));
        subscription
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_info_eip6963_shape() {
        let json = serde_json::json!({
            "uuid": "350670db-19fa-4704-a166-e52e178b59d2",
            "name": "MetaMask",
            "icon": "data:image/svg+xml;base64,PHN2Zz48L3N2Zz4=",
            "rdns": "io.metamask"
        });
        let info: ProviderInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info.display_name, "MetaMask");
        assert_eq!(info.vendor_id, "io.metamask");
    }
}
