//! 链适配器
//!
//! 把厂商注入对象统一成 connect / disconnect / request / signMessage / 事件订阅。
//! EVM 与 Solana 两种变体在发现阶段按注入对象的类型选定。

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::{
    domain::{
        ChainKind, Eip1193Event, Eip1193Provider, InjectedProvider, SolanaEvent, SolanaProvider,
    },
    error::{WalletError, WalletResult},
    infrastructure::event_bus::Subscription,
    utils::encoding,
};

/// 归一化后的适配器事件
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// Solana 携带公钥；EVM 的 connect 只携带链ID，公钥为 None
    Connect(Option<String>),
    Disconnect,
    /// 仅 Solana
    AccountChanged(Option<String>),
    /// 仅 EVM
    ChainChanged(String),
}

#[derive(Clone)]
pub enum ChainAdapter {
    Evm(EvmAdapter),
    Solana(SolanaAdapter),
}

impl std::fmt::Debug for ChainAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainAdapter")
            .field("chain", &self.chain())
            .field("accounts", &self.accounts())
            .finish()
    }
}

impl ChainAdapter {
    pub fn from_injected(provider: &InjectedProvider) -> Self {
        match provider {
            InjectedProvider::Evm(p) => Self::Evm(EvmAdapter::new(p.clone())),
            InjectedProvider::Solana(p) => Self::Solana(SolanaAdapter::new(p.clone())),
        }
    }

    pub fn chain(&self) -> ChainKind {
        match self {
            Self::Evm(_) => ChainKind::Evm,
            Self::Solana(_) => ChainKind::Solana,
        }
    }

    /// 请求用户授权连接
    pub async fn connect(&self) -> WalletResult<()> {
        match self {
            Self::Evm(a) => a.request_accounts().await.map(|_| ()),
            Self::Solana(a) => a.connect().await.map(|_| ()),
        }
    }

    pub async fn disconnect(&self) -> WalletResult<()> {
        match self {
            Self::Evm(a) => {
                a.forget_accounts();
                Ok(())
            }
            Self::Solana(a) => a.disconnect().await,
        }
    }

    /// 最近一次已知的账户列表，下标 0 为活跃账户
    pub fn accounts(&self) -> Vec<String> {
        match self {
            Self::Evm(a) => a.accounts(),
            Self::Solana(a) => a.public_key().into_iter().collect(),
        }
    }

    pub async fn request_accounts(&self) -> WalletResult<Vec<String>> {
        match self {
            Self::Evm(a) => a.request_accounts().await,
            Self::Solana(a) => Ok(a.public_key().into_iter().collect()),
        }
    }

    /// 透传 RPC（仅 EVM）
    pub async fn request(&self, method: &str, params: Vec<Value>) -> WalletResult<Value> {
        match self {
            Self::Evm(a) => a.request(method, params).await,
            Self::Solana(_) => Err(WalletError::Unsupported(format!(
                "{} is not available on a Solana adapter",
                method
            ))),
        }
    }

    /// 对消息签名，返回原始签名字节
    ///
    /// 传输编码由调用方按链选择（见 `utils::encoding::encode_signature`）
    pub async fn sign_message(&self, message: &[u8], account: &str) -> WalletResult<Vec<u8>> {
        match self {
            Self::Evm(a) => a.personal_sign(message, account).await,
            Self::Solana(a) => a.sign_message(message).await,
        }
    }

    /// 订阅适配器事件，句柄被丢弃时退订
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(AdapterEvent) + Send + Sync + 'static,
    {
        match self {
            Self::Evm(a) => a.provider.events().subscribe(move |event| {
                let mapped = match event {
                    Eip1193Event::Connect { .. } => Some(AdapterEvent::Connect(None)),
                    Eip1193Event::Disconnect { .. } => Some(AdapterEvent::Disconnect),
                    Eip1193Event::ChainChanged(id) => Some(AdapterEvent::ChainChanged(id.clone())),
                    // accountsChanged 不在 EVM 适配器的事件面内
                    Eip1193Event::AccountsChanged(_) => None,
                };
                if let Some(event) = mapped {
                    handler(event);
                }
            }),
            Self::Solana(a) => a.provider.events().subscribe(move |event| {
                handler(match event {
                    SolanaEvent::Connect(pk) => AdapterEvent::Connect(Some(pk.clone())),
                    SolanaEvent::Disconnect => AdapterEvent::Disconnect,
                    SolanaEvent::AccountChanged(pk) => AdapterEvent::AccountChanged(pk.clone()),
                })
            }),
        }
    }
}

/// EVM 适配器（EIP-1193）
#[derive(Clone)]
pub struct EvmAdapter {
    provider: Arc<dyn Eip1193Provider>,
    accounts: Arc<Mutex<Vec<String>>>,
}

impl EvmAdapter {
    pub fn new(provider: Arc<dyn Eip1193Provider>) -> Self {
        Self {
            provider,
            accounts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn request(&self, method: &str, params: Vec<Value>) -> WalletResult<Value> {
        tracing::debug!("EVM request: {}", method);
        self.provider
            .request(method, params)
            .await
            .map_err(WalletError::from)
    }

    /// `eth_requestAccounts`，结果缓存为当前账户列表
    pub async fn request_accounts(&self) -> WalletResult<Vec<String>> {
        let value = self
            .provider
            .request("eth_requestAccounts", vec![])
            .await
            .map_err(WalletError::connection_rejected)?;

        let accounts: Vec<String> = serde_json::from_value(value).map_err(|e| {
            WalletError::ConnectionRejected(format!("malformed eth_requestAccounts result: {}", e))
        })?;
        tracing::debug!("All eth accounts: {:?}", accounts);

        *self.accounts.lock().unwrap_or_else(PoisonError::into_inner) = accounts.clone();
        Ok(accounts)
    }

    pub fn accounts(&self) -> Vec<String> {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn forget_accounts(&self) {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// personal_sign：对原文（而非哈希）的十六进制编码签名
    pub async fn personal_sign(&self, message: &[u8], account: &str) -> WalletResult<Vec<u8>> {
        let params = vec![
            Value::String(encoding::utf8_to_hex(message)),
            Value::String(account.to_string()),
        ];
        let value = self
            .provider
            .request("personal_sign", params)
            .await
            .map_err(WalletError::signature_declined)?;

        let signature = value.as_str().ok_or_else(|| {
            WalletError::SignatureDeclined("personal_sign returned a non-string result".into())
        })?;
        encoding::decode_hex(signature).map_err(|e| {
            WalletError::SignatureDeclined(format!("personal_sign returned invalid hex: {}", e))
        })
    }
}

/// Solana 适配器
#[derive(Clone)]
pub struct SolanaAdapter {
    provider: Arc<dyn SolanaProvider>,
}

impl SolanaAdapter {
    pub fn new(provider: Arc<dyn SolanaProvider>) -> Self {
        Self { provider }
    }

    pub async fn connect(&self) -> WalletResult<String> {
        self.provider
            .connect()
            .await
            .map_err(WalletError::connection_rejected)
    }

    pub async fn disconnect(&self) -> WalletResult<()> {
        self.provider.disconnect().await.map_err(WalletError::from)
    }

    pub fn public_key(&self) -> Option<String> {
        self.provider.public_key()
    }

    pub async fn sign_message(&self, message: &[u8]) -> WalletResult<Vec<u8>> {
        self.provider
            .sign_message(message)
            .await
            .map_err(WalletError::signature_declined)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{error::ProviderRpcError, infrastructure::event_bus::EventBus};

    /// 记录所有请求的 EIP-1193 桩
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<(String, Vec<Value>)>>,
        events: EventBus<Eip1193Event>,
    }

    #[async_trait]
    impl Eip1193Provider for RecordingProvider {
        async fn request(
            &self,
            method: &str,
            params: Vec<Value>,
        ) -> Result<Value, ProviderRpcError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params.clone()));
            match method {
                "eth_requestAccounts" => Ok(serde_json::json!(["0xAA", "0xBB"])),
                "personal_sign" => Ok(Value::String("0xdeadbeef".into())),
                _ => Err(ProviderRpcError::unsupported_method(method)),
            }
        }

        fn events(&self) -> &EventBus<Eip1193Event> {
            &self.events
        }
    }

    #[tokio::test]
    async fn test_evm_personal_sign_hex_encodes_message() {
        let provider = Arc::new(RecordingProvider::default());
        let adapter = ChainAdapter::from_injected(&InjectedProvider::Evm(provider.clone()));

        let signature = adapter.sign_message(b"abc", "0xAA").await.unwrap();
        assert_eq!(signature, vec![0xde, 0xad, 0xbe, 0xef]);

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls[0].0, "personal_sign");
        assert_eq!(calls[0].1[0], Value::String("0x616263".into()));
        assert_eq!(calls[0].1[1], Value::String("0xAA".into()));
    }

    #[tokio::test]
    async fn test_evm_accounts_index_zero_is_active() {
        let provider = Arc::new(RecordingProvider::default());
        let adapter = ChainAdapter::from_injected(&InjectedProvider::Evm(provider.clone()));

        assert!(adapter.accounts().is_empty());
        adapter.connect().await.unwrap();
        assert_eq!(adapter.accounts()[0], "0xAA");
        assert_eq!(provider.calls.lock().unwrap().len(), 1);

        adapter.disconnect().await.unwrap();
        assert!(adapter.accounts().is_empty());
    }

    #[tokio::test]
    async fn test_evm_events_are_normalized() {
        let provider = Arc::new(RecordingProvider::default());
        let adapter = ChainAdapter::from_injected(&InjectedProvider::Evm(provider.clone()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = adapter.subscribe(move |event| sink.lock().unwrap().push(event));

        provider.events.dispatch(&Eip1193Event::ChainChanged("0x89".into()));
        provider
            .events
            .dispatch(&Eip1193Event::AccountsChanged(vec!["0xCC".into()]));
        provider.events.dispatch(&Eip1193Event::Disconnect {
            code: 4900,
            message: "bye".into(),
        });
        drop(sub);
        provider.events.dispatch(&Eip1193Event::ChainChanged("0x1".into()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                AdapterEvent::ChainChanged("0x89".into()),
                AdapterEvent::Disconnect
            ]
        );
    }

    #[tokio::test]
    async fn test_solana_adapter_rejects_rpc_passthrough() {
        struct Idle {
            events: EventBus<SolanaEvent>,
            connects: AtomicUsize,
        }

        #[async_trait]
        impl SolanaProvider for Idle {
            async fn connect(&self) -> Result<String, ProviderRpcError> {
                self.connects.fetch_add(1, Ordering::SeqCst);
                Err(ProviderRpcError::user_rejected())
            }
            async fn disconnect(&self) -> Result<(), ProviderRpcError> {
                Ok(())
            }
            fn public_key(&self) -> Option<String> {
                None
            }
            async fn sign_message(&self, _message: &[u8]) -> Result<Vec<u8>, ProviderRpcError> {
                Err(ProviderRpcError::unauthorized())
            }
            fn events(&self) -> &EventBus<SolanaEvent> {
                &self.events
            }
        }

        let provider = Arc::new(Idle {
            events: EventBus::new(),
            connects: AtomicUsize::new(0),
        });
        let adapter = ChainAdapter::from_injected(&InjectedProvider::Solana(provider.clone()));

        assert_eq!(adapter.chain(), ChainKind::Solana);
        assert!(matches!(
            adapter.request("eth_call", vec![]).await,
            Err(WalletError::Unsupported(_))
        ));
        assert!(matches!(
            adapter.connect().await,
            Err(WalletError::ConnectionRejected(_))
        ));
        assert!(matches!(
            adapter.sign_message(b"xyz", "").await,
            Err(WalletError::SignatureDeclined(_))
        ));
        assert_eq!(provider.connects.load(Ordering::SeqCst), 1);
    }
}
