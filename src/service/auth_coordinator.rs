//! 认证协调器
//!
//! 共享钱包状态每变为本钱包的一条记录，就完整执行一次
//! 挑战获取 -> 签名 -> 校验。连续相同的触发不去重，每次都重新握手。
//! 协调器从不写共享钱包状态，失败只记录日志并发布 `AuthEvent::Failed`。

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    domain::{ChainKind, WalletName, WalletRecord},
    error::{WalletError, WalletResult},
    infrastructure::{
        backend_client::{AuthBackend, AuthEndpoint, AuthPayload},
        event_bus::Subscription,
    },
    service::{
        chain_adapter::ChainAdapter, connection_controller::ConnectionController,
        wallet_store::WalletStore,
    },
    utils::encoding,
};

/// 认证结果通知（只读观察通道）
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    Authenticated {
        wallet: WalletName,
        public_key: String,
        session: Value,
    },
    Failed {
        wallet: WalletName,
        public_key: String,
        error: WalletError,
    },
}

/// 一次认证尝试的临时数据，尝试结束即丢弃
struct AuthSession {
    challenge: String,
    signature: Vec<u8>,
}

pub struct AuthCoordinator {
    wallet: WalletName,
    vendor_id: Option<String>,
    chain: ChainKind,
    adapter: ChainAdapter,
    backend: Arc<dyn AuthBackend>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthCoordinator {
    pub fn new(
        wallet: WalletName,
        vendor_id: Option<String>,
        adapter: ChainAdapter,
        backend: Arc<dyn AuthBackend>,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            wallet,
            vendor_id,
            chain: adapter.chain(),
            adapter,
            backend,
            events,
        }
    }

    /// 跟随已挂载的控制器；provider 未发现时返回 `None`
    pub fn for_controller(
        controller: &ConnectionController,
        backend: Arc<dyn AuthBackend>,
    ) -> Option<Self> {
        let adapter = controller.adapter()?;
        let vendor_id = controller.provider_info().map(|info| info.vendor_id);
        Some(Self::new(controller.wallet(), vendor_id, adapter, backend))
    }

    pub fn wallet(&self) -> WalletName {
        self.wallet
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// 记录是否属于本协调器负责的钱包
    pub fn matches(&self, record: &WalletRecord) -> bool {
        if record.wallet_name != self.wallet {
            return false;
        }
        match (&record.vendor_id, &self.vendor_id) {
            (Some(theirs), Some(ours)) => theirs == ours,
            _ => true,
        }
    }

    /// 完整执行一次握手，返回后端的会话结果
    pub async fn authenticate(&self, record: &WalletRecord) -> WalletResult<Value> {
        let public_key = &record.public_key;

        let challenge = self.backend.fetch_challenge(public_key).await?;
        tracing::debug!("{} challenge received for {}", self.wallet, record.short_key());

        let signature = self
            .adapter
            .sign_message(challenge.as_bytes(), public_key)
            .await?;
        let session = AuthSession {
            challenge,
            signature,
        };

        let payload = AuthPayload {
            wallet_name: record.wallet_name.as_str().to_string(),
            public_key: public_key.clone(),
            signature: encoding::encode_signature(self.chain, &session.signature),
            challenge: session.challenge,
        };
        self.backend
            .verify(AuthEndpoint::for_chain(self.chain), &payload)
            .await
    }

    /// 执行握手并发布结果，失败不向外传播
    pub async fn run(&self, record: &WalletRecord) {
        let event = match self.authenticate(record).await {
            Ok(session) => {
                tracing::info!(
                    "{} authenticated: {}",
                    self.wallet,
                    record.short_key()
                );
                AuthEvent::Authenticated {
                    wallet: self.wallet,
                    public_key: record.public_key.clone(),
                    session,
                }
            }
            Err(error) => {
                tracing::warn!(
                    "{} authentication failed for {} [{}]: {}",
                    self.wallet,
                    record.short_key(),
                    error.code(),
                    error
                );
                AuthEvent::Failed {
                    wallet: self.wallet,
                    public_key: record.public_key.clone(),
                    error,
                }
            }
        };
        // 没有观察者时忽略
        let _ = self.events.send(event);
    }

    /// 后台监听共享钱包状态；句柄被丢弃时任务终止
    ///
    /// 需要在 tokio 运行时内调用；没有运行时则只记录警告，返回的句柄不做任何事。
    pub fn spawn(self: Arc<Self>, store: &WalletStore) -> Subscription {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("{}: no async runtime, auth coordinator not started", self.wallet);
            return Subscription::new(|| {});
        };
        let mut changes = store.subscribe();

        let handle = runtime.spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        let Some(record) = change.record else {
                            continue;
                        };
                        if self.matches(&record) {
                            self.run(&record).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "{} auth coordinator missed {} wallet changes",
                            self.wallet,
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("{} auth coordinator stopped", self.wallet);
        });

        Subscription::from_task(handle)
    }
}
