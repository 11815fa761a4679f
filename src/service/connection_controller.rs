//! 连接控制器（每个钱包集成一个实例）
//!
//! UNDETECTED -> DETECTED -> CONNECTING -> CONNECTED -> DETECTED
//!
//! - 挂载时查询注册表，找不到 provider 则本会话内一直停留在 UNDETECTED
//! - 同一实例同时只有一个连接请求在途，重复触发直接返回 `InFlight`
//! - 所有 provider 调用的失败都收敛为本地状态与日志，不向外传播
//! - 适配器事件的同步部分（状态、清空共享状态）在派发时立即生效，
//!   需要等待的部分（重连、余额刷新）交给 tokio 任务

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError, Weak,
};

use crate::{
    config::WritePolicy,
    domain::{
        Affordance, ConnectionState, ProviderInfo, WalletDescriptor, WalletName, WalletRecord,
    },
    error::{WalletError, WalletResult},
    infrastructure::event_bus::Subscription,
    service::{
        balance::BalanceQuery,
        chain_adapter::{AdapterEvent, ChainAdapter},
        provider_registry::ProviderRegistry,
        wallet_store::WalletStore,
    },
    utils::address_validator::AddressValidator,
};

/// 一次连接操作的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    Connected(Arc<WalletRecord>),
    /// 已有连接请求在途，本次为空操作
    InFlight,
    /// 未发现 provider
    Unavailable,
    Failed(WalletError),
}

#[derive(Clone, Default)]
pub struct ControllerOptions {
    pub balance: Option<Arc<dyn BalanceQuery>>,
    pub write_policy: Option<WritePolicy>,
}

#[derive(Debug)]
struct ControllerState {
    state: ConnectionState,
    adapter: Option<ChainAdapter>,
    info: Option<ProviderInfo>,
    account: Option<String>,
    chain_id: Option<String>,
    last_error: Option<WalletError>,
}

struct Inner {
    descriptor: &'static WalletDescriptor,
    store: Arc<WalletStore>,
    balance: Option<Arc<dyn BalanceQuery>>,
    policy: WritePolicy,
    state: Mutex<ControllerState>,
    in_flight: AtomicBool,
    subscription: Mutex<Option<Subscription>>,
}

/// 事件处理中需要等待的后续动作
#[derive(Debug)]
enum FollowUp {
    /// 账户被清空后的静默重连（仅一次）
    Reconnect,
    /// 活跃账户变化后刷新共享状态中的记录
    Refresh(String),
}

/// 在途标记，Drop 时释放
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct ConnectionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionController")
            .field("wallet", &self.wallet())
            .field("state", &self.state())
            .field("account", &self.account())
            .finish()
    }
}

impl ConnectionController {
    pub fn new(wallet: WalletName, store: Arc<WalletStore>) -> Self {
        Self::with_options(wallet, store, ControllerOptions::default())
    }

    pub fn with_options(
        wallet: WalletName,
        store: Arc<WalletStore>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                descriptor: wallet.descriptor(),
                store,
                balance: options.balance,
                policy: options.write_policy.unwrap_or(WritePolicy::LastWriteWins),
                state: Mutex::new(ControllerState {
                    state: ConnectionState::Undetected,
                    adapter: None,
                    info: None,
                    account: None,
                    chain_id: None,
                    last_error: None,
                }),
                in_flight: AtomicBool::new(false),
                subscription: Mutex::new(None),
            }),
        }
    }

    // ========== 查询 ==========

    pub fn wallet(&self) -> WalletName {
        self.inner.descriptor.name
    }

    pub fn descriptor(&self) -> &'static WalletDescriptor {
        self.inner.descriptor
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn account(&self) -> Option<String> {
        self.lock().account.clone()
    }

    pub fn chain_id(&self) -> Option<String> {
        self.lock().chain_id.clone()
    }

    pub fn last_error(&self) -> Option<WalletError> {
        self.lock().last_error.clone()
    }

    pub fn adapter(&self) -> Option<ChainAdapter> {
        self.lock().adapter.clone()
    }

    pub fn provider_info(&self) -> Option<ProviderInfo> {
        self.lock().info.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn affordance(&self) -> Affordance {
        self.state().affordance(self.inner.descriptor.display_name)
    }

    // ========== 生命周期 ==========

    /// 挂载：查询注册表并订阅适配器事件
    pub fn mount(&self, registry: &ProviderRegistry) -> ConnectionState {
        let descriptor = self.inner.descriptor;

        let handle = match registry.find(&descriptor.lookup) {
            Some(handle) if handle.adapter.chain() == descriptor.chain => handle,
            Some(handle) => {
                tracing::warn!(
                    "{} provider {} is a {} adapter, expected {}",
                    descriptor.name,
                    handle.info.vendor_id,
                    handle.adapter.chain(),
                    descriptor.chain
                );
                self.lock().last_error = Some(WalletError::ProviderUnavailable(
                    descriptor.display_name.to_string(),
                ));
                return self.state();
            }
            None => {
                tracing::info!("{} not installed", descriptor.display_name);
                self.lock().last_error = Some(WalletError::ProviderUnavailable(
                    descriptor.display_name.to_string(),
                ));
                return self.state();
            }
        };

        let subscription = self.subscribe_adapter(&handle.adapter);
        *self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        let mut st = self.lock();
        st.adapter = Some(handle.adapter);
        st.info = Some(handle.info);
        st.last_error = None;
        Self::set_state(&mut st, descriptor.name, ConnectionState::Detected);
        st.state
    }

    /// 卸载：退订适配器事件
    pub fn unmount(&self) {
        let subscription = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            tracing::debug!("{} controller unmounted", self.wallet());
        }
    }

    fn subscribe_adapter(&self, adapter: &ChainAdapter) -> Subscription {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let runtime = tokio::runtime::Handle::try_current().ok();

        adapter.subscribe(move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let controller = ConnectionController { inner };
            let Some(follow_up) = controller.on_event(event) else {
                return;
            };
            match &runtime {
                Some(runtime) => {
                    runtime.spawn(async move {
                        controller.run_follow_up(follow_up).await;
                    });
                }
                None => tracing::warn!(
                    "{}: no async runtime, dropping {:?}",
                    controller.wallet(),
                    follow_up
                ),
            }
        })
    }

    // ========== 连接 / 断开 ==========

    /// 用户发起连接
    pub async fn connect(&self) -> ConnectOutcome {
        let Some(adapter) = self.adapter() else {
            let err = WalletError::ProviderUnavailable(
                self.inner.descriptor.display_name.to_string(),
            );
            tracing::warn!("Connect requested but {}", err);
            self.lock().last_error = Some(err);
            return ConnectOutcome::Unavailable;
        };

        let Some(_guard) = InFlightGuard::acquire(&self.inner.in_flight) else {
            tracing::debug!("{} connect already in flight", self.wallet());
            return ConnectOutcome::InFlight;
        };

        self.run_connect(&adapter).await
    }

    /// 调用方必须持有在途标记
    async fn run_connect(&self, adapter: &ChainAdapter) -> ConnectOutcome {
        let wallet = self.wallet();
        let generation = self.inner.store.generation();
        self.transition(ConnectionState::Connecting);

        let record = match self.establish(adapter).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!("{} connect failed: {}", wallet, err);
                self.fail(err.clone());
                return ConnectOutcome::Failed(err);
            }
        };

        match self.write_record(generation, record.clone()) {
            Ok(_) => {
                let mut st = self.lock();
                st.account = Some(record.public_key.clone());
                st.last_error = None;
                Self::set_state(&mut st, wallet, ConnectionState::Connected);
                drop(st);

                tracing::info!("{} connected: {}", wallet, record.short_key());
                ConnectOutcome::Connected(Arc::new(record))
            }
            Err(err) => {
                tracing::warn!("{} connect result discarded: {}", wallet, err);
                self.fail(err.clone());
                ConnectOutcome::Failed(err)
            }
        }
    }

    /// 连接并构造新记录（余额尽力而为）
    async fn establish(&self, adapter: &ChainAdapter) -> WalletResult<WalletRecord> {
        let descriptor = self.inner.descriptor;
        adapter.connect().await?;

        let account = adapter.accounts().into_iter().next().ok_or_else(|| {
            WalletError::ConnectionRejected(format!("{} returned no accounts", descriptor.name))
        })?;
        if !AddressValidator::validate(descriptor.chain, &account) {
            tracing::warn!(
                "{} returned an account that is not a valid {} address: {}",
                descriptor.name,
                descriptor.chain,
                account
            );
        }

        let info = self.provider_info();
        Ok(WalletRecord::new(descriptor.name, account.clone())
            .with_balance(self.query_balance(adapter, &account).await)
            .with_icon(info.as_ref().map(|i| i.icon_uri.clone()))
            .with_vendor_id(info.map(|i| i.vendor_id)))
    }

    async fn query_balance(&self, adapter: &ChainAdapter, account: &str) -> Option<f64> {
        let query = self.inner.balance.as_ref()?;
        match query.token_balance(adapter, account).await {
            Ok(balance) => Some(balance),
            Err(err) => {
                tracing::warn!("{} balance query failed: {}", self.wallet(), err);
                None
            }
        }
    }

    fn write_record(&self, generation: u64, record: WalletRecord) -> WalletResult<u64> {
        match self.inner.policy {
            WritePolicy::LastWriteWins => Ok(self.inner.store.set(record)),
            WritePolicy::RejectStale => self.inner.store.set_if_current(generation, record),
        }
    }

    /// 连接失败：回到 DETECTED，共享状态不变
    fn fail(&self, err: WalletError) {
        let mut st = self.lock();
        st.last_error = Some(err);
        Self::set_state(&mut st, self.wallet(), ConnectionState::Detected);
    }

    /// 用户发起断开
    ///
    /// 适配器断开失败只记录日志，共享状态照常清空。
    /// 只清空本钱包写入的记录：共享状态若已被其他钱包覆盖，该记录保持不变。
    /// 有连接在途时只清空共享状态，最终状态由在途的连接决定。
    pub async fn disconnect(&self) {
        let Some(adapter) = self.adapter() else {
            return;
        };

        if let Err(err) = adapter.disconnect().await {
            tracing::warn!("{} adapter disconnect failed: {}", self.wallet(), err);
        }
        self.drop_connection("user disconnect");
    }

    fn drop_connection(&self, reason: &str) {
        self.clear_own_record();
        if self.is_in_flight() {
            tracing::debug!("{} {} while connecting", self.wallet(), reason);
            return;
        }

        let mut st = self.lock();
        st.account = None;
        if st.state == ConnectionState::Connected {
            tracing::info!("{} disconnected ({})", self.wallet(), reason);
        }
        Self::set_state(&mut st, self.wallet(), ConnectionState::Detected);
    }

    /// 只清空属于本钱包的记录
    fn clear_own_record(&self) {
        let store = &self.inner.store;
        match store.get() {
            Some(record) if record.wallet_name == self.wallet() => {
                store.clear();
            }
            Some(record) => tracing::debug!(
                "{}: shared state belongs to {}, left untouched",
                self.wallet(),
                record.wallet_name
            ),
            None => {}
        }
    }

    // ========== 适配器事件 ==========

    /// 处理一个适配器事件，并等待其后续动作完成
    pub async fn handle_event(&self, event: AdapterEvent) {
        if let Some(follow_up) = self.on_event(event) {
            self.run_follow_up(follow_up).await;
        }
    }

    fn on_event(&self, event: AdapterEvent) -> Option<FollowUp> {
        let wallet = self.wallet();

        match event {
            AdapterEvent::Connect(None) => {
                tracing::debug!("{} provider connected", wallet);
                None
            }
            AdapterEvent::Connect(Some(public_key)) => {
                // 只有用户发起的连接会写共享状态
                tracing::debug!("{} provider connected: {}", wallet, public_key);
                None
            }
            AdapterEvent::Disconnect => {
                self.drop_connection("provider disconnect event");
                None
            }
            AdapterEvent::ChainChanged(chain_id) => {
                tracing::info!("{} chain changed: {}", wallet, chain_id);
                self.lock().chain_id = Some(chain_id);
                None
            }
            AdapterEvent::AccountChanged(Some(public_key)) => {
                let mut st = self.lock();
                if st.state != ConnectionState::Connected
                    || st.account.as_deref() == Some(public_key.as_str())
                {
                    return None;
                }
                tracing::info!("{} account changed: {}", wallet, public_key);
                st.account = Some(public_key.clone());
                drop(st);

                match self.inner.store.get() {
                    Some(record)
                        if record.wallet_name == wallet && record.public_key != public_key =>
                    {
                        Some(FollowUp::Refresh(public_key))
                    }
                    _ => None,
                }
            }
            AdapterEvent::AccountChanged(None) => {
                if self.state() != ConnectionState::Connected {
                    return None;
                }
                tracing::info!("{} account cleared, reconnecting", wallet);
                Some(FollowUp::Reconnect)
            }
        }
    }

    async fn run_follow_up(&self, follow_up: FollowUp) {
        match follow_up {
            FollowUp::Reconnect => self.reconnect().await,
            FollowUp::Refresh(public_key) => self.refresh_record(public_key).await,
        }
    }

    /// 静默重连一次，失败则回到 DETECTED 并清空共享状态
    async fn reconnect(&self) {
        let Some(adapter) = self.adapter() else {
            return;
        };
        let Some(_guard) = InFlightGuard::acquire(&self.inner.in_flight) else {
            tracing::debug!("{} reconnect skipped, connect in flight", self.wallet());
            return;
        };

        if let ConnectOutcome::Failed(err) = self.run_connect(&adapter).await {
            tracing::warn!("{} reconnect failed: {}", self.wallet(), err);
            self.clear_own_record();
            let mut st = self.lock();
            st.account = None;
            Self::set_state(&mut st, self.wallet(), ConnectionState::Detected);
        }
    }

    /// 读-改-写：替换公钥并尽力刷新余额
    ///
    /// 无论写入策略如何都按代数条件写入；期间共享状态变化或已断开则放弃刷新。
    async fn refresh_record(&self, public_key: String) {
        let Some(adapter) = self.adapter() else {
            return;
        };
        let generation = self.inner.store.generation();
        let Some(current) = self.inner.store.get() else {
            return;
        };
        if current.wallet_name != self.wallet() {
            return;
        }

        let mut record = (*current).clone();
        record.public_key = public_key.clone();
        record.token_balance = self.query_balance(&adapter, &public_key).await;

        if self.state() != ConnectionState::Connected {
            tracing::debug!("{} account refresh dropped, no longer connected", self.wallet());
            return;
        }
        if let Err(err) = self.inner.store.set_if_current(generation, record) {
            tracing::debug!("{} account refresh discarded: {}", self.wallet(), err);
        }
    }

    // ========== 状态机 ==========

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, to: ConnectionState) {
        let mut st = self.lock();
        Self::set_state(&mut st, self.wallet(), to);
    }

    fn set_state(st: &mut ControllerState, wallet: WalletName, to: ConnectionState) {
        if st.state == to {
            return;
        }
        if !ConnectionState::can_transition(st.state, to) {
            tracing::debug!(
                "{}: ignoring transition {} -> {}",
                wallet,
                st.state.as_str(),
                to.as_str()
            );
            return;
        }
        tracing::debug!(
            "{} state: {} -> {}",
            wallet,
            st.state.as_str(),
            to.as_str()
        );
        st.state = to;
    }
}
