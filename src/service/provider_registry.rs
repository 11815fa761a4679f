//! Provider 注册表
//! 监听 EIP-6963 公告，按展示名称去重，提供按名称 / 厂商标识查找

use std::sync::{Arc, PoisonError, RwLock};

use crate::{
    domain::{DiscoveryEvent, ProviderBus, ProviderDetail, ProviderInfo, ProviderLookup},
    infrastructure::event_bus::Subscription,
    service::chain_adapter::ChainAdapter,
};

/// 已发现的 provider
#[derive(Debug, Clone)]
pub struct ProviderHandle {
    pub info: ProviderInfo,
    pub adapter: ChainAdapter,
}

/// 注册表只增不减：公告协议中没有"撤回"事件
pub struct ProviderRegistry {
    handles: Arc<RwLock<Vec<ProviderHandle>>>,
    _subscription: Subscription,
}

impl ProviderRegistry {
    /// 订阅公告并广播一次发现请求
    pub fn new(bus: &ProviderBus) -> Self {
        let handles: Arc<RwLock<Vec<ProviderHandle>>> = Arc::new(RwLock::new(Vec::new()));

        let sink = handles.clone();
        let subscription = bus.subscribe(move |event| {
            if let DiscoveryEvent::AnnounceProvider(detail) = event {
                Self::register(&sink, detail);
            }
        });

        // 先订阅再请求，响应式公告的钱包也能被捕获
        bus.dispatch(&DiscoveryEvent::RequestProvider);

        Self {
            handles,
            _subscription: subscription,
        }
    }

    /// 处理一次公告，返回是否新增
    pub fn on_announcement(&self, detail: &ProviderDetail) -> bool {
        Self::register(&self.handles, detail)
    }

    fn register(handles: &RwLock<Vec<ProviderHandle>>, detail: &ProviderDetail) -> bool {
        let mut handles = handles.write().unwrap_or_else(PoisonError::into_inner);

        // 首次公告获胜
        if handles
            .iter()
            .any(|h| h.info.display_name == detail.info.display_name)
        {
            tracing::trace!(
                "Duplicate provider announcement ignored: {}",
                detail.info.display_name
            );
            return false;
        }

        tracing::info!(
            "Provider announced: {} ({}, {})",
            detail.info.display_name,
            detail.info.vendor_id,
            detail.provider.chain()
        );
        handles.push(ProviderHandle {
            info: detail.info.clone(),
            adapter: ChainAdapter::from_injected(&detail.provider),
        });
        true
    }

    /// 按厂商反向域名精确查找
    pub fn find_by_vendor_id(&self, vendor_id: &str) -> Option<ProviderHandle> {
        self.read()
            .iter()
            .find(|h| h.info.vendor_id == vendor_id)
            .cloned()
    }

    /// 按展示名称查找（大小写不敏感）
    pub fn find_by_display_name(&self, name: &str) -> Option<ProviderHandle> {
        self.read()
            .iter()
            .find(|h| h.info.display_name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn find(&self, lookup: &ProviderLookup) -> Option<ProviderHandle> {
        match lookup {
            ProviderLookup::ByDisplayName(name) => self.find_by_display_name(name),
            ProviderLookup::ByVendorId(id) => self.find_by_vendor_id(id),
        }
    }

    /// 当前所有 provider 的快照（按公告顺序）
    pub fn providers(&self) -> Vec<ProviderHandle> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ProviderHandle>> {
        self.handles.read().unwrap_or_else(PoisonError::into_inner)
    }
}
