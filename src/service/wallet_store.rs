//! 共享钱包状态
//!
//! 进程内唯一的"当前钱包"槽位：只有整体替换（set）与清空（clear），没有部分更新。
//! 每次写入递增代数并广播变更；读者拿到的是不可变快照。

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::{
    domain::WalletRecord,
    error::{WalletError, WalletResult},
};

/// 一次状态变更
#[derive(Debug, Clone)]
pub struct WalletChange {
    pub generation: u64,
    pub record: Option<Arc<WalletRecord>>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    record: Option<Arc<WalletRecord>>,
}

#[derive(Debug)]
pub struct WalletStore {
    slot: RwLock<Slot>,
    changes: broadcast::Sender<WalletChange>,
}

impl Default for WalletStore {
    fn default() -> Self {
        Self::new(64)
    }
}

impl WalletStore {
    pub fn new(change_buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(change_buffer.max(1));
        Self {
            slot: RwLock::new(Slot::default()),
            changes,
        }
    }

    /// 当前记录快照
    pub fn get(&self) -> Option<Arc<WalletRecord>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .record
            .clone()
    }

    /// 当前代数，每次写入（含清空）加一
    pub fn generation(&self) -> u64 {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    /// 整体替换，最后写入者获胜
    pub fn set(&self, record: WalletRecord) -> u64 {
        self.write(Some(Arc::new(record)))
    }

    pub fn clear(&self) -> u64 {
        self.write(None)
    }

    /// 仅当代数仍为 `expected` 时写入，否则拒绝陈旧写入
    pub fn set_if_current(&self, expected: u64, record: WalletRecord) -> WalletResult<u64> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.generation != expected {
            return Err(WalletError::StaleWrite {
                expected,
                current: slot.generation,
            });
        }
        Ok(Self::apply(&mut slot, &self.changes, Some(Arc::new(record))))
    }

    /// 订阅变更；订阅之前发生的变更不会补发
    pub fn subscribe(&self) -> broadcast::Receiver<WalletChange> {
        self.changes.subscribe()
    }

    fn write(&self, record: Option<Arc<WalletRecord>>) -> u64 {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        Self::apply(&mut slot, &self.changes, record)
    }

    // 持锁广播，保证订阅者看到的顺序与代数一致
    fn apply(
        slot: &mut Slot,
        changes: &broadcast::Sender<WalletChange>,
        record: Option<Arc<WalletRecord>>,
    ) -> u64 {
        slot.generation += 1;
        slot.record = record.clone();

        match &record {
            Some(r) => tracing::info!(
                "Wallet state updated: {} {} (generation {})",
                r.wallet_name,
                r.short_key(),
                slot.generation
            ),
            None => tracing::info!("Wallet state cleared (generation {})", slot.generation),
        }

        // 没有订阅者时 send 返回错误，可以忽略
        let _ = changes.send(WalletChange {
            generation: slot.generation,
            record,
        });
        slot.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WalletName;

    fn record(key: &str) -> WalletRecord {
        WalletRecord::new(WalletName::Metamask, key)
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let store = WalletStore::default();
        let r = record("0xAA").with_balance(Some(1.5));
        store.set(r.clone());
        assert_eq!(store.get().as_deref(), Some(&r));
    }

    #[test]
    fn test_set_replaces_without_merge() {
        let store = WalletStore::default();
        store.set(
            record("0xAA")
                .with_balance(Some(3.0))
                .with_icon(Some("icon".into())),
        );
        let replacement = WalletRecord::new(WalletName::Phantom, "pk");
        store.set(replacement.clone());

        let current = store.get().unwrap();
        assert_eq!(*current, replacement);
        assert_eq!(current.token_balance, None);
        assert_eq!(current.icon, None);
    }

    #[test]
    fn test_clear_always_absent() {
        let store = WalletStore::default();
        store.clear();
        assert!(store.get().is_none());
        store.set(record("0xAA"));
        store.clear();
        assert!(store.get().is_none());
        assert_eq!(store.generation(), 3);
    }

    #[test]
    fn test_set_if_current_rejects_stale() {
        let store = WalletStore::default();
        let snapshot = store.generation();
        store.set(record("0xAA"));

        let err = store.set_if_current(snapshot, record("0xBB")).unwrap_err();
        assert_eq!(
            err,
            WalletError::StaleWrite {
                expected: 0,
                current: 1
            }
        );
        assert_eq!(store.get().unwrap().public_key, "0xAA");

        assert!(store.set_if_current(1, record("0xCC")).is_ok());
        assert_eq!(store.get().unwrap().public_key, "0xCC");
    }

    #[tokio::test]
    async fn test_every_change_is_broadcast_in_order() {
        let store = WalletStore::default();
        let mut rx = store.subscribe();

        store.set(record("0xAA"));
        store.set(record("0xAA"));
        store.clear();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(second.record.unwrap().public_key, "0xAA");
        assert!(third.record.is_none());
    }
}
