//! 连接生命周期集成测试

mod common;

use std::{sync::Arc, time::Duration};

use walletauth::{
    config::WritePolicy,
    domain::{ConnectionState, InjectedProvider, ProviderBus, WalletName},
    infrastructure::software_wallet::{SoftwareEvmWallet, SoftwareSolanaWallet},
    service::{
        AuthCoordinator, ConnectOutcome, ConnectionController, ControllerOptions,
        ProviderRegistry, WalletStore,
    },
};

use common::{announce, FakeBackend};

/// 等待后台任务使条件成立
async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn test_catalogue_lookups() {
    let bus = ProviderBus::new();
    // 展示名称大小写与目录不同，仍能匹配
    let _metamask = announce(
        &bus,
        "io.metamask",
        "METAMASK",
        InjectedProvider::Evm(Arc::new(SoftwareEvmWallet::random())),
    );
    let _okx = announce(
        &bus,
        "com.okex.wallet",
        "OKX Wallet",
        InjectedProvider::Evm(Arc::new(SoftwareEvmWallet::random())),
    );
    let _phantom = announce(
        &bus,
        "app.phantom",
        "Phantom",
        InjectedProvider::Solana(Arc::new(SoftwareSolanaWallet::random())),
    );
    let registry = ProviderRegistry::new(&bus);
    assert_eq!(registry.len(), 3);

    let store = Arc::new(WalletStore::default());
    for name in [WalletName::Metamask, WalletName::Okxwallet, WalletName::Phantom] {
        let controller = ConnectionController::new(name, store.clone());
        assert_eq!(controller.mount(&registry), ConnectionState::Detected, "{}", name);
        assert_eq!(
            controller.affordance().label,
            format!("Connect to {}", name.descriptor().display_name)
        );
    }
}

#[tokio::test]
async fn test_no_provider_means_no_http_calls() {
    let backend = FakeBackend::start("xyz").await;
    let bus = ProviderBus::new();
    let registry = ProviderRegistry::new(&bus);
    let store = Arc::new(WalletStore::default());

    let controller = ConnectionController::new(WalletName::Phantom, store.clone());
    assert_eq!(controller.mount(&registry), ConnectionState::Undetected);
    assert!(AuthCoordinator::for_controller(&controller, backend.client()).is_none());
    assert_eq!(controller.connect().await, ConnectOutcome::Unavailable);

    // 之后才出现的 provider 不会被已挂载的控制器发现
    let _late = announce(
        &bus,
        "app.phantom",
        "Phantom",
        InjectedProvider::Solana(Arc::new(SoftwareSolanaWallet::random())),
    );
    assert_eq!(registry.len(), 1);
    assert_eq!(controller.state(), ConnectionState::Undetected);
    assert!(!controller.affordance().enabled);

    assert!(store.get().is_none());
    assert_eq!(backend.total_requests(), 0);
}

#[tokio::test]
async fn test_two_wallets_race_last_write_wins() {
    let evm = Arc::new(SoftwareEvmWallet::random());
    let solana = Arc::new(SoftwareSolanaWallet::random());
    evm.set_approval_delay(Some(Duration::from_millis(30)));
    solana.set_approval_delay(Some(Duration::from_millis(60)));

    let bus = ProviderBus::new();
    let _metamask = announce(&bus, "io.metamask", "MetaMask", InjectedProvider::Evm(evm));
    let _phantom = announce(
        &bus,
        "app.phantom",
        "Phantom",
        InjectedProvider::Solana(solana.clone()),
    );
    let registry = ProviderRegistry::new(&bus);
    let store = Arc::new(WalletStore::default());

    let metamask = ConnectionController::new(WalletName::Metamask, store.clone());
    let phantom = ConnectionController::new(WalletName::Phantom, store.clone());
    metamask.mount(&registry);
    phantom.mount(&registry);

    let (a, b) = tokio::join!(metamask.connect(), phantom.connect());
    assert!(matches!(a, ConnectOutcome::Connected(_)));
    assert!(matches!(b, ConnectOutcome::Connected(_)));

    // 两者都认为自己已连接，共享状态由最后写入者决定
    assert_eq!(metamask.state(), ConnectionState::Connected);
    assert_eq!(phantom.state(), ConnectionState::Connected);
    assert_eq!(store.generation(), 2);
    assert_eq!(store.get().unwrap().public_key, solana.address());
}

#[tokio::test]
async fn test_reject_stale_policy_keeps_newer_record() {
    let evm = Arc::new(SoftwareEvmWallet::random());
    let solana = Arc::new(SoftwareSolanaWallet::random());
    evm.set_approval_delay(Some(Duration::from_millis(60)));

    let bus = ProviderBus::new();
    let _metamask = announce(&bus, "io.metamask", "MetaMask", InjectedProvider::Evm(evm));
    let _phantom = announce(
        &bus,
        "app.phantom",
        "Phantom",
        InjectedProvider::Solana(solana.clone()),
    );
    let registry = ProviderRegistry::new(&bus);
    let store = Arc::new(WalletStore::default());

    let strict = ControllerOptions {
        balance: None,
        write_policy: Some(WritePolicy::RejectStale),
    };
    let metamask =
        ConnectionController::with_options(WalletName::Metamask, store.clone(), strict.clone());
    let phantom = ConnectionController::with_options(WalletName::Phantom, store.clone(), strict);
    metamask.mount(&registry);
    phantom.mount(&registry);

    let (a, b) = tokio::join!(metamask.connect(), phantom.connect());
    assert!(matches!(b, ConnectOutcome::Connected(_)));
    match a {
        ConnectOutcome::Failed(err) => assert_eq!(err.code(), "stale_write"),
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(metamask.state(), ConnectionState::Detected);
    assert_eq!(store.generation(), 1);
    assert_eq!(store.get().unwrap().wallet_name, WalletName::Phantom);
}

#[tokio::test]
async fn test_provider_account_cleared_then_reconnect_fails() {
    let solana = Arc::new(SoftwareSolanaWallet::random());
    let bus = ProviderBus::new();
    let _phantom = announce(
        &bus,
        "app.phantom",
        "Phantom",
        InjectedProvider::Solana(solana.clone()),
    );
    let registry = ProviderRegistry::new(&bus);
    let store = Arc::new(WalletStore::default());

    let controller = ConnectionController::new(WalletName::Phantom, store.clone());
    controller.mount(&registry);
    controller.connect().await;
    assert!(store.get().is_some());

    solana.set_rejecting(true);
    solana.simulate_account_changed(None);

    eventually(|| controller.state() == ConnectionState::Detected).await;
    assert_eq!(solana.call_count("connect"), 2);
    assert!(store.get().is_none());
    assert_eq!(controller.account(), None);
    assert_eq!(
        controller.last_error().unwrap().code(),
        "connection_rejected"
    );
}

#[tokio::test]
async fn test_user_disconnect_reaches_provider() {
    let solana = Arc::new(SoftwareSolanaWallet::random());
    let bus = ProviderBus::new();
    let _phantom = announce(
        &bus,
        "app.phantom",
        "Phantom",
        InjectedProvider::Solana(solana.clone()),
    );
    let registry = ProviderRegistry::new(&bus);
    let store = Arc::new(WalletStore::default());

    let controller = ConnectionController::new(WalletName::Phantom, store.clone());
    controller.mount(&registry);
    controller.connect().await;
    assert!(solana.is_connected());

    controller.disconnect().await;
    assert!(!solana.is_connected());
    assert_eq!(solana.call_count("disconnect"), 1);
    assert_eq!(controller.state(), ConnectionState::Detected);
    assert_eq!(controller.affordance().label, "Connect to Phantom");
    assert!(store.get().is_none());

    // 断开后可以再次连接
    assert!(matches!(
        controller.connect().await,
        ConnectOutcome::Connected(_)
    ));
}
