//! walletauth 演示入口
//!
//! 用本地软件钱包代替浏览器扩展，走完 发现 -> 连接 -> 认证 -> 查询 -> 断开 全流程。
//! 用法：`walletauth [metamask|okxwallet|phantom]`

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use walletauth::{
    config::Config,
    domain::{InjectedProvider, ProviderBus, ProviderDetail, ProviderInfo, WalletName},
    infrastructure::{
        backend_client::BackendClient,
        logging,
        software_wallet::{SoftwareEvmWallet, SoftwareSolanaWallet},
    },
    service::{
        balance, AuthCoordinator, AuthEvent, ConnectOutcome, ConnectionController,
        ControllerOptions, ProviderRegistry, WalletStore,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;
    config.validate().context("Invalid configuration")?;
    logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    let wallet = match std::env::args().nth(1) {
        Some(arg) => WalletName::from_alias(&arg)
            .with_context(|| format!("Unknown wallet {:?} (metamask, okxwallet, phantom)", arg))?,
        None => WalletName::Metamask,
    };
    tracing::info!("Starting walletauth demo with {}", wallet);

    // 模拟页面中已安装的三个扩展
    let bus = ProviderBus::new();
    let _announcements = vec![
        ProviderDetail {
            info: ProviderInfo::new("io.metamask", "MetaMask", ""),
            provider: InjectedProvider::Evm(Arc::new(SoftwareEvmWallet::random())),
        }
        .announce_on(&bus),
        ProviderDetail {
            info: ProviderInfo::new("com.okex.wallet", "OKX Wallet", ""),
            provider: InjectedProvider::Evm(Arc::new(SoftwareEvmWallet::random())),
        }
        .announce_on(&bus),
        ProviderDetail {
            info: ProviderInfo::new("app.phantom", "Phantom", ""),
            provider: InjectedProvider::Solana(Arc::new(SoftwareSolanaWallet::random())),
        }
        .announce_on(&bus),
    ];

    let registry = ProviderRegistry::new(&bus);
    let store = Arc::new(WalletStore::new(config.state.change_buffer));
    let backend = Arc::new(BackendClient::new(&config.backend)?);

    let mut controllers = Vec::new();
    let mut coordinator_tasks = Vec::new();
    let mut auth_events = None;

    for name in [WalletName::Metamask, WalletName::Okxwallet, WalletName::Phantom] {
        let options = ControllerOptions {
            balance: balance::balance_query_for(name.descriptor().chain, &config.wallets)?,
            write_policy: Some(config.state.write_policy),
        };
        let controller = ConnectionController::with_options(name, store.clone(), options);
        let state = controller.mount(&registry);
        tracing::info!("{}: {} ({})", name, controller.affordance().label, state.as_str());

        if let Some(coordinator) = AuthCoordinator::for_controller(&controller, backend.clone())
        {
            let coordinator = Arc::new(coordinator);
            if name == wallet {
                auth_events = Some(coordinator.subscribe_events());
            }
            coordinator_tasks.push(coordinator.spawn(&store));
        }
        controllers.push(controller);
    }

    let controller = controllers
        .iter()
        .find(|c| c.wallet() == wallet)
        .context("Controller not mounted")?;

    match controller.connect().await {
        ConnectOutcome::Connected(record) => {
            tracing::info!("Connected: {}", serde_json::to_string(&*record)?);
        }
        ConnectOutcome::Unavailable => anyhow::bail!("{} is not installed", wallet),
        ConnectOutcome::InFlight => anyhow::bail!("A connection is already in progress"),
        ConnectOutcome::Failed(e) => anyhow::bail!("Connection failed: {}", e),
    }

    if let Some(mut events) = auth_events {
        let wait = Duration::from_secs(config.backend.request_timeout_secs + 5);
        match tokio::time::timeout(wait, events.recv()).await {
            Ok(Ok(AuthEvent::Authenticated { session, .. })) => {
                tracing::info!("Authenticated, session: {}", session);
            }
            Ok(Ok(AuthEvent::Failed { error, .. })) => {
                tracing::warn!("Authentication failed: {}", error);
            }
            Ok(Err(e)) => tracing::warn!("Auth event channel closed: {}", e),
            Err(_) => tracing::warn!("No authentication result within {:?}", wait),
        }
    }

    match backend.token_amount().await {
        Ok(amount) => tracing::info!("Token amount: {}", amount),
        Err(e) => tracing::warn!("Token amount unavailable: {}", e),
    }
    match backend.profile().await {
        Ok(Some(profile)) => tracing::info!("Profile: {}", profile),
        Ok(None) => tracing::info!("Please log in first"),
        Err(e) => tracing::warn!("Profile unavailable: {}", e),
    }

    controller.disconnect().await;
    tracing::info!("{}: {}", wallet, controller.affordance().label);

    drop(coordinator_tasks);
    Ok(())
}
