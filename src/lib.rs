//! walletauth - 注入式钱包发现、连接与挑战-签名认证
//!
//! 支持 EIP-6963 多钱包发现，EVM（EIP-1193）与 Solana 两类 provider

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use error::{WalletError, WalletResult};

pub mod prelude {
    pub use crate::{
        config::{Config, WritePolicy},
        domain::{
            ChainKind, ConnectionState, InjectedProvider, ProviderBus, ProviderDetail,
            ProviderInfo, WalletName, WalletRecord,
        },
        error::{WalletError, WalletResult},
        infrastructure::backend_client::{AuthBackend, BackendClient},
        service::{
            AuthCoordinator, AuthEvent, ConnectOutcome, ConnectionController, ProviderRegistry,
            WalletStore,
        },
    };
}
