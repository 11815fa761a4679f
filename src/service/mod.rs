pub mod auth_coordinator; // 挑战-签名-校验握手
pub mod balance;
pub mod chain_adapter;
pub mod connection_controller; // 每个钱包集成一个状态机
pub mod provider_registry;
pub mod wallet_store;

pub use auth_coordinator::{AuthCoordinator, AuthEvent};
pub use chain_adapter::{AdapterEvent, ChainAdapter};
pub use connection_controller::{ConnectOutcome, ConnectionController, ControllerOptions};
pub use provider_registry::{ProviderHandle, ProviderRegistry};
pub use wallet_store::{WalletChange, WalletStore};
