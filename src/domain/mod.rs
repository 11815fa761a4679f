//! 领域模型

pub mod connection_state;
pub mod provider;
pub mod wallet_kind;
pub mod wallet_record;

pub use connection_state::{Affordance, ConnectionState};
pub use provider::{
    DiscoveryEvent, Eip1193Event, Eip1193Provider, InjectedProvider, ProviderBus, ProviderDetail,
    ProviderInfo, SolanaEvent, SolanaProvider,
};
pub use wallet_kind::{ChainKind, ProviderLookup, WalletDescriptor, WalletName, WALLET_CATALOGUE};
pub use wallet_record::WalletRecord;
