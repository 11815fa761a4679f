//! 钱包集成目录
//!
//! 统一钱包名称、所属链与 provider 查找方式

use std::{collections::HashMap, fmt};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// 链类型：决定签名编码与认证端点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Evm,
    Solana,
}

impl ChainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Solana => "solana",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 已集成的钱包
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletName {
    Metamask,
    Okxwallet,
    Phantom,
}

impl WalletName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metamask => "metamask",
            Self::Okxwallet => "okxwallet",
            Self::Phantom => "phantom",
        }
    }

    /// 按规范名或别名解析（大小写不敏感）
    pub fn from_alias(s: &str) -> Option<Self> {
        WALLET_ALIASES
            .get(s.trim().to_ascii_lowercase().as_str())
            .copied()
    }

    pub fn descriptor(&self) -> &'static WalletDescriptor {
        match self {
            Self::Metamask => &WALLET_CATALOGUE[0],
            Self::Okxwallet => &WALLET_CATALOGUE[1],
            Self::Phantom => &WALLET_CATALOGUE[2],
        }
    }
}

impl fmt::Display for WalletName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// provider 查找方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderLookup {
    /// 按展示名称（大小写不敏感）
    ByDisplayName(&'static str),
    /// 按厂商反向域名标识（精确匹配）
    ByVendorId(&'static str),
}

/// 钱包集成描述
#[derive(Debug, Clone)]
pub struct WalletDescriptor {
    pub name: WalletName,
    pub display_name: &'static str,
    pub chain: ChainKind,
    pub lookup: ProviderLookup,
    pub aliases: &'static [&'static str],
}

pub static WALLET_CATALOGUE: Lazy<Vec<WalletDescriptor>> = Lazy::new(|| {
    vec![
        WalletDescriptor {
            name: WalletName::Metamask,
            display_name: "MetaMask",
            chain: ChainKind::Evm,
            lookup: ProviderLookup::ByDisplayName("metamask"),
            aliases: &["metamask", "meta mask", "io.metamask"],
        },
        WalletDescriptor {
            name: WalletName::Okxwallet,
            display_name: "OKX Wallet",
            chain: ChainKind::Evm,
            lookup: ProviderLookup::ByVendorId("com.okex.wallet"),
            aliases: &["okxwallet", "okx wallet", "okx", "com.okex.wallet"],
        },
        WalletDescriptor {
            name: WalletName::Phantom,
            display_name: "Phantom",
            chain: ChainKind::Solana,
            lookup: ProviderLookup::ByVendorId("app.phantom"),
            aliases: &["phantom", "app.phantom"],
        },
    ]
});

static WALLET_ALIASES: Lazy<HashMap<&'static str, WalletName>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for descriptor in WALLET_CATALOGUE.iter() {
        for alias in descriptor.aliases {
            map.insert(*alias, descriptor.name);
        }
    }
    map
});
