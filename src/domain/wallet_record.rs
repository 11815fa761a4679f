//! 当前连接钱包的记录（共享钱包状态的唯一取值）

use serde::{Deserialize, Serialize};

use super::wallet_kind::WalletName;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub wallet_name: WalletName,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
}

impl WalletRecord {
    pub fn new(wallet_name: WalletName, public_key: impl Into<String>) -> Self {
        Self {
            wallet_name,
            public_key: public_key.into(),
            token_balance: None,
            icon: None,
            vendor_id: None,
        }
    }

    pub fn with_balance(mut self, balance: Option<f64>) -> Self {
        self.token_balance = balance;
        self
    }

    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = icon;
        self
    }

    pub fn with_vendor_id(mut self, vendor_id: Option<String>) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    /// 缩略公钥，用于日志与展示
    pub fn short_key(&self) -> String {
        let key = &self.public_key;
        if key.len() <= 12 || !key.is_ascii() {
            return key.clone();
        }
        format!("{}…{}", &key[..6], &key[key.len() - 4..])
    }
}
