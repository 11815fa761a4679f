//! 余额查询
//!
//! - EVM：通过钱包的 `eth_call` 读取 ERC-20 `balanceOf` 与 `decimals`
//! - Solana：直接请求 JSON-RPC `getBalance`（lamports / 10^9）
//!
//! 查询失败不影响连接，只是不写入 `tokenBalance`

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde_json::{json, Value};

use crate::{
    config::WalletsConfig,
    domain::ChainKind,
    error::{WalletError, WalletResult},
    service::chain_adapter::ChainAdapter,
    utils::encoding,
};

/// `balanceOf(address)` 选择器
const BALANCE_OF_SELECTOR: &str = "70a08231";
/// `decimals()` 选择器
const DECIMALS_SELECTOR: &str = "313ce567";

const LAMPORTS_PER_SOL: f64 = 1e9;

#[async_trait]
pub trait BalanceQuery: Send + Sync {
    async fn token_balance(&self, adapter: &ChainAdapter, account: &str) -> WalletResult<f64>;
}

/// 按链选择余额查询实现；关闭余额查询时返回 `None`
pub fn balance_query_for(
    chain: ChainKind,
    config: &WalletsConfig,
) -> WalletResult<Option<Arc<dyn BalanceQuery>>> {
    if !config.fetch_balances {
        return Ok(None);
    }
    let query: Arc<dyn BalanceQuery> = match chain {
        ChainKind::Evm => Arc::new(Erc20BalanceQuery::new(&config.erc20_token_address)),
        ChainKind::Solana => Arc::new(SolanaRpcBalanceQuery::new(&config.solana_rpc_url)?),
    };
    Ok(Some(query))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ERC-20
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct Erc20BalanceQuery {
    token_address: String,
}

impl Erc20BalanceQuery {
    pub fn new(token_address: impl Into<String>) -> Self {
        Self {
            token_address: token_address.into(),
        }
    }

    /// `balanceOf` 调用数据：选择器 + 左补零到 32 字节的地址
    fn balance_of_data(account: &str) -> WalletResult<String> {
        let address = account.strip_prefix("0x").unwrap_or(account);
        if address.len() != 40 || !address.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WalletError::BalanceQueryFailed(format!(
                "not an EVM address: {}",
                account
            )));
        }
        Ok(format!(
            "0x{}{:0>64}",
            BALANCE_OF_SELECTOR,
            address.to_ascii_lowercase()
        ))
    }

    async fn eth_call(&self, adapter: &ChainAdapter, data: String) -> WalletResult<u128> {
        let result = adapter
            .request(
                "eth_call",
                vec![json!({ "to": self.token_address, "data": data }), json!("latest")],
            )
            .await
            .map_err(|e| WalletError::BalanceQueryFailed(e.to_string()))?;

        let hex_result = result.as_str().ok_or_else(|| {
            WalletError::BalanceQueryFailed(format!("eth_call returned {}", result))
        })?;
        parse_uint256(hex_result)
    }
}

/// 解析 ABI 编码的 uint256；超出 u128 视为失败
fn parse_uint256(value: &str) -> WalletResult<u128> {
    let bytes = encoding::decode_hex(value)
        .map_err(|e| WalletError::BalanceQueryFailed(format!("invalid eth_call result: {}", e)))?;
    if bytes.is_empty() {
        return Err(WalletError::BalanceQueryFailed("empty eth_call result".into()));
    }

    let (high, low) = bytes.split_at(bytes.len().saturating_sub(16));
    if high.iter().any(|b| *b != 0) {
        return Err(WalletError::BalanceQueryFailed(
            "uint256 value exceeds u128".into(),
        ));
    }
    Ok(low.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
}

/// 原始数量按精度格式化
fn format_units(raw: u128, decimals: u32) -> WalletResult<f64> {
    let mantissa = i128::try_from(raw)
        .map_err(|_| WalletError::BalanceQueryFailed("token amount overflow".into()))?;
    let amount = Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map_err(|e| WalletError::BalanceQueryFailed(e.to_string()))?;
    amount
        .to_f64()
        .ok_or_else(|| WalletError::BalanceQueryFailed("token amount not representable".into()))
}

#[async_trait]
impl BalanceQuery for Erc20BalanceQuery {
    async fn token_balance(&self, adapter: &ChainAdapter, account: &str) -> WalletResult<f64> {
        let raw = self
            .eth_call(adapter, Self::balance_of_data(account)?)
            .await?;
        let decimals = self
            .eth_call(adapter, format!("0x{}", DECIMALS_SELECTOR))
            .await?;
        let decimals = u32::try_from(decimals)
            .map_err(|_| WalletError::BalanceQueryFailed("decimals out of range".into()))?;

        let balance = format_units(raw, decimals)?;
        tracing::debug!(
            "ERC-20 balance of {} at {}: {}",
            account,
            self.token_address,
            balance
        );
        Ok(balance)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Solana
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct SolanaRpcBalanceQuery {
    rpc_url: String,
    client: reqwest::Client,
}

impl SolanaRpcBalanceQuery {
    pub fn new(rpc_url: &str) -> WalletResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WalletError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl BalanceQuery for SolanaRpcBalanceQuery {
    async fn token_balance(&self, _adapter: &ChainAdapter, account: &str) -> WalletResult<f64> {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getBalance",
            "params": [account]
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| WalletError::BalanceQueryFailed(e.to_string()))?;

        let result: Value = response
            .json()
            .await
            .map_err(|e| WalletError::BalanceQueryFailed(e.to_string()))?;

        let lamports = result["result"]["value"].as_u64().ok_or_else(|| {
            WalletError::BalanceQueryFailed(format!("invalid getBalance response: {}", result))
        })?;

        let balance = lamports as f64 / LAMPORTS_PER_SOL;
        tracing::debug!("Solana balance of {}: {} SOL", account, balance);
        Ok(balance)
    }
}
