//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 默认追踪的 ERC-20 代币（LINK）
pub const DEFAULT_ERC20_TOKEN: &str = "0x514910771AF9Ca656af840dff83E8264EcF986CA";

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub wallets: WalletsConfig,
    #[serde(default)]
    pub state: StateConfig,
}

/// 认证后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// 请求携带会话Cookie（等价于 fetch 的 credentials: "include"）
    pub include_credentials: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 钱包集成配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletsConfig {
    pub erc20_token_address: String,
    pub solana_rpc_url: String,
    pub fetch_balances: bool,
}

/// 共享钱包状态的写入策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// 最后写入者获胜
    LastWriteWins,
    /// 连接期间状态已被他人改写时，放弃本次写入
    RejectStale,
}

impl WritePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_write_wins" | "lww" => Some(Self::LastWriteWins),
            "reject_stale" | "strict" => Some(Self::RejectStale),
            _ => None,
        }
    }
}

/// 共享钱包状态配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub write_policy: WritePolicy,
    /// 状态变更广播缓冲区大小
    pub change_buffer: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            request_timeout_secs: std::env::var("BACKEND_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            include_credentials: std::env::var("BACKEND_INCLUDE_CREDENTIALS")
                .ok()
                .map(|v| v != "0")
                .unwrap_or(true),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for WalletsConfig {
    fn default() -> Self {
        Self {
            erc20_token_address: std::env::var("ERC20_TOKEN_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_ERC20_TOKEN.into()),
            solana_rpc_url: std::env::var("SOLANA_RPC_URL")
                .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into()),
            fetch_balances: std::env::var("FETCH_BALANCES")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(true),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            write_policy: std::env::var("WALLET_WRITE_POLICY")
                .ok()
                .and_then(|v| WritePolicy::parse(&v))
                .unwrap_or(WritePolicy::LastWriteWins),
            change_buffer: std::env::var("WALLET_CHANGE_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(64),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
            wallets: WalletsConfig::default(),
            state: StateConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            anyhow::bail!("BACKEND_URL must start with http:// or https://");
        }

        if self.backend.request_timeout_secs == 0 {
            anyhow::bail!("BACKEND_TIMEOUT_SECS must be greater than 0");
        }

        if !self.wallets.solana_rpc_url.starts_with("http://")
            && !self.wallets.solana_rpc_url.starts_with("https://")
        {
            anyhow::bail!("SOLANA_RPC_URL must start with http:// or https://");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if self.state.change_buffer == 0 {
            anyhow::bail!("WALLET_CHANGE_BUFFER must be greater than 0");
        }

        Ok(())
    }
}
