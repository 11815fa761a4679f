//! 统一错误类型
//! 钱包发现、连接、签名与认证流程中的全部失败都收敛到 `WalletError`

use thiserror::Error;

/// EIP-1193 标准错误码
pub mod rpc_codes {
    /// 用户拒绝请求
    pub const USER_REJECTED: i64 = 4001;
    /// 账户未授权
    pub const UNAUTHORIZED: i64 = 4100;
    /// 不支持的方法
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    /// 与所有链断开
    pub const DISCONNECTED: i64 = 4900;
    /// JSON-RPC 内部错误
    pub const INTERNAL: i64 = -32603;
}

/// 注入式钱包返回的 RPC 错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(rpc_codes::USER_REJECTED, "User rejected the request.")
    }

    pub fn unauthorized() -> Self {
        Self::new(
            rpc_codes::UNAUTHORIZED,
            "The requested account and/or method has not been authorized by the user.",
        )
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::new(
            rpc_codes::UNSUPPORTED_METHOD,
            format!("The provider does not support the method: {}", method),
        )
    }

    pub fn disconnected() -> Self {
        Self::new(rpc_codes::DISCONNECTED, "The provider is disconnected.")
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == rpc_codes::USER_REJECTED
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    #[error("wallet provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("connection rejected: {0}")]
    ConnectionRejected(String),

    #[error("signature declined: {0}")]
    SignatureDeclined(String),

    #[error("challenge fetch failed: {0}")]
    ChallengeFetchFailed(String),

    #[error("authentication verify failed: {0}")]
    AuthVerifyFailed(String),

    #[error("balance query failed: {0}")]
    BalanceQueryFailed(String),

    #[error("provider rpc error {code}: {message}")]
    ProviderRpc { code: i64, message: String },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("stale wallet state write: expected generation {expected}, found {current}")]
    StaleWrite { expected: u64, current: u64 },

    #[error("backend request failed: {0}")]
    Backend(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl WalletError {
    /// 稳定的错误码字符串（用于日志与事件）
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::ConnectionRejected(_) => "connection_rejected",
            Self::SignatureDeclined(_) => "signature_declined",
            Self::ChallengeFetchFailed(_) => "challenge_fetch_failed",
            Self::AuthVerifyFailed(_) => "auth_verify_failed",
            Self::BalanceQueryFailed(_) => "balance_query_failed",
            Self::ProviderRpc { .. } => "provider_rpc",
            Self::Unsupported(_) => "unsupported",
            Self::StaleWrite { .. } => "stale_write",
            Self::Backend(_) => "backend",
            Self::Config(_) => "config",
        }
    }

    /// 未安装钱包是本次会话内的终态，其余错误允许用户重试
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ProviderUnavailable(_) | Self::Config(_))
    }

    /// 连接阶段的 provider 错误统一视为用户/钱包拒绝
    pub fn connection_rejected(err: ProviderRpcError) -> Self {
        Self::ConnectionRejected(err.to_string())
    }

    /// 签名阶段的 provider 错误统一视为签名被拒
    pub fn signature_declined(err: ProviderRpcError) -> Self {
        Self::SignatureDeclined(err.to_string())
    }
}

impl From<ProviderRpcError> for WalletError {
    fn from(err: ProviderRpcError) -> Self {
        Self::ProviderRpc {
            code: err.code,
            message: err.message,
        }
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(format!("JSON serialization error: {}", err))
    }
}

pub type WalletResult<T> = Result<T, WalletError>;
