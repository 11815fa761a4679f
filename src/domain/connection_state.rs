//! 钱包连接状态机
//! UNDETECTED -> DETECTED -> CONNECTING -> CONNECTED -> DETECTED

use serde::{Deserialize, Serialize};

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// 未发现 provider（本页面生命周期内的终态）
    Undetected,
    Detected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undetected => "undetected",
            Self::Detected => "detected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }

    /// 验证状态转换是否合法
    pub fn can_transition(from: ConnectionState, to: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (from, to),
            (Undetected, Detected)
                | (Detected, Connecting)
                | (Connecting, Connected)
                // 连接失败或写入被拒
                | (Connecting, Detected)
                // 主动断开、断开事件、重连失败
                | (Connected, Detected)
                // 重复连接或账户清空后的静默重连
                | (Connected, Connecting)
        )
    }

    /// 展示层按钮状态
    pub fn affordance(&self, display_name: &str) -> Affordance {
        match self {
            Self::Undetected => Affordance {
                label: format!("{} Not Installed", display_name),
                enabled: false,
            },
            Self::Detected => Affordance {
                label: format!("Connect to {}", display_name),
                enabled: true,
            },
            Self::Connecting => Affordance {
                label: "Connecting...".to_string(),
                enabled: false,
            },
            Self::Connected => Affordance {
                label: format!("{} Connected", display_name),
                enabled: true,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affordance {
    pub label: String,
    pub enabled: bool,
}
