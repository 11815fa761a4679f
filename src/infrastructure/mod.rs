pub mod backend_client;
pub mod event_bus; // 同步事件目标 + 订阅句柄
pub mod logging;
pub mod software_wallet; // 本地密钥钱包（演示与测试）
