//! 消息与签名编码
//!
//! EVM：personal_sign 接收 UTF-8 字节的 0x 前缀十六进制，签名以十六进制传输
//! Solana：签名原始字节，签名以 base58 传输

use crate::domain::ChainKind;

/// UTF-8 字节转 `0x` 前缀十六进制（personal_sign 的消息参数）
pub fn utf8_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// 解析 `0x` 前缀（可省略）的十六进制字符串
pub fn decode_hex(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed)
}

/// 按链选择签名的传输编码
pub fn encode_signature(chain: ChainKind, signature: &[u8]) -> String {
    match chain {
        ChainKind::Evm => format!("0x{}", hex::encode(signature)),
        ChainKind::Solana => bs58::encode(signature).into_string(),
    }
}
