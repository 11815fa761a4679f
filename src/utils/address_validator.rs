//! 地址验证模块
//!
//! 按链类型校验钱包返回的账户地址

use sha3::{Digest, Keccak256};

use crate::domain::ChainKind;

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 验证地址格式
    pub fn validate(chain: ChainKind, address: &str) -> bool {
        match chain {
            ChainKind::Evm => Self::validate_evm_address(address),
            ChainKind::Solana => Self::validate_solana_address(address),
        }
    }

    /// 验证EVM地址（支持EIP-55 Checksum）
    fn validate_evm_address(address: &str) -> bool {
        let Some(hex_part) = address.strip_prefix("0x") else {
            return false;
        };

        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }

        // 全小写或全大写视为未带校验和
        let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower {
            return Self::to_checksum_address(address).as_deref() == Some(address);
        }

        true
    }

    /// EIP-55 校验和编码
    /// https://eips.ethereum.org/EIPS/eip-55
    pub fn to_checksum_address(address: &str) -> Option<String> {
        let hex_part = address.strip_prefix("0x").unwrap_or(address);
        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let lower = hex_part.to_ascii_lowercase();
        let hash = Keccak256::digest(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, ch) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        Some(out)
    }

    /// 验证Solana地址（Base58编码，32字节）
    fn validate_solana_address(address: &str) -> bool {
        if address.len() < 32 || address.len() > 44 {
            return false;
        }

        match bs58::decode(address).into_vec() {
            Ok(decoded) => decoded.len() == 32,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evm_address_validation() {
        assert!(AddressValidator::validate(
            ChainKind::Evm,
            "0x742d35cc6634c0532925a3b844bc9e7595f0beb6"
        ));
        assert!(AddressValidator::validate(
            ChainKind::Evm,
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));

        assert!(!AddressValidator::validate(ChainKind::Evm, "0x123"));
        assert!(!AddressValidator::validate(
            ChainKind::Evm,
            "742d35Cc6634C0532925a3b844Bc9e7595f0bEb6"
        ));
        // 校验和大小写错误
        assert!(!AddressValidator::validate(
            ChainKind::Evm,
            "0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));
    }

    #[test]
    fn test_checksum_encoding() {
        assert_eq!(
            AddressValidator::to_checksum_address("0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359")
                .as_deref(),
            Some("0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359")
        );
        assert_eq!(AddressValidator::to_checksum_address("0xzz"), None);
    }

    #[test]
    fn test_solana_address_validation() {
        assert!(AddressValidator::validate(
            ChainKind::Solana,
            "DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK"
        ));
        assert!(!AddressValidator::validate(ChainKind::Solana, "invalid"));
        assert!(!AddressValidator::validate(
            ChainKind::Solana,
            "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb6"
        ));
    }
}
