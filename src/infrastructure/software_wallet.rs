//! 软件钱包
//!
//! 以本地密钥实现 EIP-1193 与 Solana 注入接口，用于演示程序与测试，
//! 代替浏览器扩展完成授权、签名与事件推送。

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use ed25519_dalek::Signer;
use k256::ecdsa::{SigningKey, VerifyingKey};
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};

use crate::{
    domain::{Eip1193Event, Eip1193Provider, SolanaEvent, SolanaProvider},
    error::{rpc_codes, ProviderRpcError, WalletError, WalletResult},
    infrastructure::event_bus::EventBus,
    utils::{address_validator::AddressValidator, encoding},
};

/// EIP-191 personal_sign 消息哈希
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// 由公钥推导 EVM 地址（EIP-55 校验和格式）
pub fn evm_address(verifying_key: &VerifyingKey) -> String {
    let public_key = verifying_key.to_encoded_point(false);
    // 去掉 0x04 前缀后取 Keccak256 的后 20 字节
    let hash = Keccak256::digest(&public_key.as_bytes()[1..]);
    let address = format!("0x{}", hex::encode(&hash[12..]));
    AddressValidator::to_checksum_address(&address).unwrap_or(address)
}

/// 模拟用户操作的公共开关
#[derive(Default)]
struct UserSimulation {
    rejecting: AtomicBool,
    approval_delay: Mutex<Option<Duration>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl UserSimulation {
    fn record(&self, method: &str) {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(method.to_string())
            .or_insert(0) += 1;
    }

    fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    /// 等待"用户点击"，然后按开关决定批准或拒绝
    async fn approve(&self) -> Result<(), ProviderRpcError> {
        let delay = *self
            .approval_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(ProviderRpcError::user_rejected());
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EVM (secp256k1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SoftwareEvmWallet {
    signing_key: SigningKey,
    address: String,
    chain_id: Mutex<String>,
    authorized: AtomicBool,
    user: UserSimulation,
    events: EventBus<Eip1193Event>,
}

impl SoftwareEvmWallet {
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    pub fn from_secret_bytes(secret: &[u8]) -> WalletResult<Self> {
        let signing_key = SigningKey::from_slice(secret)
            .map_err(|e| WalletError::Config(format!("invalid secp256k1 secret key: {}", e)))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = evm_address(signing_key.verifying_key());
        Self {
            signing_key,
            address,
            chain_id: Mutex::new("0x1".to_string()),
            authorized: AtomicBool::new(false),
            user: UserSimulation::default(),
            events: EventBus::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    /// 之后的授权与签名请求都被"用户"拒绝
    pub fn set_rejecting(&self, rejecting: bool) {
        self.user.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// 授权与签名前等待的时长
    pub fn set_approval_delay(&self, delay: Option<Duration>) {
        *self
            .user
            .approval_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.user.call_count(method)
    }

    /// 钱包与链断开：撤销授权并推送 disconnect
    pub fn simulate_disconnect(&self) {
        self.authorized.store(false, Ordering::SeqCst);
        self.events.dispatch(&Eip1193Event::Disconnect {
            code: rpc_codes::DISCONNECTED,
            message: "The provider is disconnected from all chains.".into(),
        });
    }

    pub fn switch_chain(&self, chain_id: &str) {
        *self.chain_id.lock().unwrap_or_else(PoisonError::into_inner) = chain_id.to_string();
        self.events
            .dispatch(&Eip1193Event::ChainChanged(chain_id.to_string()));
    }

    fn chain_id(&self) -> String {
        self.chain_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 65 字节 r || s || v（v = 27 / 28）
    pub fn sign_personal(&self, message: &[u8]) -> WalletResult<Vec<u8>> {
        let hash = eip191_hash(message);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| WalletError::SignatureDeclined(e.to_string()))?;

        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        Ok(bytes)
    }

    async fn personal_sign(&self, params: &[Value]) -> Result<Value, ProviderRpcError> {
        let message = params
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderRpcError::new(-32602, "personal_sign: missing message"))?;
        let account = params
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderRpcError::new(-32602, "personal_sign: missing account"))?;

        if !self.is_authorized() || !account.eq_ignore_ascii_case(&self.address) {
            return Err(ProviderRpcError::unauthorized());
        }

        let bytes = encoding::decode_hex(message)
            .map_err(|e| ProviderRpcError::new(-32602, format!("personal_sign: {}", e)))?;

        self.user.approve().await?;
        // 等待期间可能已被断开
        if !self.is_authorized() {
            return Err(ProviderRpcError::unauthorized());
        }

        let signature = self
            .sign_personal(&bytes)
            .map_err(|e| ProviderRpcError::new(rpc_codes::INTERNAL, e.to_string()))?;
        Ok(Value::String(encoding::encode_signature(
            crate::domain::ChainKind::Evm,
            &signature,
        )))
    }
}

#[async_trait]
impl Eip1193Provider for SoftwareEvmWallet {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, ProviderRpcError> {
        self.user.record(method);

        match method {
            "eth_requestAccounts" => {
                self.user.approve().await?;
                if !self.authorized.swap(true, Ordering::SeqCst) {
                    self.events.dispatch(&Eip1193Event::Connect {
                        chain_id: self.chain_id(),
                    });
                }
                Ok(json!([self.address]))
            }
            "eth_accounts" => {
                if self.is_authorized() {
                    Ok(json!([self.address]))
                } else {
                    Ok(json!([]))
                }
            }
            "eth_chainId" => Ok(Value::String(self.chain_id())),
            "personal_sign" => self.personal_sign(&params).await,
            "wallet_revokePermissions" => {
                self.authorized.store(false, Ordering::SeqCst);
                Ok(Value::Null)
            }
            other => Err(ProviderRpcError::unsupported_method(other)),
        }
    }

    fn events(&self) -> &EventBus<Eip1193Event> {
        &self.events
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Solana (ed25519)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SoftwareSolanaWallet {
    signing_key: ed25519_dalek::SigningKey,
    public_key: String,
    connected: AtomicBool,
    user: UserSimulation,
    events: EventBus<SolanaEvent>,
}

impl SoftwareSolanaWallet {
    pub fn random() -> Self {
        Self::from_secret_bytes(&rand::random::<[u8; 32]>())
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(secret);
        // Solana 地址就是公钥的 Base58 编码
        let public_key = bs58::encode(signing_key.verifying_key().to_bytes()).into_string();
        Self {
            signing_key,
            public_key,
            connected: AtomicBool::new(false),
            user: UserSimulation::default(),
            events: EventBus::new(),
        }
    }

    /// 无论是否连接都返回本钱包的公钥
    pub fn address(&self) -> &str {
        &self.public_key
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        self.user.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn set_approval_delay(&self, delay: Option<Duration>) {
        *self
            .user
            .approval_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.user.call_count(method)
    }

    pub fn simulate_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.events.dispatch(&SolanaEvent::Disconnect);
    }

    /// 用户在钱包内切换账户；`None` 表示新账户尚未授权
    pub fn simulate_account_changed(&self, public_key: Option<String>) {
        if public_key.is_none() {
            self.connected.store(false, Ordering::SeqCst);
        }
        self.events.dispatch(&SolanaEvent::AccountChanged(public_key));
    }
}

#[async_trait]
impl SolanaProvider for SoftwareSolanaWallet {
    async fn connect(&self) -> Result<String, ProviderRpcError> {
        self.user.record("connect");
        self.user.approve().await?;

        self.connected.store(true, Ordering::SeqCst);
        self.events
            .dispatch(&SolanaEvent::Connect(self.public_key.clone()));
        Ok(self.public_key.clone())
    }

    async fn disconnect(&self) -> Result<(), ProviderRpcError> {
        self.user.record("disconnect");
        self.simulate_disconnect();
        Ok(())
    }

    fn public_key(&self) -> Option<String> {
        self.is_connected().then(|| self.public_key.clone())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, ProviderRpcError> {
        self.user.record("signMessage");
        if !self.is_connected() {
            return Err(ProviderRpcError::unauthorized());
        }
        self.user.approve().await?;
        if !self.is_connected() {
            return Err(ProviderRpcError::unauthorized());
        }
        Ok(self.signing_key.sign(message).to_bytes().to_vec())
    }

    fn events(&self) -> &EventBus<SolanaEvent> {
        &self.events
    }
}
