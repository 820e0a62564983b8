//! Encryption-SDK acquisition and bootstrap.
//!
//! The relayer SDK arrives from one of several places (an embedded module, a
//! process-wide slot a prior load populated, or a remote script fetch) and is
//! then initialized and bound to the active network. `SdkBootstrapper` runs
//! that pipeline exactly once per environment.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use ww_api_types::{ChainId, CipherHandle, ContractAddress, WalletAddress};
use ww_wallet_session::WalletProvider;

pub mod bootstrap;
pub mod local;
pub mod sources;

pub use bootstrap::SdkBootstrapper;
pub use sources::{EmbeddedSource, GlobalSource, RemoteScriptSource, ScriptHost, SdkSource};

/// Acquisition-time failure. A load failure from one source advances the
/// chain to the next source; only exhaustion surfaces to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SdkFault {
    #[error("{0}")]
    Load(String),
}

/// Instance-call failure. `Unsupported` means the capability is absent on
/// this instance, which is distinct from an attempted-and-failed call.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SdkCallFault {
    #[error("capability not supported by this instance")]
    Unsupported,

    #[error("{0}")]
    Failed(String),
}

/// Which of the required factory functions a discovered module exports.
/// A module missing any of them is incompatible, never degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkCapabilities {
    pub init: bool,
    pub create_instance: bool,
    pub network_presets: bool,
}

impl SdkCapabilities {
    pub const COMPLETE: Self = Self {
        init: true,
        create_instance: true,
        network_presets: true,
    };

    pub fn is_complete(&self) -> bool {
        self.init && self.create_instance && self.network_presets
    }

    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.init {
            missing.push("init");
        }
        if !self.create_instance {
            missing.push("create_instance");
        }
        if !self.network_presets {
            missing.push("network_presets");
        }
        missing
    }
}

/// Network-bound configuration bundled with the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPreset {
    pub chain: ChainId,
    pub relayer_url: String,
    pub acl_contract: ContractAddress,
}

/// Everything `create_instance` needs: the chain preset merged with the live
/// wallet provider handle so the instance can countersign user-specific
/// encryption context. The provider is optional; the SDK must come up in a
/// wallet-less environment too.
pub struct InstanceConfig {
    pub preset: NetworkPreset,
    pub provider: Option<Arc<dyn WalletProvider>>,
}

/// Factory surface of an acquired SDK module.
#[async_trait]
pub trait RelayerSdk: Send + Sync {
    /// Probe which factory functions the underlying module actually exports.
    fn capabilities(&self) -> SdkCapabilities;

    /// One-time internal setup (e.g. loading cryptographic parameters).
    async fn init(&self) -> anyhow::Result<()>;

    async fn create_instance(&self, config: InstanceConfig) -> anyhow::Result<Arc<dyn SdkInstance>>;

    /// Bundled network preset for a chain, if the SDK ships one.
    fn network_preset(&self, chain: ChainId) -> Option<NetworkPreset>;
}

/// A network-bound SDK instance.
#[async_trait]
pub trait SdkInstance: Send + Sync {
    fn create_encrypted_input(
        &self,
        contract: &ContractAddress,
        account: &WalletAddress,
    ) -> Box<dyn EncryptedInputBuilder>;

    /// General decryption, subject to the SDK's own access rules.
    async fn decrypt(
        &self,
        contract: &ContractAddress,
        handle: &CipherHandle,
    ) -> Result<u64, SdkCallFault>;

    /// Decryption of publicly decryptable values.
    async fn decrypt_public(
        &self,
        contract: &ContractAddress,
        handle: &CipherHandle,
    ) -> Result<u64, SdkCallFault>;
}

#[async_trait]
pub trait EncryptedInputBuilder: Send {
    fn add32(&mut self, value: u32);

    async fn encrypt(self: Box<Self>) -> anyhow::Result<EncryptedPayload>;
}

/// Ciphertext handles plus the accompanying input proof, as produced by the
/// SDK and consumed verbatim by the contract.
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    pub handles: Vec<CipherHandle>,
    pub proof: Vec<u8>,
}

/// Process-wide slot where a script load parks the SDK factory surface.
/// Held explicitly (not as an ambient static) so embedders and tests own
/// their slot's lifetime.
#[derive(Clone, Default)]
pub struct SdkSlot {
    inner: Arc<Mutex<Option<Arc<dyn RelayerSdk>>>>,
}

impl SdkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, sdk: Arc<dyn RelayerSdk>) {
        *self.inner.lock().expect("sdk slot poisoned") = Some(sdk);
    }

    pub fn get(&self) -> Option<Arc<dyn RelayerSdk>> {
        self.inner.lock().expect("sdk slot poisoned").clone()
    }

    pub fn clear(&self) {
        *self.inner.lock().expect("sdk slot poisoned") = None;
    }
}
