//! Deterministic local SDK, the in-process stand-in for the real relayer.
//!
//! Encryption "seals" a value into a sha256-derived handle registered in a
//! shared `CipherSpace`; a paired in-memory board resolves submitted handles
//! against the same space. Capability and failure toggles let tests exercise
//! every bootstrap and decryption path.

use crate::{
    EncryptedInputBuilder, EncryptedPayload, InstanceConfig, NetworkPreset, RelayerSdk,
    SdkCallFault, SdkCapabilities, SdkInstance,
};
use anyhow::bail;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use ww_api_types::{ChainId, CipherHandle, ContractAddress, SEPOLIA, WalletAddress};

/// Whether a decrypt strategy exists on an instance, and whether it works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategySupport {
    Available,
    Unsupported,
    Failing,
}

#[derive(Default)]
struct CipherSpaceInner {
    values: HashMap<CipherHandle, u64>,
    nonce: u64,
}

/// Shared plaintext registry behind opaque handles.
#[derive(Clone, Default)]
pub struct CipherSpace {
    inner: Arc<Mutex<CipherSpaceInner>>,
}

impl CipherSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under a fresh handle scoped to `contract`.
    pub fn seal(&self, contract: &ContractAddress, value: u64) -> CipherHandle {
        let mut inner = self.inner.lock().expect("cipher space poisoned");
        inner.nonce += 1;

        let mut hasher = Sha256::new();
        hasher.update(contract.0.as_bytes());
        hasher.update(value.to_le_bytes());
        hasher.update(inner.nonce.to_le_bytes());
        let digest = hasher.finalize();

        let handle = CipherHandle(format!("0x{}", hex_lower(&digest)));
        inner.values.insert(handle.clone(), value);
        handle
    }

    pub fn resolve(&self, handle: &CipherHandle) -> Option<u64> {
        self.inner
            .lock()
            .expect("cipher space poisoned")
            .values
            .get(handle)
            .copied()
    }
}

struct LocalToggles {
    fail_init: bool,
    fail_create_instance: bool,
    fail_encrypt: bool,
    user_decrypt: StrategySupport,
    public_decrypt: StrategySupport,
}

/// Local SDK module with a complete factory surface by default.
pub struct LocalSdk {
    space: CipherSpace,
    capabilities: SdkCapabilities,
    presets: Vec<NetworkPreset>,
    toggles: Mutex<LocalToggles>,
}

impl LocalSdk {
    pub fn new(space: CipherSpace) -> Self {
        Self {
            space,
            capabilities: SdkCapabilities::COMPLETE,
            presets: vec![NetworkPreset {
                chain: SEPOLIA,
                relayer_url: "local://relayer".to_owned(),
                acl_contract: ContractAddress("0x0000000000000000000000000000000000000acl".to_owned()),
            }],
            toggles: Mutex::new(LocalToggles {
                fail_init: false,
                fail_create_instance: false,
                fail_encrypt: false,
                user_decrypt: StrategySupport::Available,
                public_decrypt: StrategySupport::Available,
            }),
        }
    }

    /// Pretend the underlying module did not export some factory functions.
    pub fn with_capabilities(mut self, capabilities: SdkCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_preset(mut self, preset: NetworkPreset) -> Self {
        self.presets.push(preset);
        self
    }

    pub fn fail_init(self) -> Self {
        self.toggles.lock().expect("toggles poisoned").fail_init = true;
        self
    }

    pub fn fail_create_instance(self) -> Self {
        self.toggles
            .lock()
            .expect("toggles poisoned")
            .fail_create_instance = true;
        self
    }

    pub fn fail_encrypt(self) -> Self {
        self.toggles.lock().expect("toggles poisoned").fail_encrypt = true;
        self
    }

    pub fn decrypt_support(self, user: StrategySupport, public: StrategySupport) -> Self {
        {
            let mut toggles = self.toggles.lock().expect("toggles poisoned");
            toggles.user_decrypt = user;
            toggles.public_decrypt = public;
        }
        self
    }

    pub fn space(&self) -> CipherSpace {
        self.space.clone()
    }
}

#[async_trait]
impl RelayerSdk for LocalSdk {
    fn capabilities(&self) -> SdkCapabilities {
        self.capabilities
    }

    async fn init(&self) -> anyhow::Result<()> {
        if self.toggles.lock().expect("toggles poisoned").fail_init {
            bail!("simulated parameter load failure");
        }
        Ok(())
    }

    async fn create_instance(&self, _config: InstanceConfig) -> anyhow::Result<Arc<dyn SdkInstance>> {
        let toggles = self.toggles.lock().expect("toggles poisoned");
        if toggles.fail_create_instance {
            bail!("simulated instance creation failure");
        }
        Ok(Arc::new(LocalInstance {
            space: self.space.clone(),
            fail_encrypt: toggles.fail_encrypt,
            user_decrypt: toggles.user_decrypt,
            public_decrypt: toggles.public_decrypt,
        }))
    }

    fn network_preset(&self, chain: ChainId) -> Option<NetworkPreset> {
        self.presets.iter().find(|preset| preset.chain == chain).cloned()
    }
}

pub struct LocalInstance {
    space: CipherSpace,
    fail_encrypt: bool,
    user_decrypt: StrategySupport,
    public_decrypt: StrategySupport,
}

impl LocalInstance {
    async fn run_strategy(
        &self,
        support: StrategySupport,
        handle: &CipherHandle,
    ) -> Result<u64, SdkCallFault> {
        match support {
            StrategySupport::Unsupported => Err(SdkCallFault::Unsupported),
            StrategySupport::Failing => {
                Err(SdkCallFault::Failed("simulated decryption failure".to_owned()))
            }
            StrategySupport::Available => self
                .space
                .resolve(handle)
                .ok_or_else(|| SdkCallFault::Failed(format!("unknown handle {}", handle.0))),
        }
    }
}

#[async_trait]
impl SdkInstance for LocalInstance {
    fn create_encrypted_input(
        &self,
        contract: &ContractAddress,
        _account: &WalletAddress,
    ) -> Box<dyn EncryptedInputBuilder> {
        Box::new(LocalEncryptedInput {
            space: self.space.clone(),
            contract: contract.clone(),
            values: Vec::new(),
            fail_encrypt: self.fail_encrypt,
        })
    }

    async fn decrypt(
        &self,
        _contract: &ContractAddress,
        handle: &CipherHandle,
    ) -> Result<u64, SdkCallFault> {
        self.run_strategy(self.user_decrypt, handle).await
    }

    async fn decrypt_public(
        &self,
        _contract: &ContractAddress,
        handle: &CipherHandle,
    ) -> Result<u64, SdkCallFault> {
        self.run_strategy(self.public_decrypt, handle).await
    }
}

struct LocalEncryptedInput {
    space: CipherSpace,
    contract: ContractAddress,
    values: Vec<u32>,
    fail_encrypt: bool,
}

#[async_trait]
impl EncryptedInputBuilder for LocalEncryptedInput {
    fn add32(&mut self, value: u32) {
        self.values.push(value);
    }

    async fn encrypt(self: Box<Self>) -> anyhow::Result<EncryptedPayload> {
        if self.fail_encrypt {
            bail!("simulated encryption failure");
        }

        let handles: Vec<CipherHandle> = self
            .values
            .iter()
            .map(|value| self.space.seal(&self.contract, u64::from(*value)))
            .collect();

        // Proof blob binds the handles together; the contract treats it as
        // opaque bytes either way.
        let mut hasher = Sha256::new();
        for handle in &handles {
            hasher.update(handle.0.as_bytes());
        }
        let proof = hasher.finalize().to_vec();

        Ok(EncryptedPayload { handles, proof })
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> ContractAddress {
        ContractAddress("0x00000000000000000000000000000000000000c7".to_owned())
    }

    fn account() -> WalletAddress {
        WalletAddress("0xAB12".to_owned())
    }

    #[test]
    fn seal_and_resolve_roundtrip() {
        let space = CipherSpace::new();
        let handle = space.seal(&contract(), 5);
        assert_eq!(space.resolve(&handle), Some(5));
        assert!(space.resolve(&CipherHandle("0xmissing".to_owned())).is_none());
    }

    #[test]
    fn sealing_the_same_value_twice_yields_distinct_handles() {
        let space = CipherSpace::new();
        let first = space.seal(&contract(), 1);
        let second = space.seal(&contract(), 1);
        assert_ne!(first, second);
        assert_eq!(space.resolve(&first), Some(1));
        assert_eq!(space.resolve(&second), Some(1));
    }

    #[tokio::test]
    async fn encrypt_registers_handles_in_the_space() -> anyhow::Result<()> {
        let space = CipherSpace::new();
        let sdk = LocalSdk::new(space.clone());
        let instance = sdk
            .create_instance(InstanceConfig {
                preset: sdk.network_preset(SEPOLIA).expect("sepolia preset"),
                provider: None,
            })
            .await?;

        let mut builder = instance.create_encrypted_input(&contract(), &account());
        builder.add32(1);
        let payload = builder.encrypt().await?;

        assert_eq!(payload.handles.len(), 1);
        assert!(!payload.proof.is_empty());
        assert_eq!(space.resolve(&payload.handles[0]), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn decrypt_support_matrix() -> anyhow::Result<()> {
        let space = CipherSpace::new();
        let handle = space.seal(&contract(), 9);

        let sdk = LocalSdk::new(space.clone())
            .decrypt_support(StrategySupport::Unsupported, StrategySupport::Available);
        let instance = sdk
            .create_instance(InstanceConfig {
                preset: sdk.network_preset(SEPOLIA).expect("sepolia preset"),
                provider: None,
            })
            .await?;

        assert_eq!(
            instance.decrypt(&contract(), &handle).await,
            Err(SdkCallFault::Unsupported)
        );
        assert_eq!(instance.decrypt_public(&contract(), &handle).await, Ok(9));
        Ok(())
    }
}
