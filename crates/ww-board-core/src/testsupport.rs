//! Shared fixtures and instrumented wrappers for the crate's tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use ww_api_types::{CipherHandle, ContractAddress, SEPOLIA, WalletAddress, Wish, WishId};
use ww_contract_gateway::{ChainFault, ContractGateway, InMemoryBoard, WishBoard};
use ww_relayer_sdk::local::{CipherSpace, LocalSdk};
use ww_relayer_sdk::{
    EncryptedInputBuilder, InstanceConfig, RelayerSdk, SdkCallFault, SdkInstance,
};

pub(crate) struct Fixture {
    pub space: CipherSpace,
    pub board: Arc<InMemoryBoard>,
    pub gateway: Arc<ContractGateway>,
    pub instance: Arc<dyn SdkInstance>,
    pub account: WalletAddress,
}

impl Fixture {
    /// An instance over the same cipher space whose encryption always fails.
    pub async fn failing_encrypt_instance(&self) -> anyhow::Result<Arc<dyn SdkInstance>> {
        let sdk = LocalSdk::new(self.space.clone()).fail_encrypt();
        instance_of(&sdk).await
    }
}

pub(crate) fn deployment() -> ContractAddress {
    ContractAddress("0x59D5e36E367Ec6d9a479e34Cbcb1d5eDA0dF1f9E".to_owned())
}

pub(crate) fn account() -> WalletAddress {
    WalletAddress("0xAB12345678901234567890123456789012345612".to_owned())
}

async fn instance_of(sdk: &LocalSdk) -> anyhow::Result<Arc<dyn SdkInstance>> {
    let preset = sdk
        .network_preset(SEPOLIA)
        .ok_or_else(|| anyhow::anyhow!("local sdk should bundle a sepolia preset"))?;
    sdk.create_instance(InstanceConfig {
        preset,
        provider: None,
    })
    .await
}

pub(crate) async fn fixture() -> anyhow::Result<Fixture> {
    fixture_with_sdk(|sdk| sdk).await
}

/// Fixture over a `LocalSdk` the caller can reconfigure before an instance
/// is created from it.
pub(crate) async fn fixture_with_sdk(
    configure: impl FnOnce(LocalSdk) -> LocalSdk,
) -> anyhow::Result<Fixture> {
    let space = CipherSpace::new();
    let sdk = configure(LocalSdk::new(space.clone()));
    let instance = instance_of(&sdk).await?;

    let board = Arc::new(InMemoryBoard::new(deployment(), space.clone()));
    board.set_caller(account());
    let gateway = Arc::new(ContractGateway::new(deployment(), board.clone()));

    Ok(Fixture {
        space,
        board,
        gateway,
        instance,
        account: account(),
    })
}

/// Board whose cheer submissions park until the test opens the gate, keeping
/// the first caller in flight while a second one races it.
pub(crate) struct GatedBoard {
    inner: Arc<dyn WishBoard>,
    gate: Semaphore,
}

impl GatedBoard {
    pub fn new(inner: Arc<dyn WishBoard>) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl WishBoard for GatedBoard {
    async fn create_wish(&self, message: &str, alias_name: &str) -> Result<WishId, ChainFault> {
        self.inner.create_wish(message, alias_name).await
    }

    async fn cheer_wish(
        &self,
        id: WishId,
        handle: &CipherHandle,
        proof: &[u8],
    ) -> Result<(), ChainFault> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ChainFault::Reverted("gate closed".to_owned()))?;
        self.inner.cheer_wish(id, handle, proof).await
    }

    async fn get_wishes(&self) -> Result<Vec<Wish>, ChainFault> {
        self.inner.get_wishes().await
    }

    async fn get_wish(&self, id: WishId) -> Result<Wish, ChainFault> {
        self.inner.get_wish(id).await
    }

    async fn get_cheers_handle(&self, id: WishId) -> Result<CipherHandle, ChainFault> {
        self.inner.get_cheers_handle(id).await
    }

    async fn get_cheers_mirror(&self, id: WishId) -> Result<u32, ChainFault> {
        self.inner.get_cheers_mirror(id).await
    }

    async fn next_wish_id(&self) -> Result<WishId, ChainFault> {
        self.inner.next_wish_id().await
    }
}

/// Board that keeps serving the first cheer handle it ever returned, like a
/// lagging node that has not indexed the increment yet.
pub(crate) struct StaleReadBoard {
    inner: Arc<dyn WishBoard>,
    cached: std::sync::Mutex<Option<CipherHandle>>,
}

impl StaleReadBoard {
    pub fn new(inner: Arc<dyn WishBoard>) -> Self {
        Self {
            inner,
            cached: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl WishBoard for StaleReadBoard {
    async fn create_wish(&self, message: &str, alias_name: &str) -> Result<WishId, ChainFault> {
        self.inner.create_wish(message, alias_name).await
    }

    async fn cheer_wish(
        &self,
        id: WishId,
        handle: &CipherHandle,
        proof: &[u8],
    ) -> Result<(), ChainFault> {
        self.inner.cheer_wish(id, handle, proof).await
    }

    async fn get_wishes(&self) -> Result<Vec<Wish>, ChainFault> {
        self.inner.get_wishes().await
    }

    async fn get_wish(&self, id: WishId) -> Result<Wish, ChainFault> {
        self.inner.get_wish(id).await
    }

    async fn get_cheers_handle(&self, id: WishId) -> Result<CipherHandle, ChainFault> {
        let cached = self.cached.lock().expect("stale cache poisoned").clone();
        if let Some(handle) = cached {
            return Ok(handle);
        }
        let handle = self.inner.get_cheers_handle(id).await?;
        *self.cached.lock().expect("stale cache poisoned") = Some(handle.clone());
        Ok(handle)
    }

    async fn get_cheers_mirror(&self, id: WishId) -> Result<u32, ChainFault> {
        self.inner.get_cheers_mirror(id).await
    }

    async fn next_wish_id(&self) -> Result<WishId, ChainFault> {
        self.inner.next_wish_id().await
    }
}

/// Instance wrapper counting how often the encryption step is reached.
pub(crate) struct CountingInstance {
    inner: Arc<dyn SdkInstance>,
    pub encrypt_calls: AtomicUsize,
}

impl CountingInstance {
    pub fn new(inner: Arc<dyn SdkInstance>) -> Self {
        Self {
            inner,
            encrypt_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SdkInstance for CountingInstance {
    fn create_encrypted_input(
        &self,
        contract: &ContractAddress,
        account: &WalletAddress,
    ) -> Box<dyn EncryptedInputBuilder> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_encrypted_input(contract, account)
    }

    async fn decrypt(
        &self,
        contract: &ContractAddress,
        handle: &CipherHandle,
    ) -> Result<u64, SdkCallFault> {
        self.inner.decrypt(contract, handle).await
    }

    async fn decrypt_public(
        &self,
        contract: &ContractAddress,
        handle: &CipherHandle,
    ) -> Result<u64, SdkCallFault> {
        self.inner.decrypt_public(contract, handle).await
    }
}
