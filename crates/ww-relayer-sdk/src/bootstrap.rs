//! One-shot SDK bootstrap: acquisition fallback chain, capability check,
//! init, and network-bound instance creation.

use crate::{InstanceConfig, RelayerSdk, SdkFault, SdkInstance, SdkSource};
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use ww_api_types::{BoardError, ChainId, SdkPhase};
use ww_wallet_session::WalletProvider;

/// Drives `UNINITIALIZED → BOOTSTRAPPING → {READY | ERROR}` exactly once.
///
/// Concurrent callers share one acquisition sequence and observe the same
/// terminal outcome; both terminal states are cached and there is no
/// automatic retry. A fresh environment (and thus a fresh bootstrapper) is
/// required to attempt again.
pub struct SdkBootstrapper {
    sources: Vec<Arc<dyn SdkSource>>,
    outcome: OnceCell<Result<Arc<dyn SdkInstance>, BoardError>>,
    phase: RwLock<SdkPhase>,
}

impl SdkBootstrapper {
    pub fn new(sources: Vec<Arc<dyn SdkSource>>) -> Self {
        Self {
            sources,
            outcome: OnceCell::new(),
            phase: RwLock::new(SdkPhase::Uninitialized),
        }
    }

    pub fn phase(&self) -> SdkPhase {
        self.phase.read().expect("sdk phase poisoned").clone()
    }

    /// The READY instance, if bootstrap has reached it.
    pub fn instance(&self) -> Option<Arc<dyn SdkInstance>> {
        self.outcome.get().and_then(|outcome| outcome.clone().ok())
    }

    /// Acquire, verify, initialize, and bind the SDK for `chain`. Re-entry
    /// while a bootstrap is in flight awaits that same attempt; re-entry
    /// after a terminal state returns the cached outcome.
    pub async fn bootstrap(
        &self,
        chain: ChainId,
        provider: Option<Arc<dyn WalletProvider>>,
    ) -> Result<Arc<dyn SdkInstance>, BoardError> {
        self.outcome
            .get_or_init(|| async {
                self.set_phase(SdkPhase::Bootstrapping);
                let result = self.run(chain, provider).await;
                match &result {
                    Ok(_) => self.set_phase(SdkPhase::Ready),
                    Err(err) => self.set_phase(SdkPhase::Error(err.to_string())),
                }
                result
            })
            .await
            .clone()
    }

    async fn run(
        &self,
        chain: ChainId,
        provider: Option<Arc<dyn WalletProvider>>,
    ) -> Result<Arc<dyn SdkInstance>, BoardError> {
        let sdk = self.acquire().await?;

        let capabilities = sdk.capabilities();
        if !capabilities.is_complete() {
            return Err(BoardError::SdkIncompatible(format!(
                "missing {}",
                capabilities.missing().join(", ")
            )));
        }

        sdk.init()
            .await
            .map_err(|err| BoardError::SdkInitFailed(format!("{err:#}")))?;

        let preset = sdk.network_preset(chain).ok_or_else(|| {
            BoardError::SdkIncompatible(format!("no network preset for chain {chain}"))
        })?;

        let instance = sdk
            .create_instance(InstanceConfig { preset, provider })
            .await
            .map_err(|err| BoardError::SdkInitFailed(format!("{err:#}")))?;

        info!(%chain, "relayer SDK ready");
        Ok(instance)
    }

    async fn acquire(&self) -> Result<Arc<dyn RelayerSdk>, BoardError> {
        let mut last_failure: Option<String> = None;

        for source in &self.sources {
            match source.acquire().await {
                Ok(Some(sdk)) => {
                    info!(source = source.name(), "relayer SDK acquired");
                    return Ok(sdk);
                }
                Ok(None) => {
                    debug!(source = source.name(), "source empty, advancing");
                }
                Err(SdkFault::Load(message)) => {
                    warn!(source = source.name(), %message, "source load failed, advancing");
                    last_failure = Some(message);
                }
            }
        }

        Err(BoardError::SdkLoadFailed(last_failure.unwrap_or_else(|| {
            "no acquisition source produced an SDK".to_owned()
        })))
    }

    fn set_phase(&self, phase: SdkPhase) {
        *self.phase.write().expect("sdk phase poisoned") = phase;
    }
}
