//! Ordered SDK acquisition sources: embedded module, process-wide slot,
//! remote script fetch. Each is tried only if the previous one had nothing
//! to offer.

use crate::{RelayerSdk, SdkFault, SdkSlot};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Fixed, versioned location of the relayer SDK bundle.
pub const RELAYER_BUNDLE_URL: &str =
    "https://cdn.zama.ai/relayer-sdk-js/0.2.0/relayer-sdk-js.umd.cjs";

/// How long a fetched bundle gets to register itself in the slot.
pub const BUNDLE_REGISTER_WAIT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait SdkSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means this source has nothing here and the chain should
    /// advance; `Err` is a load failure, which also advances the chain.
    async fn acquire(&self) -> Result<Option<Arc<dyn RelayerSdk>>, SdkFault>;
}

/// A compiled-in SDK module, when the build carries one.
pub struct EmbeddedSource {
    module: Option<Arc<dyn RelayerSdk>>,
}

impl EmbeddedSource {
    pub fn new(module: Option<Arc<dyn RelayerSdk>>) -> Self {
        Self { module }
    }

    /// A build without an embedded module.
    pub fn absent() -> Self {
        Self { module: None }
    }
}

#[async_trait]
impl SdkSource for EmbeddedSource {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn acquire(&self) -> Result<Option<Arc<dyn RelayerSdk>>, SdkFault> {
        Ok(self.module.clone())
    }
}

/// An instance a prior script load may have parked in the slot.
pub struct GlobalSource {
    slot: SdkSlot,
}

impl GlobalSource {
    pub fn new(slot: SdkSlot) -> Self {
        Self { slot }
    }
}

#[async_trait]
impl SdkSource for GlobalSource {
    fn name(&self) -> &'static str {
        "global"
    }

    async fn acquire(&self) -> Result<Option<Arc<dyn RelayerSdk>>, SdkFault> {
        Ok(self.slot.get())
    }
}

/// Evaluates a fetched SDK bundle. A well-behaved bundle installs its
/// factory surface into the slot as a side effect of evaluation.
#[async_trait]
pub trait ScriptHost: Send + Sync {
    async fn eval(&self, source: &[u8]) -> anyhow::Result<()>;
}

/// Fetches the pinned bundle over HTTP and waits for it to register.
///
/// The fetch happens at most once per bootstrap because the bootstrapper
/// single-flights the whole acquisition chain.
pub struct RemoteScriptSource {
    url: String,
    http: reqwest::Client,
    host: Arc<dyn ScriptHost>,
    slot: SdkSlot,
    register_wait: Duration,
}

impl RemoteScriptSource {
    pub fn new(host: Arc<dyn ScriptHost>, slot: SdkSlot) -> Self {
        Self::with_url(RELAYER_BUNDLE_URL, host, slot)
    }

    pub fn with_url(url: impl Into<String>, host: Arc<dyn ScriptHost>, slot: SdkSlot) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            host,
            slot,
            register_wait: BUNDLE_REGISTER_WAIT,
        }
    }

    pub fn register_wait(mut self, wait: Duration) -> Self {
        self.register_wait = wait;
        self
    }
}

#[async_trait]
impl SdkSource for RemoteScriptSource {
    fn name(&self) -> &'static str {
        "remote-script"
    }

    async fn acquire(&self) -> Result<Option<Arc<dyn RelayerSdk>>, SdkFault> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|err| SdkFault::Load(format!("bundle fetch failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SdkFault::Load(format!("bundle fetch returned HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| SdkFault::Load(format!("bundle body read failed: {err}")))?;
        debug!(bytes = body.len(), url = %self.url, "relayer bundle fetched");

        self.host
            .eval(&body)
            .await
            .map_err(|err| SdkFault::Load(format!("bundle evaluation failed: {err:#}")))?;

        // Evaluation may finish before the bundle's own async registration
        // does, so poll the slot up to the deadline.
        let deadline = tokio::time::Instant::now() + self.register_wait;
        loop {
            if let Some(sdk) = self.slot.get() {
                return Ok(Some(sdk));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SdkFault::Load(format!(
                    "bundle did not register an SDK within {:?}",
                    self.register_wait
                )));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{CipherSpace, LocalSdk};

    #[tokio::test]
    async fn embedded_source_yields_its_module() -> anyhow::Result<()> {
        let module: Arc<dyn RelayerSdk> = Arc::new(LocalSdk::new(CipherSpace::new()));
        let source = EmbeddedSource::new(Some(module));
        assert!(source.acquire().await?.is_some());

        let empty = EmbeddedSource::absent();
        assert!(empty.acquire().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn global_source_reflects_the_slot() -> anyhow::Result<()> {
        let slot = SdkSlot::new();
        let source = GlobalSource::new(slot.clone());
        assert!(source.acquire().await?.is_none());

        slot.install(Arc::new(LocalSdk::new(CipherSpace::new())));
        assert!(source.acquire().await?.is_some());
        Ok(())
    }
}
