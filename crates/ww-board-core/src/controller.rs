//! Application controller: composes wallet session, SDK bootstrap, and
//! contract gateway into one observable state.
//!
//! The three collaborators initialize independently and can fail
//! independently; the controller must render a coherent snapshot in every
//! combination of wallet/SDK readiness. Provider change notifications are a
//! hard invalidation: a signer bound to a stale chain could silently sign
//! for the wrong network, so the whole environment reloads instead of being
//! patched in place.

use crate::coordinator::{EncryptedActionCoordinator, HandlePoll};
use crate::pending::PendingActions;
use crate::resolver::DecryptionResolver;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};
use ww_api_types::{BoardError, ChainId, ContractAddress, SEPOLIA, SdkPhase, Wish, WishId};
use ww_contract_gateway::{BoardConnector, ContractGateway, DeployedAddresses};
use ww_relayer_sdk::{SdkBootstrapper, SdkSource};
use ww_wallet_session::{ConnectedWallet, WalletProvider, WalletSession};

/// Everything presentation needs, in one read.
#[derive(Debug, Clone)]
pub struct AppSnapshot {
    pub wallet: Option<ConnectedWallet>,
    pub sdk_phase: SdkPhase,
    pub contract: Option<ContractAddress>,
    pub wishes: Vec<Wish>,
    pub pending: Vec<WishId>,
    pub status: Option<String>,
}

pub struct AppController {
    session: WalletSession,
    sources: Vec<Arc<dyn SdkSource>>,
    bootstrapper: RwLock<Arc<SdkBootstrapper>>,
    registry: DeployedAddresses,
    connector: Arc<dyn BoardConnector>,
    default_chain: ChainId,
    gateway: RwLock<Option<Arc<ContractGateway>>>,
    wishes: RwLock<Vec<Wish>>,
    pending: PendingActions,
    status: RwLock<Option<String>>,
    refresh_delay: Duration,
    poll: HandlePoll,
}

impl AppController {
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        sources: Vec<Arc<dyn SdkSource>>,
        connector: Arc<dyn BoardConnector>,
        registry: DeployedAddresses,
    ) -> Self {
        let bootstrapper = Arc::new(SdkBootstrapper::new(sources.clone()));
        Self {
            session: WalletSession::new(provider),
            sources,
            bootstrapper: RwLock::new(bootstrapper),
            registry,
            connector,
            default_chain: SEPOLIA,
            gateway: RwLock::new(None),
            wishes: RwLock::new(Vec::new()),
            pending: PendingActions::new(),
            status: RwLock::new(None),
            refresh_delay: Duration::from_millis(1200),
            poll: HandlePoll::default(),
        }
    }

    /// Chain assumed before a wallet reports one.
    pub fn with_default_chain(mut self, chain: ChainId) -> Self {
        self.default_chain = chain;
        self
    }

    /// Delay before the post-create list re-read.
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn with_handle_poll(mut self, poll: HandlePoll) -> Self {
        self.poll = poll;
        self
    }

    /// Initialize the environment: wallet detection and SDK bootstrap run
    /// concurrently and may complete in either order, then the gateway is
    /// derived and the list loaded. Safe to call in every readiness
    /// combination; failures end up in the status line, not as panics.
    pub async fn start(&self) {
        tokio::join!(self.session.detect(), self.bootstrap_sdk());
        self.derive_gateway();
        if self.gateway().is_some() {
            let _ = self.refresh().await;
        }
    }

    /// Prompt the user for wallet authorization, then re-derive dependent
    /// state for the now-known chain.
    pub async fn connect_wallet(&self) -> Result<ConnectedWallet, BoardError> {
        match self.session.connect().await {
            Ok(wallet) => {
                self.derive_gateway();
                self.set_status(format!("Connected {}", wallet.account.short()));
                if self.gateway().is_some() {
                    let _ = self.refresh().await;
                }
                Ok(wallet)
            }
            Err(err) => {
                self.set_status(err.to_string());
                Err(err)
            }
        }
    }

    /// Re-read the wish list. On failure the previously cached list stays
    /// untouched and the failure is surfaced as a status line.
    pub async fn refresh(&self) -> Result<(), BoardError> {
        let gateway = self.require_gateway()?;
        match gateway.read_all().await {
            Ok(list) => {
                *self.wishes.write().expect("wish cache poisoned") = list;
                Ok(())
            }
            Err(err) => {
                warn!("wish list refresh failed, keeping cached view: {err}");
                self.set_status(err.to_string());
                Err(err)
            }
        }
    }

    /// Create a wish, wait for confirmation, then re-read the list after a
    /// short delay so the node has a chance to reflect it.
    pub async fn submit_wish(&self, message: &str, alias_name: &str) -> Result<WishId, BoardError> {
        if message.trim().is_empty() {
            self.set_status("Please write your wish first".to_owned());
            return Err(BoardError::WriteRejected("wish message is empty".to_owned()));
        }
        let gateway = self.require_gateway()?;
        self.require_wallet()?;

        self.set_status("Submitting your wish...".to_owned());
        match gateway.submit_create(message, alias_name).await {
            Ok(id) => {
                self.set_status("Your wish has been cast to the chain".to_owned());
                tokio::time::sleep(self.refresh_delay).await;
                let _ = self.refresh().await;
                Ok(id)
            }
            Err(err) => {
                self.set_status(err.to_string());
                Err(err)
            }
        }
    }

    /// Submit one encrypted +1 for `wish`. Admission control and the
    /// in-flight mark live in the coordinator; the controller only wires up
    /// the pieces and surfaces the outcome.
    pub async fn cheer(&self, id: WishId) -> Result<(), BoardError> {
        let coordinator = match self.coordinator() {
            Ok(coordinator) => coordinator,
            Err(err) => {
                self.set_status(err.to_string());
                return Err(err);
            }
        };

        self.set_status("Encrypting your cheer...".to_owned());
        match coordinator.cheer(id).await {
            Ok(outcome) => {
                if outcome.fresh_view {
                    self.set_status("Thanks for your cheer!".to_owned());
                } else {
                    self.set_status(
                        "Thanks for your cheer! The board may take a moment to catch up".to_owned(),
                    );
                }
                let _ = self.refresh().await;
                Ok(())
            }
            Err(err) => {
                self.set_status(err.to_string());
                Err(err)
            }
        }
    }

    /// Decrypt the current cheer counter of `wish` for display.
    pub async fn reveal(&self, id: WishId) -> Result<u64, BoardError> {
        let gateway = self.require_gateway()?;
        let instance = self.require_instance()?;

        let resolver = DecryptionResolver::new(instance, gateway);
        match resolver.reveal(id).await {
            Ok(value) => {
                self.set_status(format!("Decrypted cheers for #{id}: {value}"));
                Ok(value)
            }
            Err(err) => {
                self.set_status(err.to_string());
                Err(err)
            }
        }
    }

    /// Drain provider change notifications, reloading on each. Runs until
    /// the provider goes away; embedders spawn it once after `start`.
    pub async fn watch_provider(&self) {
        let Some(mut events) = self.session.subscribe_changes() else {
            return;
        };
        while let Some(event) = events.recv().await {
            info!(?event, "provider change, reloading environment");
            self.reload().await;
        }
    }

    /// Hard invalidation: drop everything derived from the old environment
    /// and initialize again. The bootstrapper is replaced wholesale because
    /// bootstrap is single-attempt per environment.
    pub async fn reload(&self) {
        self.session.reset();
        *self.gateway.write().expect("gateway slot poisoned") = None;
        self.wishes.write().expect("wish cache poisoned").clear();
        *self.bootstrapper.write().expect("bootstrapper slot poisoned") =
            Arc::new(SdkBootstrapper::new(self.sources.clone()));
        self.set_status("Wallet environment changed, reloading".to_owned());
        self.start().await;
    }

    pub fn snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            wallet: self.session.current(),
            sdk_phase: self.bootstrapper().phase(),
            contract: self
                .gateway()
                .map(|gateway| gateway.address().clone()),
            wishes: self.wishes.read().expect("wish cache poisoned").clone(),
            pending: self.pending.snapshot(),
            status: self.status.read().expect("status poisoned").clone(),
        }
    }

    // ── internals ──

    async fn bootstrap_sdk(&self) {
        let bootstrapper = self.bootstrapper();
        let chain = self.active_chain();
        if let Err(err) = bootstrapper.bootstrap(chain, self.session.provider()).await {
            self.set_status(err.to_string());
        }
    }

    fn derive_gateway(&self) {
        let chain = self.active_chain();
        let derived = match self.registry.require(chain) {
            // Legitimately not deployed here; dependent operations will
            // short-circuit as NotReady.
            Err(unconfigured) => {
                info!("{unconfigured}");
                None
            }
            Ok(address) => match self.connector.connect(address) {
                Ok(board) => Some(Arc::new(ContractGateway::new(address.clone(), board))),
                Err(err) => {
                    warn!("contract binding failed: {err:#}");
                    self.set_status(format!("Contract connection failed: {err:#}"));
                    None
                }
            },
        };
        *self.gateway.write().expect("gateway slot poisoned") = derived;
    }

    fn active_chain(&self) -> ChainId {
        self.session
            .current()
            .map(|wallet| wallet.chain)
            .unwrap_or(self.default_chain)
    }

    fn bootstrapper(&self) -> Arc<SdkBootstrapper> {
        self.bootstrapper
            .read()
            .expect("bootstrapper slot poisoned")
            .clone()
    }

    fn gateway(&self) -> Option<Arc<ContractGateway>> {
        self.gateway.read().expect("gateway slot poisoned").clone()
    }

    fn require_gateway(&self) -> Result<Arc<ContractGateway>, BoardError> {
        self.gateway()
            .ok_or_else(|| BoardError::NotReady("no contract deployment for the active chain".to_owned()))
    }

    fn require_instance(&self) -> Result<Arc<dyn ww_relayer_sdk::SdkInstance>, BoardError> {
        self.bootstrapper()
            .instance()
            .ok_or_else(|| BoardError::NotReady("relayer SDK is not ready".to_owned()))
    }

    fn require_wallet(&self) -> Result<ConnectedWallet, BoardError> {
        self.session
            .current()
            .ok_or_else(|| BoardError::NotReady("wallet is not connected".to_owned()))
    }

    fn coordinator(&self) -> Result<EncryptedActionCoordinator, BoardError> {
        let gateway = self.require_gateway()?;
        let instance = self.require_instance()?;
        let wallet = self.require_wallet()?;
        Ok(EncryptedActionCoordinator::new(
            instance,
            gateway,
            wallet.account,
            self.pending.clone(),
            self.poll,
        ))
    }

    fn set_status(&self, message: String) {
        // Single most-recent status; overwritten on every transition.
        *self.status.write().expect("status poisoned") = Some(message);
    }
}
