//! Injected-wallet session tracking.
//!
//! `WalletProvider` is the seam to the host environment's wallet; the
//! `WalletSession` owns the connected account/chain pair. Account and chain
//! are always set together or not at all.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use ww_api_types::{BoardError, ChainId, WalletAddress};

/// Fired by the provider for both account and chain changes, at any time,
/// including mid-operation. The application reacts with a full reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged,
    ChainChanged,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderFault {
    /// The user declined the authorization prompt.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Request-based wallet access as the host environment injects it.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Accounts already authorized for this origin. Never prompts.
    async fn detect_accounts(&self) -> Result<Vec<WalletAddress>, ProviderFault>;

    /// Request account authorization, prompting the user if needed.
    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, ProviderFault>;

    async fn chain_id(&self) -> Result<ChainId, ProviderFault>;

    /// Change notifications. Every subscriber sees every event.
    fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<ProviderEvent>;
}

/// The active account/chain pair. Only exists as a whole: a session is
/// either connected with both or connected with neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedWallet {
    pub account: WalletAddress,
    pub chain: ChainId,
}

pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    connected: RwLock<Option<ConnectedWallet>>,
}

impl WalletSession {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self {
            provider,
            connected: RwLock::new(None),
        }
    }

    pub fn provider(&self) -> Option<Arc<dyn WalletProvider>> {
        self.provider.clone()
    }

    pub fn current(&self) -> Option<ConnectedWallet> {
        self.connected.read().expect("wallet state poisoned").clone()
    }

    /// Forget the connected pair. A chain change invalidates any signer
    /// derived from it, so callers must re-derive after this.
    pub fn reset(&self) {
        *self.connected.write().expect("wallet state poisoned") = None;
    }

    /// Passively derive account and chain without prompting. Failures are
    /// swallowed and leave the session unset.
    pub async fn detect(&self) {
        let Some(provider) = self.provider.as_ref() else {
            debug!("no wallet provider present, skipping detection");
            return;
        };

        let accounts = match provider.detect_accounts().await {
            Ok(accounts) => accounts,
            Err(fault) => {
                debug!("wallet detection failed: {fault}");
                return;
            }
        };
        let Some(account) = accounts.into_iter().next() else {
            debug!("wallet present but no account authorized yet");
            return;
        };
        let chain = match provider.chain_id().await {
            Ok(chain) => chain,
            Err(fault) => {
                debug!("chain id lookup failed during detection: {fault}");
                return;
            }
        };

        self.set_connected(ConnectedWallet { account, chain });
    }

    /// Request explicit authorization, then derive account and chain.
    pub async fn connect(&self) -> Result<ConnectedWallet, BoardError> {
        let Some(provider) = self.provider.as_ref() else {
            return Err(BoardError::WalletUnavailable);
        };

        let accounts = provider.request_accounts().await.map_err(|fault| match fault {
            ProviderFault::Rejected(message) => BoardError::UserRejected(message),
            ProviderFault::Other(err) => {
                warn!("wallet provider failed during connect: {err:#}");
                BoardError::WalletUnavailable
            }
        })?;
        let Some(account) = accounts.into_iter().next() else {
            return Err(BoardError::UserRejected("no account authorized".to_owned()));
        };

        let chain = provider.chain_id().await.map_err(|fault| match fault {
            ProviderFault::Rejected(message) => BoardError::UserRejected(message),
            ProviderFault::Other(err) => {
                warn!("chain id lookup failed during connect: {err:#}");
                BoardError::WalletUnavailable
            }
        })?;

        let wallet = ConnectedWallet { account, chain };
        self.set_connected(wallet.clone());
        Ok(wallet)
    }

    pub fn subscribe_changes(&self) -> Option<mpsc::UnboundedReceiver<ProviderEvent>> {
        self.provider.as_ref().map(|p| p.subscribe_changes())
    }

    fn set_connected(&self, wallet: ConnectedWallet) {
        debug!(account = %wallet.account.0, chain = %wallet.chain, "wallet session established");
        *self.connected.write().expect("wallet state poisoned") = Some(wallet);
    }
}

// ── In-memory provider ──

struct ProviderState {
    accounts: Vec<WalletAddress>,
    chain: ChainId,
    authorized: bool,
    reject_requests: bool,
}

/// Scriptable provider for tests and headless embedding. Accounts and chain
/// are fixed at construction; authorization and rejection are toggles.
pub struct InMemoryProvider {
    state: Mutex<ProviderState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ProviderEvent>>>,
}

impl InMemoryProvider {
    pub fn new(account: WalletAddress, chain: ChainId) -> Self {
        Self {
            state: Mutex::new(ProviderState {
                accounts: vec![account],
                chain,
                authorized: false,
                reject_requests: false,
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Mark the account as already authorized, as if the user approved the
    /// prompt in an earlier visit.
    pub fn pre_authorize(&self) {
        self.state.lock().expect("provider state poisoned").authorized = true;
    }

    /// Make the next `request_accounts` calls fail as a user rejection.
    pub fn reject_requests(&self, reject: bool) {
        self.state.lock().expect("provider state poisoned").reject_requests = reject;
    }

    /// Simulate the wallet switching networks.
    pub fn switch_chain(&self, chain: ChainId) {
        self.state.lock().expect("provider state poisoned").chain = chain;
        self.emit(ProviderEvent::ChainChanged);
    }

    /// Simulate the wallet switching to a different account.
    pub fn switch_account(&self, account: WalletAddress) {
        self.state.lock().expect("provider state poisoned").accounts = vec![account];
        self.emit(ProviderEvent::AccountsChanged);
    }

    fn emit(&self, event: ProviderEvent) {
        let mut subscribers = self.subscribers.lock().expect("subscriber list poisoned");
        subscribers.retain(|sender| sender.send(event).is_ok());
    }
}

#[async_trait]
impl WalletProvider for InMemoryProvider {
    async fn detect_accounts(&self) -> Result<Vec<WalletAddress>, ProviderFault> {
        let state = self.state.lock().expect("provider state poisoned");
        if state.authorized {
            Ok(state.accounts.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, ProviderFault> {
        let mut state = self.state.lock().expect("provider state poisoned");
        if state.reject_requests {
            return Err(ProviderFault::Rejected(
                "user denied account authorization".to_owned(),
            ));
        }
        state.authorized = true;
        Ok(state.accounts.clone())
    }

    async fn chain_id(&self) -> Result<ChainId, ProviderFault> {
        Ok(self.state.lock().expect("provider state poisoned").chain)
    }

    fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("subscriber list poisoned")
            .push(sender);
        receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sepolia() -> ChainId {
        ChainId(11155111)
    }

    fn account() -> WalletAddress {
        WalletAddress("0xAB12345678901234567890123456789012345612".to_owned())
    }

    #[tokio::test]
    async fn detect_without_provider_leaves_state_unset() {
        let session = WalletSession::new(None);
        session.detect().await;
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn detect_without_prior_authorization_leaves_state_unset() {
        let provider = Arc::new(InMemoryProvider::new(account(), sepolia()));
        let session = WalletSession::new(Some(provider));
        session.detect().await;
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn detect_picks_up_previously_authorized_account() {
        let provider = Arc::new(InMemoryProvider::new(account(), sepolia()));
        provider.pre_authorize();
        let session = WalletSession::new(Some(provider));
        session.detect().await;

        let wallet = session.current().expect("session should be connected");
        assert_eq!(wallet.account, account());
        assert_eq!(wallet.chain, sepolia());
    }

    #[tokio::test]
    async fn connect_without_provider_is_wallet_unavailable() {
        let session = WalletSession::new(None);
        assert_eq!(
            session.connect().await.unwrap_err(),
            BoardError::WalletUnavailable
        );
    }

    #[tokio::test]
    async fn connect_rejection_maps_to_user_rejected() {
        let provider = Arc::new(InMemoryProvider::new(account(), sepolia()));
        provider.reject_requests(true);
        let session = WalletSession::new(Some(provider));

        match session.connect().await {
            Err(BoardError::UserRejected(message)) => {
                assert!(message.contains("denied"));
            }
            other => panic!("expected UserRejected, got {other:?}"),
        }
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn connect_sets_account_and_chain_together() {
        let provider = Arc::new(InMemoryProvider::new(account(), sepolia()));
        let session = WalletSession::new(Some(provider));

        let wallet = session.connect().await.expect("connect should succeed");
        assert_eq!(wallet.account, account());
        assert_eq!(wallet.chain, sepolia());
        assert_eq!(session.current(), Some(wallet));

        session.reset();
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn chain_switch_reaches_every_subscriber() {
        let provider = Arc::new(InMemoryProvider::new(account(), sepolia()));
        let mut first = provider.subscribe_changes();
        let mut second = provider.subscribe_changes();

        provider.switch_chain(ChainId(1));

        assert_eq!(first.recv().await, Some(ProviderEvent::ChainChanged));
        assert_eq!(second.recv().await, Some(ProviderEvent::ChainChanged));
    }
}
