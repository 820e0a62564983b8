//! Per-wish encrypted increment: encrypt, submit, confirm visibility.

use crate::pending::PendingActions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use ww_api_types::{BoardError, WalletAddress, WishId};
use ww_contract_gateway::ContractGateway;
use ww_relayer_sdk::SdkInstance;

/// How long to poll the cheer handle for the freshly written value before
/// giving up on a fresh view. A tunable UX compromise, not a correctness
/// requirement.
#[derive(Debug, Clone, Copy)]
pub struct HandlePoll {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for HandlePoll {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheerOutcome {
    /// False when the node still served the pre-increment handle after the
    /// bounded poll; the view may be stale but the write itself confirmed.
    pub fresh_view: bool,
}

/// Builds the encrypted payload for one +1 and submits it, holding the
/// wish's in-flight mark for the whole round trip.
pub struct EncryptedActionCoordinator {
    instance: Arc<dyn SdkInstance>,
    gateway: Arc<ContractGateway>,
    account: WalletAddress,
    pending: PendingActions,
    poll: HandlePoll,
}

impl EncryptedActionCoordinator {
    pub fn new(
        instance: Arc<dyn SdkInstance>,
        gateway: Arc<ContractGateway>,
        account: WalletAddress,
        pending: PendingActions,
        poll: HandlePoll,
    ) -> Self {
        Self {
            instance,
            gateway,
            account,
            pending,
            poll,
        }
    }

    pub async fn cheer(&self, id: WishId) -> Result<CheerOutcome, BoardError> {
        let guard = self.pending.begin(id)?;
        let result = self.run(id).await;
        drop(guard);
        result
    }

    async fn run(&self, id: WishId) -> Result<CheerOutcome, BoardError> {
        let submission = Uuid::new_v4();
        info!(%submission, wish = %id, "encrypting cheer");

        // Pre-submit handle so the follow-up poll can tell when the node
        // reflects the increment. Losing this read only costs freshness.
        let before = self.gateway.read_handle(id).await.ok();

        let mut builder = self
            .instance
            .create_encrypted_input(self.gateway.address(), &self.account);
        builder.add32(1);
        let payload = builder
            .encrypt()
            .await
            .map_err(|err| BoardError::EncryptionFailed(format!("{err:#}")))?;
        let handle = payload
            .handles
            .first()
            .ok_or_else(|| BoardError::EncryptionFailed("no ciphertext handle produced".to_owned()))?;

        self.gateway.submit_cheer(id, handle, &payload.proof).await?;
        info!(%submission, wish = %id, "cheer confirmed");

        let fresh_view = match before {
            Some(before) => self.wait_for_new_handle(id, &before).await,
            None => false,
        };
        Ok(CheerOutcome { fresh_view })
    }

    async fn wait_for_new_handle(
        &self,
        id: WishId,
        before: &ww_api_types::CipherHandle,
    ) -> bool {
        for attempt in 0..self.poll.attempts {
            match self.gateway.read_handle(id).await {
                Ok(current) if current != *before => return true,
                Ok(_) => debug!(wish = %id, attempt, "handle unchanged, polling again"),
                Err(err) => debug!(wish = %id, attempt, "handle poll failed: {err}"),
            }
            tokio::time::sleep(self.poll.interval).await;
        }
        warn!(wish = %id, "node still serves the pre-increment handle");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{CountingInstance, GatedBoard, StaleReadBoard, fixture};
    use std::sync::atomic::Ordering;
    use ww_api_types::CipherHandle;
    use ww_contract_gateway::WishBoard;

    fn fast_poll() -> HandlePoll {
        HandlePoll {
            attempts: 3,
            interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn successful_cheer_clears_the_pending_mark() -> anyhow::Result<()> {
        let fx = fixture().await?;
        let id = fx.board.create_wish("wish", "").await?;
        let pending = PendingActions::new();
        let coordinator = EncryptedActionCoordinator::new(
            fx.instance.clone(),
            fx.gateway.clone(),
            fx.account.clone(),
            pending.clone(),
            fast_poll(),
        );

        assert!(!pending.contains(id));
        let outcome = coordinator.cheer(id).await?;
        assert!(outcome.fresh_view);
        assert!(pending.is_empty(), "mark must clear on the success path");
        assert_eq!(fx.board.get_cheers_mirror(id).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn every_failure_path_clears_the_pending_mark() -> anyhow::Result<()> {
        // Encryption failure.
        let fx = fixture().await?;
        let id = fx.board.create_wish("wish", "").await?;
        let pending = PendingActions::new();
        let failing = fx.failing_encrypt_instance().await?;
        let coordinator = EncryptedActionCoordinator::new(
            failing,
            fx.gateway.clone(),
            fx.account.clone(),
            pending.clone(),
            fast_poll(),
        );
        assert!(matches!(
            coordinator.cheer(id).await,
            Err(BoardError::EncryptionFailed(_))
        ));
        assert!(pending.is_empty());

        // Signing declined.
        let coordinator = EncryptedActionCoordinator::new(
            fx.instance.clone(),
            fx.gateway.clone(),
            fx.account.clone(),
            pending.clone(),
            fast_poll(),
        );
        fx.board.reject_writes(true);
        assert!(matches!(
            coordinator.cheer(id).await,
            Err(BoardError::WriteRejected(_))
        ));
        assert!(pending.is_empty());
        fx.board.reject_writes(false);

        // Submitted but reverted.
        fx.board.fail_writes(true);
        assert!(matches!(
            coordinator.cheer(id).await,
            Err(BoardError::WriteFailed(_))
        ));
        assert!(pending.is_empty());
        fx.board.fail_writes(false);

        // And the id is admissible again afterwards.
        assert!(coordinator.cheer(id).await.is_ok());
        assert!(pending.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_cheer_for_the_same_wish_is_refused_before_encryption() -> anyhow::Result<()>
    {
        let fx = fixture().await?;
        let id = fx.board.create_wish("wish", "").await?;

        let gated = Arc::new(GatedBoard::new(fx.board.clone()));
        let gateway = Arc::new(ww_contract_gateway::ContractGateway::new(
            fx.gateway.address().clone(),
            gated.clone(),
        ));
        let counting = Arc::new(CountingInstance::new(fx.instance.clone()));
        let pending = PendingActions::new();
        let coordinator = Arc::new(EncryptedActionCoordinator::new(
            counting.clone(),
            gateway,
            fx.account.clone(),
            pending.clone(),
            fast_poll(),
        ));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.cheer(id).await }
        });

        // Wait for the first call to hold the in-flight mark (it is parked
        // inside the gated submit).
        while !pending.contains(id) {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            coordinator.cheer(id).await.map(|_| ()).unwrap_err(),
            BoardError::AlreadyInFlight(id)
        );

        gated.open();
        first.await.expect("task join")?;
        assert!(pending.is_empty());
        assert_eq!(
            counting.encrypt_calls.load(Ordering::SeqCst),
            1,
            "the refused call must never reach the encryption step"
        );
        Ok(())
    }

    #[tokio::test]
    async fn stale_node_view_is_reported_not_raised() -> anyhow::Result<()> {
        let fx = fixture().await?;
        let id = fx.board.create_wish("wish", "").await?;

        let stale = Arc::new(StaleReadBoard::new(fx.board.clone()));
        // Prime the stale cache with the pre-increment handle.
        let _: CipherHandle = stale.get_cheers_handle(id).await?;
        let gateway = Arc::new(ww_contract_gateway::ContractGateway::new(
            fx.gateway.address().clone(),
            stale,
        ));

        let coordinator = EncryptedActionCoordinator::new(
            fx.instance.clone(),
            gateway,
            fx.account.clone(),
            PendingActions::new(),
            fast_poll(),
        );

        let outcome = coordinator.cheer(id).await?;
        assert!(!outcome.fresh_view, "bounded poll exhausts against a stale node");
        assert_eq!(fx.board.get_cheers_mirror(id).await?, 1, "the write itself landed");
        Ok(())
    }
}
