//! Multi-strategy decryption of on-chain cheer counters.

use std::sync::Arc;
use tracing::debug;
use ww_api_types::{BoardError, WishId};
use ww_contract_gateway::ContractGateway;
use ww_relayer_sdk::{SdkCallFault, SdkInstance};

/// Reads a wish's current handle and tries the SDK's decrypt strategies in
/// preference order: general decrypt first, public decrypt as fallback.
/// Read-only; never touches the in-flight set.
pub struct DecryptionResolver {
    instance: Arc<dyn SdkInstance>,
    gateway: Arc<ContractGateway>,
}

impl DecryptionResolver {
    pub fn new(instance: Arc<dyn SdkInstance>, gateway: Arc<ContractGateway>) -> Self {
        Self { instance, gateway }
    }

    pub async fn reveal(&self, id: WishId) -> Result<u64, BoardError> {
        let handle = self.gateway.read_handle(id).await?;
        let contract = self.gateway.address();

        let primary = match self.instance.decrypt(contract, &handle).await {
            Ok(value) => return Ok(value),
            Err(fault) => {
                debug!(wish = %id, "general decrypt unavailable or failed: {fault}");
                fault
            }
        };

        let fallback = match self.instance.decrypt_public(contract, &handle).await {
            Ok(value) => return Ok(value),
            Err(fault) => fault,
        };

        let mut attempted: Vec<String> = Vec::new();
        for fault in [primary, fallback] {
            if let SdkCallFault::Failed(message) = fault {
                attempted.push(message);
            }
        }
        if attempted.is_empty() {
            Err(BoardError::DecryptionUnavailable)
        } else {
            Err(BoardError::DecryptionFailed(attempted.join("; ")))
        }
    }
}
