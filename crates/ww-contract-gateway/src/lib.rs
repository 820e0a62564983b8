//! Read-only and signed contract access.
//!
//! `WishBoard` mirrors the deployed contract's fixed function surface;
//! `ContractGateway` wraps a bound board with the client-side policies
//! (descending sort, input guards, failure conversion). Writes are
//! fire-and-confirm: a binding returns only after the transaction is
//! confirmed or has failed.

use async_trait::async_trait;
use std::sync::Arc;
use ww_api_types::{
    BoardError, CipherHandle, ContractAddress, MAX_ALIAS_LEN, MAX_MESSAGE_LEN, Wish, WishId,
};

pub mod memory;
pub mod registry;

pub use memory::{InMemoryBoard, StaticConnector};
pub use registry::DeployedAddresses;

/// Failure surface of a contract binding.
#[derive(Debug, thiserror::Error)]
pub enum ChainFault {
    /// The user declined to sign.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Submitted but reverted, or not confirmed within the provider's own
    /// timeout.
    #[error("reverted: {0}")]
    Reverted(String),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// The contract's function surface. Implementations resolve against one
/// deployment; address selection happens before connection.
#[async_trait]
pub trait WishBoard: Send + Sync {
    async fn create_wish(&self, message: &str, alias_name: &str) -> Result<WishId, ChainFault>;

    async fn cheer_wish(
        &self,
        id: WishId,
        handle: &CipherHandle,
        proof: &[u8],
    ) -> Result<(), ChainFault>;

    async fn get_wishes(&self) -> Result<Vec<Wish>, ChainFault>;

    async fn get_wish(&self, id: WishId) -> Result<Wish, ChainFault>;

    async fn get_cheers_handle(&self, id: WishId) -> Result<CipherHandle, ChainFault>;

    /// Non-authoritative plaintext mirror of the encrypted counter.
    async fn get_cheers_mirror(&self, id: WishId) -> Result<u32, ChainFault>;

    async fn next_wish_id(&self) -> Result<WishId, ChainFault>;
}

/// Binds a board client to a resolved deployment address.
pub trait BoardConnector: Send + Sync {
    fn connect(&self, address: &ContractAddress) -> anyhow::Result<Arc<dyn WishBoard>>;
}

pub struct ContractGateway {
    address: ContractAddress,
    board: Arc<dyn WishBoard>,
}

impl ContractGateway {
    pub fn new(address: ContractAddress, board: Arc<dyn WishBoard>) -> Self {
        Self { address, board }
    }

    pub fn address(&self) -> &ContractAddress {
        &self.address
    }

    /// Full wish list, newest first. The descending order is a client-side
    /// sort on `created_at`, not an on-chain guarantee; relative order of
    /// equal timestamps is unspecified.
    pub async fn read_all(&self) -> Result<Vec<Wish>, BoardError> {
        let mut wishes = self.board.get_wishes().await.map_err(read_failed)?;
        wishes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(wishes)
    }

    pub async fn read_one(&self, id: WishId) -> Result<Wish, BoardError> {
        self.board.get_wish(id).await.map_err(read_failed)
    }

    pub async fn read_handle(&self, id: WishId) -> Result<CipherHandle, BoardError> {
        self.board.get_cheers_handle(id).await.map_err(read_failed)
    }

    pub async fn read_mirror(&self, id: WishId) -> Result<u32, BoardError> {
        self.board.get_cheers_mirror(id).await.map_err(read_failed)
    }

    /// Sign and send a wish creation, waiting for confirmation. The length
    /// guard is a UX convenience; the contract stays the source of truth.
    pub async fn submit_create(&self, message: &str, alias_name: &str) -> Result<WishId, BoardError> {
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(BoardError::WriteRejected(format!(
                "message exceeds {MAX_MESSAGE_LEN} characters"
            )));
        }
        if alias_name.chars().count() > MAX_ALIAS_LEN {
            return Err(BoardError::WriteRejected(format!(
                "alias exceeds {MAX_ALIAS_LEN} characters"
            )));
        }

        self.board
            .create_wish(message, alias_name)
            .await
            .map_err(write_failed)
    }

    /// Sign and send an encrypted increment, waiting for confirmation.
    pub async fn submit_cheer(
        &self,
        id: WishId,
        handle: &CipherHandle,
        proof: &[u8],
    ) -> Result<(), BoardError> {
        self.board
            .cheer_wish(id, handle, proof)
            .await
            .map_err(write_failed)
    }
}

fn read_failed(fault: ChainFault) -> BoardError {
    BoardError::ReadFailed(fault_message(fault))
}

fn write_failed(fault: ChainFault) -> BoardError {
    match fault {
        ChainFault::Rejected(message) => BoardError::WriteRejected(message),
        ChainFault::Reverted(message) => BoardError::WriteFailed(message),
        ChainFault::Transport(err) => BoardError::WriteFailed(format!("{err:#}")),
    }
}

fn fault_message(fault: ChainFault) -> String {
    match fault {
        ChainFault::Rejected(message) | ChainFault::Reverted(message) => message,
        ChainFault::Transport(err) => format!("{err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ww_relayer_sdk::local::CipherSpace;

    fn deployment() -> ContractAddress {
        ContractAddress("0x59D5e36E367Ec6d9a479e34Cbcb1d5eDA0dF1f9E".to_owned())
    }

    fn gateway_over(board: Arc<InMemoryBoard>) -> ContractGateway {
        ContractGateway::new(deployment(), board)
    }

    fn author() -> ww_api_types::WalletAddress {
        ww_api_types::WalletAddress("0xAB12".to_owned())
    }

    #[tokio::test]
    async fn read_all_orders_newest_first() -> anyhow::Result<()> {
        let board = Arc::new(InMemoryBoard::new(deployment(), CipherSpace::new()));
        board.set_caller(author());
        board.create_wish("first", "").await?;
        board.create_wish("second", "").await?;
        board.create_wish("third", "").await?;

        let wishes = gateway_over(board).read_all().await?;
        let messages: Vec<&str> = wishes.iter().map(|w| w.message.as_str()).collect();
        assert_eq!(messages, vec!["third", "second", "first"]);
        Ok(())
    }

    #[tokio::test]
    async fn read_all_keeps_later_wishes_ahead_of_an_equal_timestamp_group() -> anyhow::Result<()> {
        let board = Arc::new(InMemoryBoard::new(deployment(), CipherSpace::new()));
        board.set_caller(author());
        board.freeze_clock();
        board.create_wish("same-tick a", "").await?;
        board.create_wish("same-tick b", "").await?;
        board.thaw_clock();
        board.create_wish("later", "").await?;

        let wishes = gateway_over(board).read_all().await?;
        assert_eq!(wishes[0].message, "later");
        assert_eq!(wishes.len(), 3);
        assert_eq!(wishes[1].created_at, wishes[2].created_at);
        Ok(())
    }

    #[tokio::test]
    async fn single_wish_reads_cover_record_and_mirror() -> anyhow::Result<()> {
        let space = CipherSpace::new();
        let board = Arc::new(InMemoryBoard::new(deployment(), space.clone()));
        board.set_caller(author());
        let id = board.create_wish("rain", "Stargazer").await?;
        let increment = space.seal(&deployment(), 1);
        board.cheer_wish(id, &increment, b"proof").await?;

        let gateway = gateway_over(board);
        let wish = gateway.read_one(id).await?;
        assert_eq!(wish.alias_name, "Stargazer");
        assert_eq!(gateway.read_mirror(id).await?, 1);
        assert!(matches!(
            gateway.read_one(WishId(99)).await,
            Err(BoardError::ReadFailed(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_input_is_rejected_before_reaching_the_board() {
        let board = Arc::new(InMemoryBoard::new(deployment(), CipherSpace::new()));
        let gateway = gateway_over(board);

        let long_message = "w".repeat(MAX_MESSAGE_LEN + 1);
        match gateway.submit_create(&long_message, "").await {
            Err(BoardError::WriteRejected(message)) => assert!(message.contains("message")),
            other => panic!("expected WriteRejected, got {other:?}"),
        }

        let long_alias = "a".repeat(MAX_ALIAS_LEN + 1);
        match gateway.submit_create("fine", &long_alias).await {
            Err(BoardError::WriteRejected(message)) => assert!(message.contains("alias")),
            other => panic!("expected WriteRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn board_faults_map_onto_the_taxonomy() -> anyhow::Result<()> {
        let board = Arc::new(InMemoryBoard::new(deployment(), CipherSpace::new()));
        board.set_caller(author());
        let id = board.create_wish("wish", "").await?;
        let gateway = gateway_over(board.clone());

        board.reject_writes(true);
        assert!(matches!(
            gateway.submit_create("another", "").await,
            Err(BoardError::WriteRejected(_))
        ));
        board.reject_writes(false);

        board.fail_writes(true);
        assert!(matches!(
            gateway.submit_create("another", "").await,
            Err(BoardError::WriteFailed(_))
        ));
        board.fail_writes(false);

        board.fail_reads(true);
        assert!(matches!(gateway.read_all().await, Err(BoardError::ReadFailed(_))));
        assert!(matches!(
            gateway.read_handle(id).await,
            Err(BoardError::ReadFailed(_))
        ));
        Ok(())
    }
}
