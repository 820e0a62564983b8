//! In-memory board, the process-local stand-in for the deployed contract.
//!
//! Ciphertext handles are resolved against the same `CipherSpace` the local
//! SDK seals into, so an encrypted increment round-trips end to end: the
//! board reads the submitted handle's plaintext, folds it into the counter,
//! and publishes a fresh handle for the new total.

use crate::{BoardConnector, ChainFault, WishBoard};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use ww_api_types::{
    CipherHandle, ContractAddress, MAX_ALIAS_LEN, MAX_MESSAGE_LEN, WalletAddress, Wish, WishId,
};
use ww_relayer_sdk::local::CipherSpace;

struct StoredWish {
    wish: Wish,
    cheers: u64,
}

struct BoardState {
    wishes: Vec<StoredWish>,
    next_id: u64,
    caller: WalletAddress,
    clock: u64,
    tick: u64,
    fail_reads: bool,
    reject_writes: bool,
    fail_writes: bool,
}

pub struct InMemoryBoard {
    address: ContractAddress,
    space: CipherSpace,
    state: Mutex<BoardState>,
}

impl InMemoryBoard {
    pub fn new(address: ContractAddress, space: CipherSpace) -> Self {
        Self {
            address,
            space,
            state: Mutex::new(BoardState {
                wishes: Vec::new(),
                next_id: 1,
                caller: WalletAddress("0x0000000000000000000000000000000000000000".to_owned()),
                clock: 1_700_000_000,
                tick: 1,
                fail_reads: false,
                reject_writes: false,
                fail_writes: false,
            }),
        }
    }

    /// Seed the next assigned id, as if earlier wishes already exist.
    pub fn starting_at(self, id: u64) -> Self {
        self.state.lock().expect("board state poisoned").next_id = id;
        self
    }

    /// The signer future writes are attributed to.
    pub fn set_caller(&self, caller: WalletAddress) {
        self.state.lock().expect("board state poisoned").caller = caller;
    }

    /// Stop the block clock so subsequent wishes share a timestamp.
    pub fn freeze_clock(&self) {
        self.state.lock().expect("board state poisoned").tick = 0;
    }

    pub fn thaw_clock(&self) {
        let mut state = self.state.lock().expect("board state poisoned");
        state.tick = 1;
        state.clock += 1;
    }

    pub fn fail_reads(&self, on: bool) {
        self.state.lock().expect("board state poisoned").fail_reads = on;
    }

    /// Simulate the user declining every signing prompt.
    pub fn reject_writes(&self, on: bool) {
        self.state.lock().expect("board state poisoned").reject_writes = on;
    }

    /// Simulate submitted-but-reverted transactions.
    pub fn fail_writes(&self, on: bool) {
        self.state.lock().expect("board state poisoned").fail_writes = on;
    }

    fn write_gate(state: &BoardState) -> Result<(), ChainFault> {
        if state.reject_writes {
            return Err(ChainFault::Rejected("user denied transaction signature".to_owned()));
        }
        if state.fail_writes {
            return Err(ChainFault::Reverted("transaction reverted".to_owned()));
        }
        Ok(())
    }

    fn read_gate(state: &BoardState) -> Result<(), ChainFault> {
        if state.fail_reads {
            return Err(ChainFault::Transport(anyhow::anyhow!("rpc node unreachable")));
        }
        Ok(())
    }
}

#[async_trait]
impl WishBoard for InMemoryBoard {
    async fn create_wish(&self, message: &str, alias_name: &str) -> Result<WishId, ChainFault> {
        let mut state = self.state.lock().expect("board state poisoned");
        Self::write_gate(&state)?;

        if message.is_empty() {
            return Err(ChainFault::Reverted("empty wish".to_owned()));
        }
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(ChainFault::Reverted("wish too long".to_owned()));
        }
        if alias_name.chars().count() > MAX_ALIAS_LEN {
            return Err(ChainFault::Reverted("alias too long".to_owned()));
        }

        let id = WishId(state.next_id);
        state.next_id += 1;
        let created_at = state.clock;
        state.clock += state.tick;

        let cheers_handle = self.space.seal(&self.address, 0);
        let wish = Wish {
            id,
            author: state.caller.clone(),
            message: message.to_owned(),
            alias_name: alias_name.to_owned(),
            created_at,
            cheers_handle,
            cheers_mirror: Some(0),
        };
        state.wishes.push(StoredWish { wish, cheers: 0 });
        Ok(id)
    }

    async fn cheer_wish(
        &self,
        id: WishId,
        handle: &CipherHandle,
        proof: &[u8],
    ) -> Result<(), ChainFault> {
        let mut state = self.state.lock().expect("board state poisoned");
        Self::write_gate(&state)?;

        if proof.is_empty() {
            return Err(ChainFault::Reverted("missing input proof".to_owned()));
        }
        let Some(increment) = self.space.resolve(handle) else {
            return Err(ChainFault::Reverted("unknown ciphertext handle".to_owned()));
        };

        let stored = state
            .wishes
            .iter_mut()
            .find(|stored| stored.wish.id == id)
            .ok_or_else(|| ChainFault::Reverted(format!("unknown wish id {id}")))?;

        stored.cheers += increment;
        stored.wish.cheers_handle = self.space.seal(&self.address, stored.cheers);
        stored.wish.cheers_mirror = Some(stored.cheers as u32);
        Ok(())
    }

    async fn get_wishes(&self) -> Result<Vec<Wish>, ChainFault> {
        let state = self.state.lock().expect("board state poisoned");
        Self::read_gate(&state)?;
        Ok(state.wishes.iter().map(|stored| stored.wish.clone()).collect())
    }

    async fn get_wish(&self, id: WishId) -> Result<Wish, ChainFault> {
        let state = self.state.lock().expect("board state poisoned");
        Self::read_gate(&state)?;
        state
            .wishes
            .iter()
            .find(|stored| stored.wish.id == id)
            .map(|stored| stored.wish.clone())
            .ok_or_else(|| ChainFault::Reverted(format!("unknown wish id {id}")))
    }

    async fn get_cheers_handle(&self, id: WishId) -> Result<CipherHandle, ChainFault> {
        let state = self.state.lock().expect("board state poisoned");
        Self::read_gate(&state)?;
        state
            .wishes
            .iter()
            .find(|stored| stored.wish.id == id)
            .map(|stored| stored.wish.cheers_handle.clone())
            .ok_or_else(|| ChainFault::Reverted(format!("unknown wish id {id}")))
    }

    async fn get_cheers_mirror(&self, id: WishId) -> Result<u32, ChainFault> {
        let state = self.state.lock().expect("board state poisoned");
        Self::read_gate(&state)?;
        state
            .wishes
            .iter()
            .find(|stored| stored.wish.id == id)
            .map(|stored| stored.cheers as u32)
            .ok_or_else(|| ChainFault::Reverted(format!("unknown wish id {id}")))
    }

    async fn next_wish_id(&self) -> Result<WishId, ChainFault> {
        let state = self.state.lock().expect("board state poisoned");
        Self::read_gate(&state)?;
        Ok(WishId(state.next_id))
    }
}

/// Connector that hands out one fixed board regardless of address, the
/// in-memory analog of binding a contract object to a resolved deployment.
pub struct StaticConnector {
    board: Arc<dyn WishBoard>,
}

impl StaticConnector {
    pub fn new(board: Arc<dyn WishBoard>) -> Self {
        Self { board }
    }
}

impl BoardConnector for StaticConnector {
    fn connect(&self, _address: &ContractAddress) -> anyhow::Result<Arc<dyn WishBoard>> {
        Ok(self.board.clone())
    }
}
