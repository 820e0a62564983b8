//! Per-wish in-flight tracking for encrypted submissions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use ww_api_types::{BoardError, WishId};

/// Set of wish ids currently undergoing an encrypted submission. At most one
/// concurrent action per id is admitted.
#[derive(Clone, Default)]
pub struct PendingActions {
    inner: Arc<Mutex<HashSet<WishId>>>,
}

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `id`, marking it in flight. Membership check and insertion
    /// happen under one lock acquisition, so no task suspension can slip in
    /// between them. The returned guard removes the mark when dropped,
    /// whatever path the operation takes out.
    pub fn begin(&self, id: WishId) -> Result<PendingGuard, BoardError> {
        let mut set = self.inner.lock().expect("pending set poisoned");
        if !set.insert(id) {
            return Err(BoardError::AlreadyInFlight(id));
        }
        Ok(PendingGuard {
            set: self.inner.clone(),
            id,
        })
    }

    pub fn contains(&self, id: WishId) -> bool {
        self.inner.lock().expect("pending set poisoned").contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("pending set poisoned").is_empty()
    }

    pub fn snapshot(&self) -> Vec<WishId> {
        let mut ids: Vec<WishId> = self
            .inner
            .lock()
            .expect("pending set poisoned")
            .iter()
            .copied()
            .collect();
        ids.sort();
        ids
    }
}

pub struct PendingGuard {
    set: Arc<Mutex<HashSet<WishId>>>,
    id: WishId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.set.lock().expect("pending set poisoned").remove(&self.id);
    }
}
