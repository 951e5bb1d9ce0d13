use dashmap::DashMap;
use log::debug;
use std::sync::atomic::{ AtomicU64, Ordering };
use tokio_util::sync::CancellationToken;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Revocable signal for one in-flight generation.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    token: CancellationToken,
    id: u64,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            id: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn same_as(&self, other: &AbortHandle) -> bool {
        self.id == other.id
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps conversation ids to the abort handle of their in-flight turn.
///
/// Injected into the proxy rather than reached through a global, so a deployment running
/// several instances can back it with a shared coordination service.
pub trait CancellationRegistry: Send + Sync {
    /// Installs `handle`, returning whatever it displaced. Last writer wins.
    fn register(&self, conversation_id: &str, handle: AbortHandle) -> Option<AbortHandle>;

    /// Aborts and removes the handle for `conversation_id`. `false` means nothing was running.
    fn cancel(&self, conversation_id: &str) -> bool;

    /// Removes the entry without aborting it, but only while it is still `handle`. A turn that
    /// was displaced by a newer one for the same id must not deregister its successor.
    fn clear(&self, conversation_id: &str, handle: &AbortHandle) -> bool;

    fn in_flight(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryCancellationRegistry {
    entries: DashMap<String, AbortHandle>,
}

impl InMemoryCancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CancellationRegistry for InMemoryCancellationRegistry {
    fn register(&self, conversation_id: &str, handle: AbortHandle) -> Option<AbortHandle> {
        self.entries.insert(conversation_id.to_string(), handle)
    }

    fn cancel(&self, conversation_id: &str) -> bool {
        match self.entries.remove(conversation_id) {
            Some((_, handle)) => {
                handle.abort();
                debug!("Abort signalled for conversation {}", conversation_id);
                true
            }
            None => false,
        }
    }

    fn clear(&self, conversation_id: &str, handle: &AbortHandle) -> bool {
        self.entries.remove_if(conversation_id, |_, current| current.same_as(handle)).is_some()
    }

    fn in_flight(&self) -> usize {
        self.entries.len()
    }
}
