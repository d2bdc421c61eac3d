//! Per-slot request registry
//!
//! Binds each reusable strip slot to at most one outstanding request. Every
//! request carries a [`CancellationToken`]: producers check the token and
//! stop early, and the UI thread checks the registry before accepting a
//! result.

use doc_model::CancellationToken;
use std::collections::HashMap;

/// Identifier of a reusable thumbnail slot (a strip cell position).
///
/// A slot represents different page indices over its lifetime as the strip
/// scrolls and cells are recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub usize);

/// Unique request identifier
pub type RequestId = u64;

#[derive(Debug)]
struct SlotBinding {
    request_id: RequestId,
    page_index: u32,
    token: CancellationToken,
}

/// Registry binding each slot to its single current request
///
/// Issuing a request for a slot cancels the token of whatever request the
/// slot held before, so a late result for the old request can be recognised
/// as stale. The registry is owned by the UI thread and never shared.
///
/// # Example
///
/// ```
/// use pageview_scheduler::{SlotId, SlotRegistry};
///
/// let mut registry = SlotRegistry::new();
/// let slot = SlotId(0);
///
/// let (first_id, first_token) = registry.issue(slot, 3);
/// let (second_id, _second_token) = registry.issue(slot, 7);
///
/// // The first request was cancelled by reuse of the slot
/// assert!(first_token.is_cancelled());
/// assert!(!registry.is_current(slot, first_id));
/// assert!(registry.is_current(slot, second_id));
/// ```
#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: HashMap<SlotId, SlotBinding>,
    next_request_id: RequestId,
}

impl SlotRegistry {
    /// Create a new empty slot registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new request for a slot
    ///
    /// Cancels the slot's previous request (if any) before binding the new
    /// one. Returns the new request's id and a token for the producer.
    pub fn issue(&mut self, slot: SlotId, page_index: u32) -> (RequestId, CancellationToken) {
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let token = CancellationToken::new();

        let previous = self.slots.insert(
            slot,
            SlotBinding {
                request_id,
                page_index,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        (request_id, token)
    }

    /// Check whether `request_id` is still the live request for `slot`
    ///
    /// Returns `false` once the slot has been reissued, released, or
    /// cancelled.
    pub fn is_current(&self, slot: SlotId, request_id: RequestId) -> bool {
        self.slots.get(&slot).is_some_and(|binding| {
            binding.request_id == request_id && !binding.token.is_cancelled()
        })
    }

    /// Page index the slot is currently bound to
    pub fn page_for(&self, slot: SlotId) -> Option<u32> {
        self.slots.get(&slot).map(|binding| binding.page_index)
    }

    /// Cancel and unbind a slot
    ///
    /// Returns `true` if the slot was bound.
    pub fn cancel(&mut self, slot: SlotId) -> bool {
        match self.slots.remove(&slot) {
            Some(binding) => {
                binding.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel and unbind every slot
    ///
    /// Returns the number of slots that were bound.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.slots.len();
        for (_, binding) in self.slots.drain() {
            binding.token.cancel();
        }
        count
    }

    /// Get the number of bound slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no slot is bound
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
