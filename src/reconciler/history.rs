//! Deduplicated bid history
//!
//! Entries are keyed by transaction signature, so merging is idempotent and
//! any number of writers can interleave without losing entries. Readers get
//! the newest `window` entries, ordered by timestamp, then slot, then
//! signature, all descending except the signature tiebreak.

use crate::event::GameEvent;
use itertools::Itertools;
use parking_lot::RwLock;
use solana_sdk::signature::Signature;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Total order used for every history listing
pub fn newest_first(a: &GameEvent, b: &GameEvent) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| b.slot.cmp(&a.slot))
        .then_with(|| a.signature.as_ref().cmp(b.signature.as_ref()))
}

#[derive(Debug)]
pub struct HistoryBook {
    entries: RwLock<HashMap<Signature, GameEvent>>,
    window: usize,
}

impl HistoryBook {
    pub fn new(window: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            window,
        }
    }

    /// Merge a batch, returning how many signatures were not known before.
    ///
    /// A known message or slot is never replaced by an absent one: push
    /// notifications carry neither, polled transactions may carry both.
    pub fn merge(&self, batch: impl IntoIterator<Item = GameEvent>) -> usize {
        let mut entries = self.entries.write();
        let mut added = 0;
        for mut incoming in batch {
            match entries.get(&incoming.signature) {
                Some(known) => {
                    if incoming.message.is_none() {
                        incoming.message = known.message.clone();
                    }
                    if incoming.slot.is_none() {
                        incoming.slot = known.slot;
                    }
                }
                None => added += 1,
            }
            entries.insert(incoming.signature, incoming);
        }

        // Keep only what can still be shown
        if entries.len() > self.window {
            let keep: Vec<Signature> = entries
                .values()
                .sorted_by(|a, b| newest_first(a, b))
                .take(self.window)
                .map(|e| e.signature)
                .collect();
            entries.retain(|sig, _| keep.contains(sig));
        }
        added
    }

    /// Newest entries, at most `window`
    pub fn snapshot(&self) -> Vec<GameEvent> {
        self.entries
            .read()
            .values()
            .cloned()
            .sorted_by(newest_first)
            .take(self.window)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
