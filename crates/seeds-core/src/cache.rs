use std::{
    collections::{HashMap, VecDeque},
    time::Instant,
};

use crate::{
    domain::{MessageId, MessageRef},
    messaging::types::GalleryMessage,
};

/// Mirror posted for an original gallery message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedCopy {
    pub copy: MessageRef,
    pub follow_up: bool,
    /// Author name as rendered in the header when the mirror was posted.
    pub author_name: String,
}

/// Bounded per-guild mapping from original message id to its mirror.
///
/// Eviction is FIFO by insertion: lookups never change which entry goes next.
#[derive(Debug)]
pub struct MessageCache {
    max_cache_size: usize,
    copies: HashMap<MessageId, CachedCopy>,
    order: VecDeque<MessageId>,
    last_message: Option<(GalleryMessage, Instant)>,
}

impl MessageCache {
    /// Panics if `max_cache_size` is zero.
    pub fn new(max_cache_size: usize) -> Self {
        assert!(max_cache_size > 0, "max_cache_size must be > 0");
        Self {
            max_cache_size,
            copies: HashMap::with_capacity(max_cache_size),
            order: VecDeque::with_capacity(max_cache_size),
            last_message: None,
        }
    }

    pub fn len(&self) -> usize {
        self.copies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    /// Most recently cached original message and when it was recorded.
    pub fn last_message(&self) -> Option<(&GalleryMessage, Instant)> {
        self.last_message.as_ref().map(|(msg, at)| (msg, *at))
    }

    pub fn cached_copy(&self, original_id: MessageId) -> Option<&CachedCopy> {
        self.copies.get(&original_id)
    }

    pub fn cache_message(&mut self, original: &GalleryMessage, copy: MessageRef, follow_up: bool) {
        self.cache_message_at(original, copy, follow_up, Instant::now());
    }

    pub fn cache_message_at(
        &mut self,
        original: &GalleryMessage,
        copy: MessageRef,
        follow_up: bool,
        now: Instant,
    ) {
        let entry = CachedCopy {
            copy,
            follow_up,
            author_name: original.author.display_name.clone(),
        };

        if let Some(existing) = self.copies.get_mut(&original.id) {
            // Same key: replace in place, insertion position unchanged.
            *existing = entry;
        } else {
            if self.copies.len() >= self.max_cache_size {
                if let Some(oldest) = self.order.pop_front() {
                    self.copies.remove(&oldest);
                }
            }
            self.order.push_back(original.id);
            self.copies.insert(original.id, entry);
        }

        self.last_message = Some((original.clone(), now));
    }

    /// Drop the entry for an original whose mirror is gone.
    pub fn forget(&mut self, original_id: MessageId) -> Option<CachedCopy> {
        let removed = self.copies.remove(&original_id)?;
        self.order.retain(|id| *id != original_id);
        Some(removed)
    }

    /// Drop the entry whose mirror is `copy`, if any.
    pub fn forget_copy(&mut self, copy: MessageRef) -> Option<MessageId> {
        let original_id = self
            .order
            .iter()
            .copied()
            .find(|id| self.copies.get(id).is_some_and(|c| c.copy == copy))?;
        self.forget(original_id);
        Some(original_id)
    }
}
