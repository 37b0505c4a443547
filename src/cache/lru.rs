//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.
//!
//! Nodes live in a slot arena and link to each other through integer
//! handles, so promotion and removal are O(1) without aliasing pointers.
//!
//! ```text
//!   head (most recent) ─► [h3] ◄──► [h0] ◄──► [h2] ◄── tail (least recent)
//! ```

// == Recency Handle ==
/// Stable position of a key inside the tracker.
///
/// Handles stay valid until the key is removed or evicted; a freed slot may be
/// reused by a later insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecencyHandle(usize);

#[derive(Debug)]
struct Node {
    key: String,
    prev: Option<usize>,
    next: Option<usize>,
}

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// - Head = Most recently used
/// - Tail = Least recently used
#[derive(Debug, Default)]
pub struct LruTracker {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker with room for `capacity` keys before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    // == Push Front ==
    /// Inserts a key as the most recently used and returns its handle.
    pub fn push_front(&mut self, key: String) -> RecencyHandle {
        let node = Node {
            key,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.len += 1;
        self.attach_front(idx);
        RecencyHandle(idx)
    }

    // == Touch ==
    /// Marks a key as recently used (moves to front).
    ///
    /// Returns false if the handle is stale.
    pub fn touch(&mut self, handle: RecencyHandle) -> bool {
        if !self.is_live(handle.0) {
            return false;
        }
        if self.head == Some(handle.0) {
            return true;
        }
        self.detach(handle.0);
        self.attach_front(handle.0);
        true
    }

    // == Remove ==
    /// Removes a key from the tracker, returning it.
    pub fn remove(&mut self, handle: RecencyHandle) -> Option<String> {
        if !self.is_live(handle.0) {
            return None;
        }
        self.detach(handle.0);
        let node = self.slots[handle.0].take()?;
        self.free.push(handle.0);
        self.len -= 1;
        Some(node.key)
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if tracker is empty.
    pub fn evict_oldest(&mut self) -> Option<String> {
        let tail = self.tail?;
        self.remove(RecencyHandle(tail))
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&str> {
        self.tail.and_then(|idx| self.key(idx))
    }

    /// Returns the key stored at `handle`.
    pub fn get(&self, handle: RecencyHandle) -> Option<&str> {
        self.key(handle.0)
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.len
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates keys from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        let mut current = self.head;
        std::iter::from_fn(move || {
            let idx = current?;
            let node = self.slots.get(idx)?.as_ref()?;
            current = node.next;
            Some(node.key.as_str())
        })
    }

    /// Number of arena slots, live or free. Slot positions below this bound
    /// are what [`keys_in_slots`](LruTracker::keys_in_slots) walks.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Keys held in slots `start..end`, in slot order rather than recency order.
    ///
    /// A key keeps its slot until it is removed, so walking consecutive ranges
    /// visits every key that stays present for the whole walk exactly once.
    pub fn keys_in_slots(&self, start: usize, end: usize) -> impl Iterator<Item = &str> + '_ {
        let end = end.min(self.slots.len());
        self.slots
            .get(start.min(end)..end)
            .into_iter()
            .flatten()
            .filter_map(|slot| slot.as_ref().map(|node| node.key.as_str()))
    }

    fn is_live(&self, idx: usize) -> bool {
        matches!(self.slots.get(idx), Some(Some(_)))
    }

    fn key(&self, idx: usize) -> Option<&str> {
        self.slots.get(idx)?.as_ref().map(|node| node.key.as_str())
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.slots[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(node) = self.slots[h].as_mut() {
                    node.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    /// Walks the list and panics if links, length or free slots disagree.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let mut seen = std::collections::HashSet::new();
        let mut prev = None;
        let mut current = self.head;
        while let Some(idx) = current {
            assert!(seen.insert(idx), "cycle at slot {}", idx);
            let node = self.slots[idx].as_ref().expect("linked slot is free");
            assert_eq!(node.prev, prev, "broken back link at slot {}", idx);
            prev = Some(idx);
            current = node.next;
        }
        assert_eq!(self.tail, prev);
        assert_eq!(seen.len(), self.len);
        assert_eq!(self.slots.len(), self.len + self.free.len());
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn filled(keys: &[&str]) -> (LruTracker, Vec<RecencyHandle>) {
        let mut lru = LruTracker::new();
        let handles = keys.iter().map(|k| lru.push_front(k.to_string())).collect();
        (lru, handles)
    }

    #[test]
    fn test_lru_new() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.peek_oldest(), None);
    }

    #[test]
    fn test_lru_push_new_keys() {
        let (lru, _) = filled(&["key1", "key2", "key3"]);

        assert_eq!(lru.len(), 3);
        // key1 is oldest (added first)
        assert_eq!(lru.peek_oldest(), Some("key1"));
        assert_eq!(lru.iter().collect::<Vec<_>>(), vec!["key3", "key2", "key1"]);
        lru.debug_validate_invariants();
    }

    #[test]
    fn test_lru_touch_existing_key() {
        let (mut lru, handles) = filled(&["key1", "key2", "key3"]);

        assert!(lru.touch(handles[0]));

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some("key2"));
        lru.debug_validate_invariants();
    }

    #[test]
    fn test_lru_touch_head_is_noop() {
        let (mut lru, handles) = filled(&["a", "b"]);

        assert!(lru.touch(handles[1]));
        assert_eq!(lru.iter().collect::<Vec<_>>(), vec!["b", "a"]);
        lru.debug_validate_invariants();
    }

    #[test]
    fn test_lru_evict_oldest() {
        let (mut lru, _) = filled(&["key1", "key2", "key3"]);

        assert_eq!(lru.evict_oldest(), Some("key1".to_string()));
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.evict_oldest(), Some("key2".to_string()));
        assert_eq!(lru.len(), 1);
        lru.debug_validate_invariants();
    }

    #[test]
    fn test_lru_evict_empty() {
        let mut lru = LruTracker::new();
        assert_eq!(lru.evict_oldest(), None);
    }

    #[test]
    fn test_lru_remove_middle() {
        let (mut lru, handles) = filled(&["key1", "key2", "key3"]);

        assert_eq!(lru.remove(handles[1]), Some("key2".to_string()));

        assert_eq!(lru.len(), 2);
        assert_eq!(lru.iter().collect::<Vec<_>>(), vec!["key3", "key1"]);
        lru.debug_validate_invariants();
    }

    #[test]
    fn test_lru_stale_handle() {
        let (mut lru, handles) = filled(&["key1", "key2"]);

        lru.remove(handles[0]);

        assert_eq!(lru.remove(handles[0]), None);
        assert!(!lru.touch(handles[0]));
        assert_eq!(lru.get(handles[0]), None);
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn test_lru_reuses_freed_slots() {
        let (mut lru, handles) = filled(&["a", "b", "c"]);

        lru.remove(handles[1]);
        let d = lru.push_front("d".to_string());

        assert_eq!(d, handles[1]);
        assert_eq!(lru.get(d), Some("d"));
        assert_eq!(lru.iter().collect::<Vec<_>>(), vec!["d", "c", "a"]);
        lru.debug_validate_invariants();
    }

    #[test]
    fn test_lru_order_after_multiple_touches() {
        let (mut lru, h) = filled(&["a", "b", "c"]);

        // front=[c, b, a] -> touch a, c, b -> front=[b, c, a]
        lru.touch(h[0]);
        lru.touch(h[2]);
        lru.touch(h[1]);

        assert_eq!(lru.evict_oldest(), Some("a".to_string()));
        assert_eq!(lru.evict_oldest(), Some("c".to_string()));
        assert_eq!(lru.evict_oldest(), Some("b".to_string()));
        assert!(lru.is_empty());
        lru.debug_validate_invariants();
    }
}
