//! # Bounded Mailboxes
//!
//! A FIFO that drops its oldest entry instead of refusing a new one, and a
//! keyed collection of them.

use parking_lot::{Mutex, RwLock};
use shared_types::RoutingKey;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// FIFO queue with a fixed capacity. A capacity of `0` means unbounded.
///
/// Safe to use from any thread.
#[derive(Debug)]
pub struct BoundedMailbox<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    evicted: AtomicU64,
}

impl<T> BoundedMailbox<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    /// Append an item. When full, the oldest item is removed and returned.
    pub fn put(&self, item: T) -> Option<T> {
        let mut queue = self.queue.lock();
        let evicted = if self.capacity > 0 && queue.len() >= self.capacity {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(item);
        evicted
    }

    /// Append `count` copies of `item` under one lock and return how many
    /// items overflow pushed out. Copies that would be evicted by later
    /// copies of the same call are counted but never built.
    pub fn put_copies(&self, item: T, count: usize) -> usize
    where
        T: Clone,
    {
        if count == 0 {
            return 0;
        }
        let mut queue = self.queue.lock();
        let (kept, overflow) = if self.capacity > 0 {
            let kept = count.min(self.capacity);
            let overflow = (queue.len() + count).saturating_sub(self.capacity);
            let room = self.capacity - kept;
            while queue.len() > room {
                queue.pop_front();
            }
            (kept, overflow)
        } else {
            (count, 0)
        };
        for _ in 1..kept {
            queue.push_back(item.clone());
        }
        queue.push_back(item);
        self.evicted.fetch_add(overflow as u64, Ordering::Relaxed);
        overflow
    }

    /// Remove and return every item in insertion order.
    pub fn drain_all(&self) -> Vec<T> {
        self.queue.lock().drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items dropped by overflow since creation.
    #[must_use]
    pub fn evicted_total(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

/// Mailboxes keyed by [`RoutingKey`], created on first use.
#[derive(Debug)]
pub struct MailboxSet<T> {
    capacity: usize,
    boxes: RwLock<HashMap<RoutingKey, Arc<BoundedMailbox<T>>>>,
}

impl<T> MailboxSet<T> {
    /// Every mailbox in the set gets `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            boxes: RwLock::new(HashMap::new()),
        }
    }

    /// Mailbox for `key`, created empty if it does not exist yet.
    pub fn get_or_create(&self, key: &RoutingKey) -> Arc<BoundedMailbox<T>> {
        if let Some(mailbox) = self.boxes.read().get(key) {
            return Arc::clone(mailbox);
        }
        let mut boxes = self.boxes.write();
        Arc::clone(
            boxes
                .entry(key.clone())
                .or_insert_with(|| Arc::new(BoundedMailbox::new(self.capacity))),
        )
    }

    /// Enqueue into the mailbox for `key`, returning any evicted item.
    pub fn put(&self, key: &RoutingKey, item: T) -> Option<T> {
        self.get_or_create(key).put(item)
    }

    /// Drain every mailbox; keys with nothing pending are left out.
    pub fn drain_grouped(&self) -> BTreeMap<RoutingKey, Vec<T>> {
        let boxes = self.boxes.read();
        boxes
            .iter()
            .filter_map(|(key, mailbox)| {
                let items = mailbox.drain_all();
                (!items.is_empty()).then(|| (key.clone(), items))
            })
            .collect()
    }

    /// Drain the mailbox for `key` only.
    pub fn drain(&self, key: &str) -> Vec<T> {
        self.boxes
            .read()
            .get(key)
            .map(|mailbox| mailbox.drain_all())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len_of(&self, key: &str) -> usize {
        self.boxes.read().get(key).map_or(0, |mailbox| mailbox.len())
    }

    #[must_use]
    pub fn keys(&self) -> Vec<RoutingKey> {
        let mut keys: Vec<_> = self.boxes.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn evicted_total(&self) -> u64 {
        self.boxes
            .read()
            .values()
            .map(|mailbox| mailbox.evicted_total())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let mailbox = BoundedMailbox::new(10);
        for i in 0..5 {
            assert!(mailbox.put(i).is_none());
        }
        assert_eq!(mailbox.drain_all(), vec![0, 1, 2, 3, 4]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mailbox = BoundedMailbox::new(3);
        for i in 1..=3 {
            mailbox.put(i);
        }
        assert_eq!(mailbox.put(4), Some(1));
        assert_eq!(mailbox.len(), 3);
        assert_eq!(mailbox.drain_all(), vec![2, 3, 4]);
        assert_eq!(mailbox.evicted_total(), 1);
    }

    #[test]
    fn test_put_copies_within_capacity() {
        let mailbox = BoundedMailbox::new(10);
        mailbox.put(0);
        assert_eq!(mailbox.put_copies(7, 3), 0);
        assert_eq!(mailbox.drain_all(), vec![0, 7, 7, 7]);
    }

    #[test]
    fn test_put_copies_overflow_matches_repeated_put() {
        let mailbox = BoundedMailbox::new(4);
        mailbox.put(1);
        mailbox.put(2);
        assert_eq!(mailbox.put_copies(9, 3), 1);
        assert_eq!(mailbox.drain_all(), vec![2, 9, 9, 9]);

        mailbox.put(1);
        assert_eq!(mailbox.put_copies(9, 10), 7);
        assert_eq!(mailbox.drain_all(), vec![9, 9, 9, 9]);
        assert_eq!(mailbox.evicted_total(), 8);
    }

    #[test]
    fn test_put_copies_huge_count_is_bounded() {
        let mailbox = BoundedMailbox::new(200);
        let overflow = mailbox.put_copies(1u8, u32::MAX as usize);
        assert_eq!(mailbox.len(), 200);
        assert_eq!(overflow, u32::MAX as usize - 200);
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let mailbox = BoundedMailbox::new(0);
        for i in 0..5_000 {
            assert!(mailbox.put(i).is_none());
        }
        assert_eq!(mailbox.len(), 5_000);
    }

    #[test]
    fn test_drain_empty() {
        let mailbox: BoundedMailbox<u8> = BoundedMailbox::new(4);
        assert!(mailbox.drain_all().is_empty());
    }

    #[test]
    fn test_concurrent_producers_respect_capacity() {
        let mailbox = Arc::new(BoundedMailbox::new(50));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let mailbox = Arc::clone(&mailbox);
                thread::spawn(move || {
                    for i in 0..100 {
                        mailbox.put(t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(mailbox.len(), 50);
        assert_eq!(mailbox.evicted_total(), 350);
    }

    #[test]
    fn test_set_groups_by_key() {
        let set = MailboxSet::new(10);
        let a = RoutingKey::from("a");
        let b = RoutingKey::from("b");
        set.put(&a, 1);
        set.put(&b, 2);
        set.put(&a, 3);
        set.get_or_create(&RoutingKey::from("empty"));

        let grouped = set.drain_grouped();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&a], vec![1, 3]);
        assert_eq!(grouped[&b], vec![2]);
        assert_eq!(set.len_of("a"), 0);
    }

    #[test]
    fn test_set_drain_single_key() {
        let set = MailboxSet::new(10);
        set.put(&RoutingKey::from("a"), 1);
        set.put(&RoutingKey::from("b"), 2);
        assert_eq!(set.drain("a"), vec![1]);
        assert_eq!(set.drain("missing"), Vec::<i32>::new());
        assert_eq!(set.len_of("b"), 1);
    }
}
