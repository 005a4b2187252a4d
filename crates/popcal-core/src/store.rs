use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::item::{ItemId, TimeBoundedItem};

/// An immutable item collection. Render passes hold an `Arc` to one of
/// these, so a concurrent load can never change items mid-pass.
#[derive(Debug, Default)]
pub struct ItemSnapshot {
    generation: u64,
    items: Vec<TimeBoundedItem>,
}

impl ItemSnapshot {
    pub fn new(generation: u64, items: Vec<TimeBoundedItem>) -> Self {
        Self { generation, items }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn items(&self) -> &[TimeBoundedItem] {
        &self.items
    }

    pub fn get(&self, id: &ItemId) -> Option<&TimeBoundedItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Issued when a load starts; only the newest ticket to commit wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn number(&self) -> u64 {
        self.0
    }
}

pub struct ItemStore {
    next_ticket: AtomicU64,
    current: Mutex<Arc<ItemSnapshot>>,
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStore {
    pub fn new() -> Self {
        Self {
            next_ticket: AtomicU64::new(1),
            current: Mutex::new(Arc::new(ItemSnapshot::default())),
        }
    }

    /// Starts with `items` already committed.
    pub fn with_items(items: Vec<TimeBoundedItem>) -> Self {
        let store = Self::new();
        let ticket = store.begin_load();
        store.commit(ticket, items);
        store
    }

    pub fn begin_load(&self) -> LoadTicket {
        let ticket = LoadTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst));
        debug!(ticket = ticket.0, "load started");
        ticket
    }

    /// Installs `items` unless a newer load already committed. Returns
    /// whether the snapshot was replaced.
    #[instrument(level = "debug", skip_all, fields(ticket = ticket.0, items = items.len()))]
    pub fn commit(&self, ticket: LoadTicket, items: Vec<TimeBoundedItem>) -> bool {
        let mut current = self.current.lock();
        if ticket.0 <= current.generation {
            warn!(
                ticket = ticket.0,
                committed = current.generation,
                "stale load ignored"
            );
            return false;
        }

        *current = Arc::new(ItemSnapshot::new(ticket.0, items));
        info!(generation = ticket.0, items = current.len(), "item snapshot replaced");
        true
    }

    pub fn snapshot(&self) -> Arc<ItemSnapshot> {
        self.current.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemRecord;

    fn items(names: &[&str]) -> Vec<TimeBoundedItem> {
        names
            .iter()
            .map(|name| {
                TimeBoundedItem::from_record(ItemRecord {
                    name: Some(name.to_string()),
                    ..ItemRecord::default()
                })
            })
            .collect()
    }

    #[test]
    fn starts_empty() {
        let store = ItemStore::new();
        let snapshot = store.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.generation(), 0);
    }

    #[test]
    fn stale_load_is_ignored() {
        let store = ItemStore::new();
        let slow = store.begin_load();
        let fast = store.begin_load();

        assert!(store.commit(fast, items(&["Fresh"])));
        assert!(!store.commit(slow, items(&["Stale", "Data"])));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.generation(), fast.number());
        assert!(snapshot.get(&ItemId::new("fresh")).is_some());
    }

    #[test]
    fn held_snapshot_survives_a_swap() {
        let store = ItemStore::with_items(items(&["Old"]));
        let held = store.snapshot();

        let ticket = store.begin_load();
        assert!(store.commit(ticket, items(&["New", "Newer"])));

        assert_eq!(held.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn loads_from_threads_keep_the_newest_ticket() {
        let store = Arc::new(ItemStore::new());
        let tickets: Vec<LoadTicket> = (0..8).map(|_| store.begin_load()).collect();
        let newest = tickets.iter().copied().max().expect("tickets issued");

        let handles: Vec<_> = tickets
            .into_iter()
            .rev()
            .map(|ticket| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.commit(ticket, items(&["Booth"]));
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("commit thread");
        }

        assert_eq!(store.snapshot().generation(), newest.number());
    }
}
