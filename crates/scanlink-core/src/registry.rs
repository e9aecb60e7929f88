//! Pending-wait registry.
//!
//! Holds at most one [`Wait`] per [`Slot`]. Removing a wait from the registry is
//! the point at which one resolution path wins: every path first removes the
//! wait, and a path that finds nothing to remove does nothing.

use std::collections::HashMap;

use crate::wait::{Slot, Wait, WaitId};

#[derive(Debug, Default)]
pub struct PendingRegistry {
    waits: HashMap<Slot, Wait>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `wait` under its slot, returning whatever occupied the slot.
    pub fn insert(&mut self, wait: Wait) -> Option<Wait> {
        self.waits.insert(wait.slot().clone(), wait)
    }

    pub fn remove(&mut self, slot: &Slot) -> Option<Wait> {
        self.waits.remove(slot)
    }

    /// Remove the wait on `slot` only if it is the one identified by `id`.
    pub fn remove_if(&mut self, slot: &Slot, id: WaitId) -> Option<Wait> {
        match self.waits.get(slot) {
            Some(wait) if wait.id() == id => self.waits.remove(slot),
            _ => None,
        }
    }

    pub fn get(&self, slot: &Slot) -> Option<&Wait> {
        self.waits.get(slot)
    }

    pub fn contains(&self, slot: &Slot) -> bool {
        self.waits.contains_key(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wait> {
        self.waits.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Wait> {
        self.waits.values_mut()
    }

    /// Slots with a pending wait, sorted.
    pub fn slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self.waits.keys().cloned().collect();
        slots.sort();
        slots
    }

    pub fn len(&self) -> usize {
        self.waits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waits.is_empty()
    }

    /// Remove every wait.
    pub fn drain(&mut self) -> Vec<Wait> {
        self.waits.drain().map(|(_, wait)| wait).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::{Continuation, FieldSpec, Policy};
    use std::time::Duration;
    use tokio::time::Instant;

    fn wait(slot: &str, id: u64) -> Wait {
        Wait::new(
            WaitId(id),
            Slot::new(slot),
            vec![FieldSpec::new("A")],
            Policy::Strict,
            Instant::now(),
            Duration::from_secs(1),
            Continuation::new(|_| {}),
        )
    }

    #[test]
    fn test_one_wait_per_slot() {
        let mut registry = PendingRegistry::new();
        assert!(registry.insert(wait("a", 1)).is_none());

        let displaced = registry.insert(wait("a", 2)).unwrap();
        assert_eq!(displaced.id(), WaitId(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_if_checks_identity() {
        let mut registry = PendingRegistry::new();
        registry.insert(wait("a", 2));

        assert!(registry.remove_if(&Slot::new("a"), WaitId(1)).is_none());
        assert!(registry.contains(&Slot::new("a")));

        assert!(registry.remove_if(&Slot::new("a"), WaitId(2)).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_slots_and_drain() {
        let mut registry = PendingRegistry::new();
        registry.insert(wait("b", 1));
        registry.insert(wait("a", 2));

        assert_eq!(registry.slots(), vec![Slot::new("a"), Slot::new("b")]);
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }
}
