//! Registry of in-flight requests, keyed by transfer.
//!
//! Owned by the event loop; callers never touch it directly.

use std::collections::hash_map::{Entry, HashMap};

use crate::request::RequestDescriptor;
use crate::transport::TransferId;

#[derive(Debug, Default)]
pub struct RequestRegistry {
    entries: HashMap<TransferId, RequestDescriptor>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its transfer.
    ///
    /// Hands the descriptor back if the transfer is already registered.
    pub fn insert(
        &mut self,
        id: TransferId,
        descriptor: RequestDescriptor,
    ) -> Result<(), RequestDescriptor> {
        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(descriptor),
            Entry::Vacant(slot) => {
                slot.insert(descriptor);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, id: TransferId) -> Option<RequestDescriptor> {
        self.entries.remove(&id)
    }

    #[cfg(test)]
    pub fn contains(&self, id: TransferId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every descriptor without completing it.
    pub fn drain(&mut self) -> impl Iterator<Item = (TransferId, RequestDescriptor)> + '_ {
        self.entries.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CompletionAction;
    use crate::transport::{Method, TransferSpec};

    fn descriptor() -> RequestDescriptor {
        let spec = TransferSpec::new(Method::Get, "http://x/", None).unwrap();
        RequestDescriptor::new(spec, CompletionAction::callback(|_| {}))
    }

    #[test]
    fn insert_and_remove_by_transfer() {
        let mut registry = RequestRegistry::new();
        let id = TransferId::from_raw(10);
        registry.insert(id, descriptor()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(id));

        assert!(registry.remove(TransferId::from_raw(11)).is_none());
        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_transfer_is_rejected() {
        let mut registry = RequestRegistry::new();
        let id = TransferId::from_raw(1);
        registry.insert(id, descriptor()).unwrap();
        assert!(registry.insert(id, descriptor()).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn drain_empties_registry() {
        let mut registry = RequestRegistry::new();
        registry.insert(TransferId::from_raw(1), descriptor()).unwrap();
        registry.insert(TransferId::from_raw(2), descriptor()).unwrap();
        assert_eq!(registry.drain().count(), 2);
        assert!(registry.is_empty());
    }
}
