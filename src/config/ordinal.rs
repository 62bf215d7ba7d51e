//! Stable identifier → ordinal mapping
//!
//! Ordinals depend only on the set of identifiers: they are sorted and
//! numbered in order, so two processes registering the same layers in a
//! different order agree on every ordinal.

use std::collections::{BTreeSet, HashMap};

/// Collects identifiers before ordinals are fixed
#[derive(Debug, Default, Clone)]
pub struct StableOrdinalBuilder {
    ids: BTreeSet<String>,
}

impl StableOrdinalBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identifier, returning false if it was already present
    pub fn add(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number the identifiers in sorted order
    pub fn build(self) -> StableOrdinals {
        let ids: Vec<String> = self.ids.into_iter().collect();
        let ordinals = ids
            .iter()
            .enumerate()
            .map(|(ordinal, id)| (id.clone(), ordinal as u32))
            .collect();
        StableOrdinals { ids, ordinals }
    }
}

/// Fixed identifier ↔ ordinal mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StableOrdinals {
    ids: Vec<String>,
    ordinals: HashMap<String, u32>,
}

impl StableOrdinals {
    pub fn ordinal(&self, id: &str) -> Option<u32> {
        self.ordinals.get(id).copied()
    }

    pub fn id(&self, ordinal: u32) -> Option<&str> {
        self.ids.get(ordinal as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_follow_sorted_order() {
        let mut builder = StableOrdinalBuilder::new();
        for id in ["types", "refs", "decls"] {
            assert!(builder.add(id));
        }
        assert!(!builder.add("refs"));

        let ordinals = builder.build();
        assert_eq!(ordinals.ordinal("decls"), Some(0));
        assert_eq!(ordinals.ordinal("refs"), Some(1));
        assert_eq!(ordinals.ordinal("types"), Some(2));
        assert_eq!(ordinals.id(2), Some("types"));
        assert_eq!(ordinals.ordinal("missing"), None);
    }

    #[test]
    fn test_registration_order_is_irrelevant() {
        let ids = ["b", "a", "z", "m", "aa"];
        let mut forward = StableOrdinalBuilder::new();
        let mut backward = StableOrdinalBuilder::new();
        for id in ids {
            forward.add(id);
        }
        for id in ids.iter().rev() {
            backward.add(*id);
        }
        assert_eq!(forward.build(), backward.build());
    }
}
