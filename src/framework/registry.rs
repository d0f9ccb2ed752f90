//! # Unit Registry
//!
//! Insertion-ordered map from unit name to unit. Configure, start and shutdown all
//! walk the registry in the order units were registered.

use crate::framework::Unit;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name-unique, insertion-ordered collection of units.
///
/// The registry is filled before the orchestrator starts and only read afterwards;
/// [`Orchestrator::register`](crate::lifecycle::Orchestrator::register) enforces that.
#[derive(Default)]
pub struct UnitRegistry {
    units: Vec<Arc<dyn Unit>>,
    index: HashMap<String, usize>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `unit` unless its name is taken. Returns `false` for a duplicate,
    /// leaving the first registration in place.
    pub fn register(&mut self, unit: Arc<dyn Unit>) -> bool {
        let name = unit.name().to_string();
        if self.index.contains_key(&name) {
            return false;
        }
        self.index.insert(name, self.units.len());
        self.units.push(unit);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Unit>> {
        self.index.get(name).map(|&i| &self.units[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Unit>> {
        self.units.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|unit| unit.name())
    }
}

impl fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::ProbeUnit;

    #[test]
    fn test_duplicate_keeps_first() {
        let mut registry = UnitRegistry::new();
        let first = ProbeUnit::new("db").providing(Arc::new(1u8));

        assert!(registry.register(Arc::new(first)));
        assert!(!registry.register(Arc::new(ProbeUnit::new("db"))));
        assert_eq!(registry.len(), 1);

        // Only the first instance provides a capability.
        let kept = registry.lookup("db").unwrap();
        assert!(kept.provide().is_some());
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let registry = UnitRegistry::new();
        assert!(registry.lookup("missing").is_none());
        assert!(!registry.contains("missing"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_iteration_follows_registration_order() {
        let mut registry = UnitRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Arc::new(ProbeUnit::new(name)));
        }
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(format!("{registry:?}"), r#"["zeta", "alpha", "mid"]"#);
    }
}
