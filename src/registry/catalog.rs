//! Contributor factories by class name

use crate::config::{Contributor, ContributorFactory, InertContributor};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves the `class` attribute of contributor records
#[derive(Clone, Default)]
pub struct FactoryCatalog {
    factories: HashMap<String, ContributorFactory>,
    fallback: Option<ContributorFactory>,
}

impl FactoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog that answers every class with an [`InertContributor`]
    ///
    /// For tools that inspect an index without running extraction.
    pub fn inert() -> Self {
        Self {
            factories: HashMap::new(),
            fallback: Some(Arc::new(|| Box::new(InertContributor) as Box<dyn Contributor>)),
        }
    }

    /// Register a factory under `class`
    pub fn register<F>(&mut self, class: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Contributor> + Send + Sync + 'static,
    {
        self.factories.insert(class.into(), Arc::new(factory));
        self
    }

    pub fn resolve(&self, class: &str) -> Option<ContributorFactory> {
        self.factories
            .get(class)
            .cloned()
            .or_else(|| self.fallback.clone())
    }

    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.factories.keys().cloned().collect();
        classes.sort();
        classes
    }
}

impl fmt::Debug for FactoryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryCatalog")
            .field("classes", &self.classes())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let mut catalog = FactoryCatalog::new();
        catalog.register("Inert", || Box::new(InertContributor) as Box<dyn Contributor>);
        assert!(catalog.resolve("Inert").is_some());
        assert!(catalog.resolve("Missing").is_none());
        assert_eq!(catalog.classes(), vec!["Inert"]);

        assert!(FactoryCatalog::inert().resolve("Anything").is_some());
    }
}
