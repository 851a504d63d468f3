//! Crash-stats model registry: the static catalogue of exposed models
pub mod docs;
pub mod models;

pub use docs::{dedent_left, ModelDoc};

use crashstats_core::{GatewayError, ModelDescriptor};
use std::collections::BTreeMap;

/// Name → descriptor table, built once at startup and immutable after.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full crash-stats catalogue
    pub fn crashstats() -> Self {
        models::catalogue().into_iter().collect()
    }

    pub fn register(&mut self, descriptor: ModelDescriptor) {
        self.models.insert(descriptor.name.clone(), descriptor);
    }

    /// Resolve a public model name.
    ///
    /// Unknown names and registered-but-internal descriptors are both
    /// `NotFound`; callers never learn which.
    pub fn lookup(&self, name: &str) -> Result<&ModelDescriptor, GatewayError> {
        self.models
            .get(name)
            .filter(|descriptor| descriptor.is_addressable)
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))
    }

    /// Every model callers may address, in name order
    pub fn addressable(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values().filter(|d| d.is_addressable)
    }

    /// Registered names, internal ones included
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Documentation entries for the index page
    pub fn documentation(&self) -> Vec<ModelDoc> {
        self.addressable().map(ModelDoc::from_descriptor).collect()
    }
}

impl FromIterator<ModelDescriptor> for ModelRegistry {
    fn from_iter<I: IntoIterator<Item = ModelDescriptor>>(iter: I) -> Self {
        let mut registry = Self::new();
        for descriptor in iter {
            registry.register(descriptor);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashstats_core::{ModelKind, Permission};

    #[test]
    fn test_unknown_model_not_found() {
        let registry = ModelRegistry::crashstats();
        assert!(matches!(
            registry.lookup("BlaBLabla"),
            Err(GatewayError::NotFound(name)) if name == "BlaBLabla"
        ));
    }

    #[test]
    fn test_base_classes_not_found() {
        let registry = ModelRegistry::crashstats();
        for name in ["SocorroMiddleware", "ESSocorroMiddleware", "Field"] {
            assert!(registry.names().any(|n| n == name), "{name} should be registered");
            assert!(registry.lookup(name).is_err(), "{name} should not be addressable");
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = ModelRegistry::crashstats();
        assert!(registry.lookup("TCBS").is_ok());
        assert!(registry.lookup("tcbs").is_err());
    }

    #[test]
    fn test_addressable_excludes_internal() {
        let registry = ModelRegistry::crashstats();
        let names: Vec<_> = registry.addressable().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"SuperSearch"));
        assert!(!names.contains(&"SocorroMiddleware"));
        assert_eq!(names.len() + 3, registry.len());
    }

    #[test]
    fn test_unredacted_pair_shares_backend() {
        let registry = ModelRegistry::crashstats();
        let redacted = registry.lookup("SuperSearch").unwrap();
        let unredacted = registry.lookup("SuperSearchUnredacted").unwrap();
        assert_eq!(redacted.backend_endpoint, unredacted.backend_endpoint);
        assert!(redacted.is_public());
        assert!(!redacted.redaction.is_empty());
        assert!(unredacted.redaction.is_empty());
        assert_eq!(
            unredacted.permissions_required,
            vec![Permission::ViewExploitability, Permission::ViewPii]
        );
    }

    #[test]
    fn test_reprocessing_is_action() {
        let registry = ModelRegistry::crashstats();
        let reprocessing = registry.lookup("Reprocessing").unwrap();
        assert_eq!(reprocessing.kind, ModelKind::Action);
        assert_eq!(reprocessing.permissions_required, vec![Permission::ReprocessCrashes]);
        assert!(!reprocessing.is_cacheable());
    }

    #[test]
    fn test_documentation_lists_addressable_only() {
        let registry = ModelRegistry::crashstats();
        let docs = registry.documentation();
        assert_eq!(docs.len(), registry.addressable().count());
        assert!(docs.iter().all(|d| d.name != "ESSocorroMiddleware"));
    }
}
