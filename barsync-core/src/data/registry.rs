//! Provider registry: maps configured `(provider id, class)` pairs to
//! constructors.

use super::fetch::Fetch;
use super::finam::FinamProvider;
use super::provider::{Provider, ProviderError};
use super::quotemedia::QuotemediaProvider;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no provider registered for {provider}/{class}")]
    Unresolvable { provider: String, class: String },

    #[error("failed to construct {provider}/{class}: {source}")]
    Construct {
        provider: String,
        class: String,
        #[source]
        source: ProviderError,
    },
}

pub type Constructor = Box<dyn Fn() -> Result<Box<dyn Provider>, ProviderError> + Send + Sync>;

/// Constructor table populated at startup.
#[derive(Default)]
pub struct ProviderRegistry {
    constructors: IndexMap<(String, String), Constructor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled Finam and Quotemedia providers.
    pub fn builtin(fetch: Arc<dyn Fetch>) -> Self {
        let mut registry = Self::new();

        let finam_fetch = Arc::clone(&fetch);
        registry.register("finam", "FinamProvider", move || {
            let provider: Box<dyn Provider> =
                Box::new(FinamProvider::new(Arc::clone(&finam_fetch))?);
            Ok(provider)
        });

        registry.register("quotemedia", "QuotemediaProvider", move || {
            let provider: Box<dyn Provider> =
                Box::new(QuotemediaProvider::new(Arc::clone(&fetch)));
            Ok(provider)
        });

        registry
    }

    /// Register a constructor; a later registration replaces an earlier one.
    pub fn register<F>(&mut self, provider: &str, class: &str, constructor: F)
    where
        F: Fn() -> Result<Box<dyn Provider>, ProviderError> + Send + Sync + 'static,
    {
        self.constructors
            .insert((provider.to_string(), class.to_string()), Box::new(constructor));
    }

    pub fn contains(&self, provider: &str, class: &str) -> bool {
        self.constructors
            .contains_key(&(provider.to_string(), class.to_string()))
    }

    /// Construct a fresh provider instance for `provider`/`class`.
    pub fn resolve(&self, provider: &str, class: &str) -> Result<Box<dyn Provider>, RegistryError> {
        let constructor = self
            .constructors
            .get(&(provider.to_string(), class.to_string()))
            .ok_or_else(|| RegistryError::Unresolvable {
                provider: provider.to_string(),
                class: class.to_string(),
            })?;

        constructor().map_err(|source| RegistryError::Construct {
            provider: provider.to_string(),
            class: class.to_string(),
            source,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.constructors
            .keys()
            .map(|(p, c)| (p.as_str(), c.as_str()))
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries().map(|(p, c)| format!("{p}/{c}")))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fetch::FetchError;

    struct Offline;

    impl Fetch for Offline {
        fn get(&self, url: &str, _headers: &[(&str, &str)]) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Transport {
                url: url.to_string(),
                message: "offline".into(),
            })
        }
    }

    #[test]
    fn builtin_registers_bundled_providers() {
        let registry = ProviderRegistry::builtin(Arc::new(Offline));
        assert!(registry.contains("finam", "FinamProvider"));
        assert!(registry.contains("quotemedia", "QuotemediaProvider"));
        assert_eq!(registry.entries().count(), 2);
    }

    #[test]
    fn resolves_quotemedia_without_network() {
        let registry = ProviderRegistry::builtin(Arc::new(Offline));
        let provider = registry.resolve("quotemedia", "QuotemediaProvider").unwrap();
        assert_eq!(provider.name(), "quotemedia");
    }

    #[test]
    fn unknown_pair_is_unresolvable() {
        let registry = ProviderRegistry::builtin(Arc::new(Offline));
        match registry.resolve("stooq", "StooqProvider") {
            Err(RegistryError::Unresolvable { provider, class }) => {
                assert_eq!(provider, "stooq");
                assert_eq!(class, "StooqProvider");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("should not resolve"),
        }
    }

    #[test]
    fn constructor_failure_is_reported() {
        let registry = ProviderRegistry::builtin(Arc::new(Offline));
        assert!(matches!(
            registry.resolve("finam", "FinamProvider"),
            Err(RegistryError::Construct { .. })
        ));
    }
}
