//! Module registry: resolves module identifiers to constructors.
//!
//! Unknown identifiers are rejected at configuration time, before any event
//! file is opened.

use std::collections::BTreeMap;

use pico_core::{Error, Result};

use crate::module::{AnalysisModule, ModuleOptions};
use crate::modules::{MuTauModule, SkimModule};

/// A module constructor.
pub type ModuleFactory = fn(&ModuleOptions) -> Result<Box<dyn AnalysisModule>>;

/// Registry of known analysis modules.
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// Registry with the built-in modules.
    pub fn builtin() -> Self {
        let mut registry = ModuleRegistry { factories: BTreeMap::new() };
        registry.register("MuTau", MuTauModule::from_options);
        registry.register("Skim", SkimModule::from_options);
        registry
    }

    /// Register a module under an identifier.
    pub fn register(&mut self, name: impl Into<String>, factory: ModuleFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Registered identifiers.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Whether an identifier is known.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Construct a module; unknown identifiers are a configuration error.
    pub fn resolve(&self, name: &str, opts: &ModuleOptions) -> Result<Box<dyn AnalysisModule>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::Config(format!(
                "unknown analysis module '{name}' (available: {})",
                self.names().join(", ")
            ))
        })?;
        factory(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve() {
        let registry = ModuleRegistry::builtin();
        assert!(registry.contains("MuTau"));
        assert!(registry.contains("Skim"));
        let module = registry.resolve("MuTau", &ModuleOptions::new()).unwrap();
        assert_eq!(module.name(), "MuTau");
    }

    #[test]
    fn unknown_module_is_config_error() {
        let registry = ModuleRegistry::builtin();
        let err = registry.resolve("NoSuchModule", &ModuleOptions::new()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
