use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::{share, InferenceBackend, SharedBackend};

/// Named inference backends.
///
/// Backends are wrapped in `Mutex` because `InferenceBackend::analyze` takes `&mut self`.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: InferenceBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, share(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::SimulatedBackend;
    use crate::detect::{InferenceError, RawDetection};
    use crate::frame::StillImage;

    struct NamedBackend(&'static str);

    impl InferenceBackend for NamedBackend {
        fn name(&self) -> &'static str {
            self.0
        }

        fn analyze(&mut self, _still: &StillImage) -> Result<Vec<RawDetection>, InferenceError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn first_registered_is_default() {
        let mut registry = BackendRegistry::new();
        registry.register(SimulatedBackend::new(Some(1)));
        registry.register(NamedBackend("other"));
        assert_eq!(registry.default_name(), Some("simulated"));
        assert_eq!(registry.list(), vec!["other", "simulated"]);

        registry.set_default("other").unwrap();
        let backend = registry.default_backend().unwrap();
        assert_eq!(backend.lock().unwrap().name(), "other");
    }

    #[test]
    fn unknown_default_is_rejected() {
        let mut registry = BackendRegistry::default();
        assert!(registry.set_default("gemini").is_err());
        assert!(registry.default_backend().is_none());
    }
}
