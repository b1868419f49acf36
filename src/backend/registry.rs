//! Process-wide backend registry, keyed by name.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use once_cell::sync::Lazy;

use super::Backend;

static REGISTRY: Lazy<RwLock<HashMap<String, Arc<dyn Backend>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a backend under its reported name. Returns false when the name
/// was already taken.
pub fn register_backend(backend: Arc<dyn Backend>) -> bool {
    let name = backend.info().name.clone();
    let mut registry = REGISTRY.write().expect("backend registry poisoned");
    if registry.contains_key(&name) {
        return false;
    }
    registry.insert(name, backend);
    true
}

pub fn find_backend(name: &str) -> Option<Arc<dyn Backend>> {
    REGISTRY
        .read()
        .expect("backend registry poisoned")
        .get(name)
        .cloned()
}

pub fn registered_backend_names() -> Vec<String> {
    let mut names: Vec<String> = REGISTRY
        .read()
        .expect("backend registry poisoned")
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

/// Register the backends that ship with the frontend.
pub fn register_default_backends() {
    let _ = register_backend(Arc::new(super::TextBackend::new()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_finds_registered_backends() {
        register_default_backends();
        let backend = find_backend("text").expect("text backend registered");
        assert_eq!(backend.info().name, "text");
        assert!(find_backend("nope").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        register_default_backends();
        assert!(!register_backend(Arc::new(crate::backend::TextBackend::new())));
    }
}
