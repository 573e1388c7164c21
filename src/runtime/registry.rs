//! Import resolution for module instantiation
//!
//! A [`Registry`] maps namespace names to [`Bindings`], the exports of a
//! registered instance (or of the host stub). Resolving a module's imports
//! looks each `(namespace, name)` pair up here.
//!
//! A namespace that was never registered resolves to an empty binding set
//! rather than an error, so a typo'd namespace fails through the same
//! missing-import path as a missing export.

use super::Failure;
use std::collections::HashMap;
use wasmtime::Extern;

/// A named collection of exported externs.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, Extern)>,
}

impl Bindings {
    /// Create an empty binding set
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Add or replace a binding
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Extern>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Look up a binding by name
    pub fn get(&self, name: &str) -> Option<&Extern> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    /// Binding names, in insertion order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Extern)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Extern)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, Extern)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (name, value) in iter {
            bindings.insert(name, value);
        }
        bindings
    }
}

/// Namespace name to binding set.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    namespaces: HashMap<String, Bindings>,
    /// Returned for namespaces that were never registered.
    empty: Bindings,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose only entry is `bindings` under `namespace`.
    pub fn with_host(namespace: impl Into<String>, bindings: Bindings) -> Self {
        let mut registry = Self::new();
        registry.register(namespace, bindings);
        registry
    }

    /// Register `bindings` under `namespace`, replacing any previous entry.
    pub fn register(&mut self, namespace: impl Into<String>, bindings: Bindings) {
        let namespace = namespace.into();
        if self.namespaces.insert(namespace.clone(), bindings).is_some() {
            log::debug!("re-registered namespace {namespace}");
        } else {
            log::debug!("registered namespace {namespace}");
        }
    }

    /// The bindings for `namespace`, or an empty binding set if it was never
    /// registered.
    pub fn lookup(&self, namespace: &str) -> &Bindings {
        self.namespaces.get(namespace).unwrap_or(&self.empty)
    }

    /// Whether `namespace` has been registered.
    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    /// Resolve a single import.
    pub fn resolve(&self, namespace: &str, name: &str) -> Result<Extern, Failure> {
        self.lookup(namespace)
            .get(name)
            .cloned()
            .ok_or_else(|| Failure::Link(format!("unknown import: {namespace}.{name}")))
    }

    /// Resolve every import in order, failing on the first missing binding.
    pub fn resolve_all<'a, I>(&self, imports: I) -> Result<Vec<Extern>, Failure>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        imports
            .into_iter()
            .map(|(namespace, name)| self.resolve(namespace, name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::host::HostState;
    use crate::runtime::FailureKind;
    use wasmtime::{Engine, Func, Store};

    fn func(store: &mut Store<HostState>) -> Extern {
        Func::wrap(store, || {}).into()
    }

    #[test]
    fn unknown_namespace_is_empty_not_missing() {
        let registry = Registry::new();
        assert!(!registry.contains("nowhere"));
        assert!(registry.lookup("nowhere").is_empty());
        let err = registry.resolve("nowhere", "f").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Link);
        assert_eq!(err.message(), "unknown import: nowhere.f");
    }

    #[test]
    fn missing_export_takes_same_path_as_missing_namespace() {
        let mut store = Store::new(&Engine::default(), HostState::default());
        let mut bindings = Bindings::new();
        bindings.insert("f", func(&mut store));
        let registry = Registry::with_host("M", bindings);

        assert!(registry.resolve("M", "f").is_ok());
        assert_eq!(registry.resolve("M", "g").unwrap_err().kind(), FailureKind::Link);
        assert_eq!(registry.resolve("N", "f").unwrap_err().kind(), FailureKind::Link);
    }

    #[test]
    fn reregistration_replaces_whole_export_set() {
        let mut store = Store::new(&Engine::default(), HostState::default());
        let mut first = Bindings::new();
        first.insert("a", func(&mut store));
        first.insert("b", func(&mut store));
        let mut second = Bindings::new();
        second.insert("c", func(&mut store));

        let mut registry = Registry::new();
        registry.register("M", first);
        registry.register("M", second);

        assert_eq!(registry.lookup("M").names(), vec!["c"]);
        assert!(registry.resolve("M", "a").is_err());
    }

    #[test]
    fn insert_replaces_existing_name() {
        let mut store = Store::new(&Engine::default(), HostState::default());
        let mut bindings = Bindings::new();
        bindings.insert("f", func(&mut store));
        bindings.insert("f", func(&mut store));
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn resolve_all_keeps_import_order() {
        let mut store = Store::new(&Engine::default(), HostState::default());
        let mut bindings = Bindings::new();
        bindings.insert("a", func(&mut store));
        bindings.insert("b", func(&mut store));
        let registry = Registry::with_host("M", bindings);
        let externs = registry.resolve_all([("M", "b"), ("M", "a")]).unwrap();
        assert_eq!(externs.len(), 2);
        assert!(registry.resolve_all([("M", "a"), ("M", "z")]).is_err());
    }
}
