// SPDX-License-Identifier: GPL-3.0-only

//! Plugin kind registry
//!
//! Maps a plugin kind name to a descriptor holding its option schema and a
//! constructor. Chains resolve kinds here at build time, so a typo in the
//! config is a `ChainError::UnknownPlugin` before anything touches a frame.

use super::options::{OptionField, PluginOptions, validate};
use super::{Plugin, builtin};
use crate::errors::PluginError;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Constructor stored for a plugin kind
pub type PluginConstructor =
    Arc<dyn Fn(&PluginOptions) -> Result<Box<dyn Plugin>, PluginError> + Send + Sync>;

/// Everything the registry knows about one plugin kind
#[derive(Clone)]
pub struct PluginDescriptor {
    pub kind: String,
    pub description: String,
    pub schema: Vec<OptionField>,
    constructor: PluginConstructor,
}

impl PluginDescriptor {
    pub fn new<F>(kind: &str, description: &str, schema: &[OptionField], constructor: F) -> Self
    where
        F: Fn(&PluginOptions) -> Result<Box<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        Self {
            kind: kind.to_string(),
            description: description.to_string(),
            schema: schema.to_vec(),
            constructor: Arc::new(constructor),
        }
    }

    /// Validate `options` against the schema, then construct an instance
    pub fn create(&self, options: &PluginOptions) -> Result<Box<dyn Plugin>, PluginError> {
        validate(&self.schema, options)?;
        (self.constructor)(options)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("kind", &self.kind)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Registry of plugin kinds
#[derive(Debug, Default, Clone)]
pub struct PluginRegistry {
    kinds: HashMap<String, PluginDescriptor>,
    aliases: HashMap<String, String>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in overlay
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register a kind; a later registration under the same name replaces
    /// the earlier one
    pub fn register(&mut self, descriptor: PluginDescriptor) {
        debug!(kind = %descriptor.kind, "Registering plugin kind");
        self.kinds.insert(descriptor.kind.clone(), descriptor);
    }

    /// Make `alias` resolve to an already-registered `kind`
    pub fn alias(&mut self, alias: &str, kind: &str) {
        self.aliases.insert(alias.to_string(), kind.to_string());
    }

    pub fn resolve(&self, kind: &str) -> Option<&PluginDescriptor> {
        self.kinds.get(kind).or_else(|| {
            self.aliases
                .get(kind)
                .and_then(|target| self.kinds.get(target))
        })
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.resolve(kind).is_some()
    }

    /// Registered kinds sorted by name
    pub fn descriptors(&self) -> Vec<&PluginDescriptor> {
        let sorted: BTreeMap<&str, &PluginDescriptor> =
            self.kinds.iter().map(|(k, v)| (k.as_str(), v)).collect();
        sorted.into_values().collect()
    }

    /// Aliases as (alias, kind) pairs sorted by alias
    pub fn aliases(&self) -> Vec<(&str, &str)> {
        let mut aliases: Vec<_> = self
            .aliases
            .iter()
            .map(|(a, k)| (a.as_str(), k.as_str()))
            .collect();
        aliases.sort_unstable();
        aliases
    }
}
